//! POSIX job control: process groups, pipes, fork/exec, terminal handoff.
//!
//! A [`Job`] owns one [`Process`] per pipeline stage plus the job's stdio
//! file descriptors. Launching forks each stage, wires the pipes, puts the
//! children into a shared process group, and — for interactive foreground
//! jobs — hands them the controlling terminal until they stop or complete.
//!
//! `setpgid` runs in both the parent and the child so the group exists no
//! matter which side runs first.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CString;
use std::fs::File;
use std::io::{IsTerminal, Read};
use std::os::fd::{BorrowedFd, FromRawFd, IntoRawFd, RawFd};

use conch_types::{ErrorCode, RuntimeError};
use tracing::{debug, warn};

use nix::errno::Errno;
use nix::sys::signal::{killpg, signal, SigHandler, Signal};
use nix::sys::termios::{tcgetattr, tcsetattr, SetArg, Termios};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{
    close, dup2, execvp, fork, getpgrp, getpid, pipe, setpgid, tcsetpgrp, ForkResult, Pid,
};

use super::BuiltinFn;

/// The shell's process-wide terminal state, passed explicitly to the
/// executor.
pub struct ShellContext {
    /// Whether job control is active (the shell is on a terminal).
    pub interactive: bool,
    /// The controlling terminal's file descriptor.
    pub terminal: RawFd,
    /// The shell's own process group.
    pub shell_pgid: Pid,
    /// The shell's terminal modes, restored after foreground jobs.
    shell_tmodes: RefCell<Option<Termios>>,
}

impl ShellContext {
    /// Build a context over an explicit terminal descriptor.
    pub fn new(interactive: bool, terminal: RawFd) -> Self {
        let shell_tmodes = if interactive {
            tcgetattr(unsafe { BorrowedFd::borrow_raw(terminal) }).ok()
        } else {
            None
        };
        Self {
            interactive,
            terminal,
            shell_pgid: getpgrp(),
            shell_tmodes: RefCell::new(shell_tmodes),
        }
    }

    /// Read the context off the current process; interactive when stdin is
    /// a terminal.
    pub fn detect() -> Self {
        Self::new(std::io::stdin().is_terminal(), 0)
    }

    /// A context with job control disabled; jobs run in the shell's group
    /// and are simply waited on.
    pub fn non_interactive() -> Self {
        Self::new(false, 0)
    }

    fn term_fd(&self) -> BorrowedFd<'_> {
        // the terminal fd outlives the borrow; it is never closed here
        unsafe { BorrowedFd::borrow_raw(self.terminal) }
    }

    /// The shell's saved terminal modes.
    pub fn tmodes(&self) -> Option<Termios> {
        self.shell_tmodes.borrow().clone()
    }
}

/// One pipeline stage.
pub struct Process {
    argv: Vec<String>,
    pid: Option<Pid>,
    completed: bool,
    stopped: bool,
    status: i32,
}

impl Process {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            pid: None,
            completed: false,
            stopped: false,
            status: 0,
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn pid(&self) -> Option<i32> {
        self.pid.map(Pid::as_raw)
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn stopped(&self) -> bool {
        self.stopped
    }

    pub fn status(&self) -> i32 {
        self.status
    }
}

/// Exit-code style encoding of a wait status: exit code for normal exits,
/// `128 + signal` for signaled and stopped processes.
fn encode_status(status: &WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => *code,
        WaitStatus::Signaled(_, sig, _) => 128 + *sig as i32,
        WaitStatus::Stopped(_, sig) => 128 + *sig as i32,
        _ => 0,
    }
}

/// A launched (or launchable) pipeline.
pub struct Job {
    processes: Vec<Process>,
    pgid: Option<Pid>,
    stdin: RawFd,
    stdout: RawFd,
    stderr: RawFd,
    /// The job's terminal modes, saved when it leaves the foreground and
    /// restored when it resumes there.
    tmodes: Option<Termios>,
    raw_status: i32,
}

impl Job {
    /// Build a job over expanded argv vectors and stdio descriptors.
    pub fn new(processes: Vec<Process>, stdin: RawFd, stdout: RawFd, stderr: RawFd) -> Self {
        Self {
            processes,
            pgid: None,
            stdin,
            stdout,
            stderr,
            tmodes: None,
            raw_status: 0,
        }
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    /// The job's process group id, once launched interactively.
    pub fn pgid(&self) -> Option<i32> {
        self.pgid.map(Pid::as_raw)
    }

    /// Launch the pipeline.
    ///
    /// Non-interactive shells simply wait for the job; interactive shells
    /// either hand it the terminal (foreground) or leave it running in the
    /// background. Returns the job's exit code.
    pub fn launch(
        &mut self,
        shell: &ShellContext,
        builtins: &HashMap<String, BuiltinFn>,
        foreground: bool,
    ) -> Result<i32, RuntimeError> {
        self.launch_stages(shell, builtins, foreground)?;

        if !shell.interactive {
            self.wait_for_job();
        } else if foreground {
            self.put_in_foreground(shell, false);
        } else {
            self.put_in_background(shell, false);
        }
        Ok(self.exit_code())
    }

    /// Launch the pipeline with stdout captured through a pipe, wait for
    /// it, and return `(exit code, captured output)`.
    ///
    /// The capture form never touches the terminal. The parent closes the
    /// write end and drains the read end before reaping, so a pipeline
    /// writing more than a pipe buffer can't deadlock.
    pub fn launch_captured(
        &mut self,
        builtins: &HashMap<String, BuiltinFn>,
    ) -> Result<(i32, String), RuntimeError> {
        let (read_end, write_end) = pipe().map_err(|e| {
            RuntimeError::new(ErrorCode::InvalidCommand, format!("pipe failed: {e}"))
        })?;
        self.stdout = write_end.into_raw_fd();

        let detached = ShellContext::non_interactive();
        let launched = self.launch_stages(&detached, builtins, false);
        let _ = close(self.stdout);
        launched?;

        let mut bytes = Vec::new();
        let mut reader = unsafe { File::from_raw_fd(read_end.into_raw_fd()) };
        if let Err(e) = reader.read_to_end(&mut bytes) {
            warn!("reading captured output failed: {e}");
        }
        let output = String::from_utf8_lossy(&bytes).into_owned();

        self.wait_for_job();
        Ok((self.exit_code(), output))
    }

    /// Fork and wire every pipeline stage.
    ///
    /// A pipe or fork failure tears the partial launch down: every created
    /// descriptor is closed, already-forked children are left for the
    /// parent to reap, and INVALID_COMMAND surfaces.
    fn launch_stages(
        &mut self,
        shell: &ShellContext,
        builtins: &HashMap<String, BuiltinFn>,
        foreground: bool,
    ) -> Result<(), RuntimeError> {
        let stages = self.processes.len();
        if stages == 0 {
            return Err(RuntimeError::new(ErrorCode::InvalidCommand, "empty pipeline"));
        }

        let mut infile = self.stdin;
        for i in 0..stages {
            let mut next_infile = self.stdin;
            let outfile = if i != stages - 1 {
                let (read_end, write_end) = match pipe() {
                    Ok(fds) => fds,
                    Err(e) => {
                        if infile != self.stdin {
                            let _ = close(infile);
                        }
                        return Err(RuntimeError::new(
                            ErrorCode::InvalidCommand,
                            format!("pipe failed: {e}"),
                        ));
                    }
                };
                next_infile = read_end.into_raw_fd();
                write_end.into_raw_fd()
            } else {
                self.stdout
            };

            match unsafe { fork() } {
                Ok(ForkResult::Child) => {
                    self.exec_child(i, infile, outfile, shell, builtins, foreground)
                }
                Ok(ForkResult::Parent { child }) => {
                    self.processes[i].pid = Some(child);
                    if shell.interactive {
                        // both sides call setpgid to close the race on
                        // which of them runs first
                        let pgid = *self.pgid.get_or_insert(child);
                        let _ = setpgid(child, pgid);
                    }
                    debug!(pid = child.as_raw(), argv = ?self.processes[i].argv, "forked stage");
                }
                Err(e) => {
                    if infile != self.stdin {
                        let _ = close(infile);
                    }
                    if outfile != self.stdout {
                        let _ = close(outfile);
                    }
                    if next_infile != self.stdin {
                        let _ = close(next_infile);
                    }
                    return Err(RuntimeError::new(
                        ErrorCode::InvalidCommand,
                        format!("fork failed: {e}"),
                    ));
                }
            }

            // the parent closes its pipe ends promptly; a child holding the
            // only write end is what lets readers see EOF
            if infile != self.stdin {
                let _ = close(infile);
            }
            if outfile != self.stdout {
                let _ = close(outfile);
            }
            infile = next_infile;
        }
        Ok(())
    }

    /// The child half of a stage launch. Never returns.
    fn exec_child(
        &self,
        stage: usize,
        infile: RawFd,
        outfile: RawFd,
        shell: &ShellContext,
        builtins: &HashMap<String, BuiltinFn>,
        foreground: bool,
    ) -> ! {
        if shell.interactive {
            let pid = getpid();
            let pgid = self.pgid.unwrap_or(pid);
            let _ = setpgid(pid, pgid);
            if foreground {
                let _ = tcsetpgrp(shell.term_fd(), pgid);
            }
            // restore default dispositions for the job-control signals the
            // shell ignores
            for sig in [
                Signal::SIGINT,
                Signal::SIGQUIT,
                Signal::SIGTSTP,
                Signal::SIGTTIN,
                Signal::SIGTTOU,
                Signal::SIGCHLD,
            ] {
                unsafe {
                    let _ = signal(sig, SigHandler::SigDfl);
                }
            }
        }

        if infile != 0 {
            let _ = dup2(infile, 0);
            let _ = close(infile);
        }
        if outfile != 1 {
            let _ = dup2(outfile, 1);
            // with `&>` the same descriptor also backs stderr below
            if outfile != self.stderr {
                let _ = close(outfile);
            }
        }
        if self.stderr != 2 {
            let _ = dup2(self.stderr, 2);
            let _ = close(self.stderr);
        }

        let argv = &self.processes[stage].argv;
        if let Some(builtin) = builtins.get(&argv[0]) {
            builtin(&argv[1..]);
            std::process::exit(0);
        }

        let c_args: Vec<CString> = match argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<_, _>>()
        {
            Ok(args) => args,
            Err(_) => {
                eprintln!("{}: invalid argument", argv[0]);
                std::process::exit(127);
            }
        };
        let _ = execvp(&c_args[0], &c_args);
        // exec failed: command not found becomes exit 127
        eprintln!("{}: command not found", argv[0]);
        std::process::exit(127);
    }

    /// Record a wait status against the matching process.
    ///
    /// Returns false when the pid belongs to no process of this job (or
    /// there was nothing to report).
    fn mark_process_status(&mut self, status: &WaitStatus) -> bool {
        let Some(pid) = status.pid() else {
            return false;
        };
        for process in self.processes.iter_mut() {
            if process.pid == Some(pid) {
                process.status = encode_status(status);
                match status {
                    WaitStatus::Stopped(_, _) => process.stopped = true,
                    WaitStatus::Continued(_) => process.stopped = false,
                    _ => process.completed = true,
                }
                return true;
            }
        }
        debug!(pid = pid.as_raw(), "wait status for unknown pid");
        false
    }

    /// True when no process is left running (each is stopped or completed).
    pub fn is_stopped(&self) -> bool {
        self.processes.iter().all(|p| p.completed || p.stopped)
    }

    /// True when every process has completed.
    pub fn is_completed(&self) -> bool {
        self.processes.iter().all(|p| p.completed)
    }

    /// Block until every process of the job is stopped or completed.
    pub fn wait_for_job(&mut self) {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WUNTRACED)) {
                Err(Errno::ECHILD) => break,
                Err(e) => {
                    warn!("waitpid failed: {e}");
                    break;
                }
                Ok(status) => {
                    self.raw_status |= encode_status(&status);
                    if !self.mark_process_status(&status) {
                        break;
                    }
                    if self.is_stopped() || self.is_completed() {
                        break;
                    }
                }
            }
        }
    }

    /// Non-blocking status refresh for background job listings.
    pub fn poll(&mut self) {
        let pids: Vec<Pid> = self
            .processes
            .iter()
            .filter(|p| !p.completed)
            .filter_map(|p| p.pid)
            .collect();
        for pid in pids {
            let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
            match waitpid(pid, Some(flags)) {
                Ok(WaitStatus::StillAlive) => {}
                Ok(status) => {
                    self.raw_status |= encode_status(&status);
                    self.mark_process_status(&status);
                }
                Err(_) => {}
            }
        }
    }

    /// Put the job in the foreground, optionally continuing it, and wait.
    ///
    /// On the way out the terminal returns to the shell's group, the job's
    /// current modes are saved for the next resume, and the shell's modes
    /// are restored.
    pub fn put_in_foreground(&mut self, shell: &ShellContext, cont: bool) {
        let Some(pgid) = self.pgid else {
            // launched without job control; nothing owns the terminal
            self.wait_for_job();
            return;
        };

        if let Err(e) = tcsetpgrp(shell.term_fd(), pgid) {
            warn!("tcsetpgrp to job group failed: {e}");
        }

        if cont {
            if let Some(tmodes) = &self.tmodes {
                if let Err(e) = tcsetattr(shell.term_fd(), SetArg::TCSADRAIN, tmodes) {
                    warn!("restoring job terminal modes failed: {e}");
                }
            }
            if let Err(e) = killpg(pgid, Signal::SIGCONT) {
                warn!("kill (SIGCONT) failed: {e}");
            }
        }

        self.wait_for_job();

        if let Err(e) = tcsetpgrp(shell.term_fd(), shell.shell_pgid) {
            warn!("returning terminal to shell failed: {e}");
        }
        self.tmodes = tcgetattr(shell.term_fd()).ok();
        if let Some(shell_tmodes) = shell.tmodes() {
            if let Err(e) = tcsetattr(shell.term_fd(), SetArg::TCSADRAIN, &shell_tmodes) {
                warn!("restoring shell terminal modes failed: {e}");
            }
        }
    }

    /// Put the job in the background, sending SIGCONT when resuming.
    pub fn put_in_background(&mut self, _shell: &ShellContext, cont: bool) {
        if cont {
            if let Some(pgid) = self.pgid {
                if let Err(e) = killpg(pgid, Signal::SIGCONT) {
                    warn!("kill (SIGCONT) failed: {e}");
                }
            }
        }
    }

    /// Aggregate status: the bitwise OR of every process's status, enough
    /// to distinguish clean exits from stopped or signaled processes.
    pub fn status(&self) -> i32 {
        self.processes.iter().fold(0, |acc, p| acc | p.status)
    }

    /// The job's exit code: the last stage's status, or 148 while that
    /// stage is stopped.
    pub fn exit_code(&self) -> i32 {
        match self.processes.last() {
            Some(p) if p.stopped && !p.completed => 148,
            Some(p) => p.status,
            None => 0,
        }
    }
}
