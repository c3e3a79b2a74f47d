//! Command-expression evaluation and the shell environment.
//!
//! The evaluator hands this module a parsed command expression; it expands
//! the argv words (variable interpolation, tilde, globs), opens redirection
//! targets, builds a [`Job`] with one [`Process`] per pipeline stage, and
//! launches it through the POSIX executor in [`job`].

mod expand;
pub mod job;

pub use job::{Job, Process, ShellContext};

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::rc::Rc;

use conch_types::{ErrorCode, JobId, JobInfo, JobStatus, RuntimeError};
use tracing::debug;

use crate::ast::{CmdExpression, RedirKind};
use crate::interpreter::{ExecCtx, ModuleLoader, NoModules, SymbolTableStack};
use crate::object::ObjectRef;

/// A builtin command handler, run inside the forked child before `execvp`
/// is attempted; the child exits 0 after it returns.
pub type BuiltinFn = fn(&[String]);

/// The shell-side state commands run against: terminal/process-group
/// context, the builtin registry, background jobs, and the module loader.
///
/// This is explicit state handed to the executor — there are no ambient
/// singletons.
pub struct ShellEnv {
    context: ShellContext,
    builtins: HashMap<String, BuiltinFn>,
    jobs: RefCell<JobRegistry>,
    loader: Rc<dyn ModuleLoader>,
}

impl ShellEnv {
    /// Build a shell environment over an explicit context.
    pub fn new(context: ShellContext) -> Self {
        Self {
            context,
            builtins: HashMap::new(),
            jobs: RefCell::new(JobRegistry::new()),
            loader: Rc::new(NoModules),
        }
    }

    /// Detect the context from the current process (interactive when stdin
    /// is a terminal).
    pub fn detect() -> Self {
        Self::new(ShellContext::detect())
    }

    pub fn context(&self) -> &ShellContext {
        &self.context
    }

    /// Register a builtin command looked up by argv[0] at launch time.
    pub fn register_builtin(&mut self, name: &str, handler: BuiltinFn) {
        self.builtins.insert(name.to_string(), handler);
    }

    pub(crate) fn builtins(&self) -> &HashMap<String, BuiltinFn> {
        &self.builtins
    }

    /// Replace the module loader used by `import`.
    pub fn set_loader(&mut self, loader: Rc<dyn ModuleLoader>) {
        self.loader = loader;
    }

    pub(crate) fn loader(&self) -> &Rc<dyn ModuleLoader> {
        &self.loader
    }

    /// Track a launched background job; returns its id.
    pub(crate) fn register_job(&self, command: String, job: Job) -> JobId {
        self.jobs.borrow_mut().register(command, job)
    }

    /// List background jobs with freshly polled statuses.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.jobs.borrow_mut().list()
    }

    /// Remove a background job from tracking, handing it to the caller
    /// (e.g. to put it in the foreground).
    pub fn take_job(&self, id: JobId) -> Option<Job> {
        self.jobs.borrow_mut().take(id)
    }
}

impl Default for ShellEnv {
    fn default() -> Self {
        Self::new(ShellContext::non_interactive())
    }
}

/// Background job bookkeeping.
struct JobRegistry {
    next_id: u64,
    entries: Vec<(JobId, String, Job)>,
}

impl JobRegistry {
    fn new() -> Self {
        Self {
            next_id: 1,
            entries: Vec::new(),
        }
    }

    fn register(&mut self, command: String, job: Job) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, command, job));
        id
    }

    fn list(&mut self) -> Vec<JobInfo> {
        self.entries
            .iter_mut()
            .map(|(id, command, job)| {
                job.poll();
                let status = if job.is_completed() {
                    JobStatus::Done
                } else if job.is_stopped() {
                    JobStatus::Stopped
                } else {
                    JobStatus::Running
                };
                JobInfo {
                    id: *id,
                    command: command.clone(),
                    status,
                    pgid: job.pgid(),
                }
            })
            .collect()
    }

    fn take(&mut self, id: JobId) -> Option<Job> {
        let at = self.entries.iter().position(|(jid, _, _)| *jid == id)?;
        let (_, _, job) = self.entries.remove(at);
        Some(job)
    }
}

/// Evaluate a command expression: build the job, launch it, and produce
/// either a CMD object (capture form) or the exit status (statement form).
pub(crate) fn exec_cmd_expr(
    ctx: &ExecCtx<'_>,
    stack: &SymbolTableStack,
    cmd_expr: &CmdExpression,
) -> Result<ObjectRef, RuntimeError> {
    let pipeline = &cmd_expr.pipeline;
    let mut processes = Vec::with_capacity(pipeline.commands.len());
    let mut stdin_fd = 0;
    let mut stdout_fd = 1;
    let mut stderr_fd = 2;
    // opened redirection targets stay alive until the launch completes
    let mut opened: Vec<File> = Vec::new();

    for cmd in &pipeline.commands {
        let argv = expand::expand_words(ctx, stack, &cmd.words)?;
        if argv.is_empty() {
            return Err(RuntimeError::new(ErrorCode::InvalidCommand, "empty command"));
        }
        for redirect in &cmd.redirects {
            let targets =
                expand::expand_words(ctx, stack, std::slice::from_ref(&redirect.target))?;
            let [path] = targets.as_slice() else {
                return Err(RuntimeError::new(
                    ErrorCode::InvalidCommand,
                    "ambiguous redirect target",
                ));
            };
            let io_err = |e: std::io::Error| {
                RuntimeError::new(ErrorCode::InvalidCommand, format!("{path}: {e}"))
            };
            match redirect.kind {
                RedirKind::In => {
                    let file = File::open(path).map_err(io_err)?;
                    stdin_fd = file.as_raw_fd();
                    opened.push(file);
                }
                RedirKind::Out => {
                    let file = File::create(path).map_err(io_err)?;
                    stdout_fd = file.as_raw_fd();
                    opened.push(file);
                }
                RedirKind::OutAppend => {
                    let file = OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .map_err(io_err)?;
                    stdout_fd = file.as_raw_fd();
                    opened.push(file);
                }
                RedirKind::Err => {
                    let file = File::create(path).map_err(io_err)?;
                    stderr_fd = file.as_raw_fd();
                    opened.push(file);
                }
                RedirKind::Both => {
                    let file = File::create(path).map_err(io_err)?;
                    stdout_fd = file.as_raw_fd();
                    stderr_fd = file.as_raw_fd();
                    opened.push(file);
                }
            }
        }
        processes.push(Process::new(argv));
    }

    let description = processes
        .iter()
        .map(|p| p.argv().join(" "))
        .collect::<Vec<_>>()
        .join(" | ");
    let mut job = Job::new(processes, stdin_fd, stdout_fd, stderr_fd);
    let shell = ctx.shell;

    if cmd_expr.captured {
        let (status, output) = job.launch_captured(shell.builtins())?;
        debug!(%description, status, "captured command finished");
        return Ok(ctx.factory.new_cmd(output, status));
    }

    if pipeline.background {
        job.launch(shell.context(), shell.builtins(), false)?;
        let id = shell.register_job(description.clone(), job);
        debug!(%description, %id, "background job launched");
        return Ok(ctx.factory.new_int(0));
    }

    let code = job.launch(shell.context(), shell.builtins(), true)?;
    debug!(%description, code, "foreground job finished");
    Ok(ctx.factory.new_int(i64::from(code)))
}
