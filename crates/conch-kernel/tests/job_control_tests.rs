//! Tests for the POSIX pipeline executor and command expressions.
//!
//! `wait_for_job` reaps with `waitpid(-1)`, which is process-wide, so every
//! test that launches children serializes on one lock to keep the harness's
//! parallel test threads from stealing each other's wait statuses.

use std::collections::HashMap;
use std::os::unix::io::FromRawFd;
use std::sync::Mutex;

use conch_kernel::ast::*;
use conch_kernel::{
    ErrorCode, Interpreter, Job, JobStatus, Position, Process, ShellContext, ShellEnv,
};

static JOB_LOCK: Mutex<()> = Mutex::new(());

fn job_guard() -> std::sync::MutexGuard<'static, ()> {
    JOB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// AST helpers
// ============================================================================

fn pos() -> Position {
    Position::new(1, 1)
}

fn word(text: &str) -> CmdWord {
    CmdWord::literal(text)
}

fn cmd(words: Vec<CmdWord>) -> Cmd {
    Cmd {
        words,
        redirects: Vec::new(),
    }
}

fn cmd_expr(commands: Vec<Cmd>, captured: bool, background: bool) -> Expr {
    Expr::new(
        ExprKind::Cmd(CmdExpression {
            pipeline: CmdPipeline {
                commands,
                background,
            },
            captured,
        }),
        pos(),
    )
}

/// Bind a captured command to `c` and read one of its attributes back.
fn capture_attr(interp: &mut Interpreter, commands: Vec<Cmd>, attr: &str) -> conch_kernel::ObjectRef {
    let program = Program {
        statements: vec![Stmt::new(
            StmtKind::Assignment(Assignment {
                targets: vec![AssignTarget::Name("c".into())],
                values: vec![cmd_expr(commands, true, false)],
            }),
            pos(),
        )],
    };
    interp.exec(&program).unwrap();
    interp
        .eval(&Expr::new(
            ExprKind::Attribute {
                object: Box::new(Expr::new(ExprKind::Identifier("c".into()), pos())),
                name: attr.into(),
            },
            pos(),
        ))
        .unwrap()
}

// ============================================================================
// Captured pipelines (CMD objects)
// ============================================================================

#[test]
fn pipeline_captures_transformed_output() {
    let _guard = job_guard();
    // echo hello | tr a-z A-Z  =>  HELLO, exit status 0
    let mut interp = Interpreter::new();
    let stages = vec![
        cmd(vec![word("echo"), word("hello")]),
        cmd(vec![word("tr"), word("a-z"), word("A-Z")]),
    ];
    let out = capture_attr(&mut interp, stages.clone(), "out");
    assert_eq!(out.as_str(), Some("HELLO\n"));
    let status = capture_attr(&mut interp, stages, "status");
    assert_eq!(status.as_int(), Some(0));
}

#[test]
fn captured_command_iterates_lines() {
    let _guard = job_guard();
    let mut interp = Interpreter::new();
    let program = Program {
        statements: vec![
            Stmt::new(
                StmtKind::Assignment(Assignment {
                    targets: vec![AssignTarget::Name("c".into())],
                    values: vec![cmd_expr(
                        vec![cmd(vec![word("printf"), word("a\\nb\\nc\\n")])],
                        true,
                        false,
                    )],
                }),
                pos(),
            ),
            Stmt::new(
                StmtKind::Assignment(Assignment {
                    targets: vec![AssignTarget::Name("joined".into())],
                    values: vec![Expr::new(ExprKind::Literal(Literal::Str(String::new())), pos())],
                }),
                pos(),
            ),
            Stmt::new(
                StmtKind::For(ForStmt {
                    vars: vec!["line".into()],
                    iterable: Expr::new(ExprKind::Identifier("c".into()), pos()),
                    block: Block {
                        statements: vec![Stmt::new(
                            StmtKind::Assignment(Assignment {
                                targets: vec![AssignTarget::Name("joined".into())],
                                values: vec![Expr::new(
                                    ExprKind::Binary {
                                        left: Box::new(Expr::new(
                                            ExprKind::Identifier("joined".into()),
                                            pos(),
                                        )),
                                        op: BinaryOp::Add,
                                        right: Box::new(Expr::new(
                                            ExprKind::Identifier("line".into()),
                                            pos(),
                                        )),
                                    },
                                    pos(),
                                )],
                            }),
                            pos(),
                        )],
                    },
                }),
                pos(),
            ),
        ],
    };
    interp.exec(&program).unwrap();
    let joined = interp
        .eval(&Expr::new(ExprKind::Identifier("joined".into()), pos()))
        .unwrap();
    assert_eq!(joined.as_str(), Some("abc"));
}

#[test]
fn command_not_found_exits_127() {
    let _guard = job_guard();
    let mut interp = Interpreter::new();
    let status = interp
        .eval(&cmd_expr(
            vec![cmd(vec![word("definitely_not_a_real_command_31337")])],
            false,
            false,
        ))
        .unwrap();
    assert_eq!(status.as_int(), Some(127));
}

#[test]
fn statement_form_returns_exit_status() {
    let _guard = job_guard();
    let mut interp = Interpreter::new();
    let ok = interp
        .eval(&cmd_expr(vec![cmd(vec![word("true")])], false, false))
        .unwrap();
    assert_eq!(ok.as_int(), Some(0));

    let fail = interp
        .eval(&cmd_expr(
            vec![cmd(vec![word("sh"), word("-c"), word("exit 3")])],
            false,
            false,
        ))
        .unwrap();
    assert_eq!(fail.as_int(), Some(3));
}

#[test]
fn variable_interpolation_in_argv() {
    let _guard = job_guard();
    let mut interp = Interpreter::new();
    let program = Program {
        statements: vec![Stmt::new(
            StmtKind::Assignment(Assignment {
                targets: vec![AssignTarget::Name("greeting".into())],
                values: vec![Expr::new(
                    ExprKind::Literal(Literal::Str("salute".into())),
                    pos(),
                )],
            }),
            pos(),
        )],
    };
    interp.exec(&program).unwrap();

    let echo = Cmd {
        words: vec![
            word("echo"),
            CmdWord {
                pieces: vec![CmdPiece::Var("greeting".into())],
                quoted: true,
            },
        ],
        redirects: Vec::new(),
    };
    let out = capture_attr(&mut interp, vec![echo], "out");
    assert_eq!(out.as_str(), Some("salute\n"));
}

#[test]
fn undefined_variable_in_argv_fails() {
    let _guard = job_guard();
    let mut interp = Interpreter::new();
    let echo = Cmd {
        words: vec![
            word("echo"),
            CmdWord {
                pieces: vec![CmdPiece::Var("missing_var".into())],
                quoted: false,
            },
        ],
        redirects: Vec::new(),
    };
    let err = interp.eval(&cmd_expr(vec![echo], true, false)).unwrap_err();
    assert_eq!(err.code, ErrorCode::SymbolNotFound);
}

#[test]
fn empty_command_is_invalid() {
    let _guard = job_guard();
    let mut interp = Interpreter::new();
    let err = interp
        .eval(&cmd_expr(vec![cmd(vec![])], false, false))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidCommand);
}

// ============================================================================
// Redirections
// ============================================================================

#[test]
fn stdout_redirection_writes_file() {
    let _guard = job_guard();
    let dir = std::env::temp_dir().join("conch-test-redirect");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("out-{}.txt", std::process::id()));
    let path_str = path.to_str().unwrap().to_string();

    let mut interp = Interpreter::new();
    let echo = Cmd {
        words: vec![word("echo"), word("to-file")],
        redirects: vec![Redirection {
            kind: RedirKind::Out,
            target: CmdWord {
                pieces: vec![CmdPiece::Literal(path_str.clone())],
                quoted: true,
            },
        }],
    };
    let status = interp.eval(&cmd_expr(vec![echo], false, false)).unwrap();
    assert_eq!(status.as_int(), Some(0));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "to-file\n");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn stdin_redirection_reads_file() {
    let _guard = job_guard();
    let dir = std::env::temp_dir().join("conch-test-redirect");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("in-{}.txt", std::process::id()));
    std::fs::write(&path, "upper me\n").unwrap();
    let path_str = path.to_str().unwrap().to_string();

    let mut interp = Interpreter::new();
    let tr = Cmd {
        words: vec![word("tr"), word("a-z"), word("A-Z")],
        redirects: vec![Redirection {
            kind: RedirKind::In,
            target: CmdWord {
                pieces: vec![CmdPiece::Literal(path_str)],
                quoted: true,
            },
        }],
    };
    let out = capture_attr(&mut interp, vec![tr], "out");
    assert_eq!(out.as_str(), Some("UPPER ME\n"));
    let _ = std::fs::remove_file(&path);
}

// ============================================================================
// Builtins
// ============================================================================

fn shout_builtin(args: &[String]) {
    // Written via a raw fd write rather than `println!`: the test harness's
    // stdout capture intercepts `println!` in-process, which would swallow
    // this output since it runs after `fork()` in the child.
    use std::io::Write;
    let mut stdout = unsafe { std::fs::File::from_raw_fd(1) };
    let _ = stdout.write_all(format!("SHOUT {}\n", args.join(" ")).as_bytes());
    std::mem::forget(stdout);
}

#[test]
fn builtin_runs_in_child_before_execvp() {
    let _guard = job_guard();
    let mut shell = ShellEnv::default();
    shell.register_builtin("shout", shout_builtin);
    let mut interp = Interpreter::with_shell(shell);

    let stages = vec![cmd(vec![word("shout"), word("hey")])];
    let out = capture_attr(&mut interp, stages.clone(), "out");
    assert_eq!(out.as_str(), Some("SHOUT hey\n"));
    let status = capture_attr(&mut interp, stages, "status");
    assert_eq!(status.as_int(), Some(0));
}

// ============================================================================
// Direct Job API: bookkeeping, stop/continue, aggregation
// ============================================================================

#[test]
fn wait_marks_every_process_completed() {
    let _guard = job_guard();
    let mut job = Job::new(
        vec![
            Process::new(vec!["true".into()]),
            Process::new(vec!["true".into()]),
        ],
        0,
        1,
        2,
    );
    let ctx = ShellContext::non_interactive();
    let code = job.launch(&ctx, &HashMap::new(), true).unwrap();
    assert_eq!(code, 0);
    assert!(job.is_completed());
    assert!(job.is_stopped(), "a completed job reports no running process");
    for process in job.processes() {
        assert!(process.completed());
        assert!(!process.stopped());
    }
}

#[test]
fn aggregate_status_distinguishes_failure() {
    let _guard = job_guard();
    let mut job = Job::new(
        vec![Process::new(vec!["sh".into(), "-c".into(), "exit 5".into()])],
        0,
        1,
        2,
    );
    let ctx = ShellContext::non_interactive();
    let code = job.launch(&ctx, &HashMap::new(), true).unwrap();
    assert_eq!(code, 5);
    assert_eq!(job.status(), 5);
    assert_eq!(job.exit_code(), 5);
}

#[test]
fn stopped_job_reports_stopped_then_resumes() {
    let _guard = job_guard();
    // Without a tty: launch a job with job control, stop it with
    // SIGSTOP, observe stopped-not-completed, then resume in the
    // foreground and observe completion.
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let ctx = ShellContext::new(true, 0);
    let mut job = Job::new(vec![Process::new(vec!["sleep".into(), "0.3".into()])], 0, 1, 2);
    // background launch returns without waiting
    job.launch(&ctx, &HashMap::new(), false).unwrap();
    let pgid = job.pgid().expect("interactive launch assigns a group");

    killpg(Pid::from_raw(pgid), Signal::SIGSTOP).unwrap();
    job.wait_for_job();
    assert!(job.is_stopped());
    assert!(!job.is_completed(), "stopped is not completed");

    // resume with cont=true: SIGCONT then wait until done
    job.put_in_foreground(&ctx, true);
    assert!(job.is_completed());
    assert_eq!(job.exit_code(), 0);
}

#[test]
fn background_job_is_tracked_in_registry() {
    let _guard = job_guard();
    let mut interp = Interpreter::new();
    let status = interp
        .eval(&cmd_expr(vec![cmd(vec![word("true")])], false, true))
        .unwrap();
    assert_eq!(status.as_int(), Some(0));

    let jobs = interp.shell().jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].command, "true");
    // non-interactive launches wait before returning, so it is done
    assert_eq!(jobs[0].status, JobStatus::Done);

    let taken = interp.shell().take_job(jobs[0].id);
    assert!(taken.is_some());
    assert!(interp.shell().jobs().is_empty());
}
