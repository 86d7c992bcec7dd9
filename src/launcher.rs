use std::ffi::{CStr, CString};
use std::io::{self, Write};
use std::os::fd::RawFd;
use std::sync::Arc;

use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::libc;
use nix::sys::stat::Mode;
use nix::sys::wait;
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;

use crate::command::LastStatus;
use crate::parser::CommandDescriptor;
use crate::signals::{self, SigchldBlock};
use crate::state::SharedState;

/// Errors that prevent a command from being started or waited on.
///
/// Failures inside the child (a redirection target that cannot be opened, a
/// program that cannot be executed) are not errors here: the child reports
/// them itself and exits with status 1.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("argument contains a NUL byte: {0:?}")]
    InvalidArgument(String),
    #[error("cannot block SIGCHLD: {0}")]
    SignalMask(#[source] Errno),
    #[error("fork failed: {0}")]
    Fork(#[source] Errno),
    #[error("waiting for pid {pid} failed: {source}")]
    Wait {
        pid: Pid,
        #[source]
        source: Errno,
    },
}

/// Result of a successful launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// The foreground child ended this way.
    Foreground(LastStatus),
    /// The child runs in the background; `tracked` is false when the job
    /// table had no free slot.
    Background { pid: Pid, tracked: bool },
}

struct Redirect {
    path: CString,
    diagnostic: String,
}

/// Everything the child needs, prepared before fork so the child itself
/// does not allocate.
struct ChildPlan {
    program: CString,
    argv: Vec<CString>,
    input: Option<Redirect>,
    output: Option<Redirect>,
    background: bool,
}

fn c_string(text: &str) -> Result<CString, LaunchError> {
    CString::new(text).map_err(|_| LaunchError::InvalidArgument(text.to_string()))
}

impl ChildPlan {
    fn new(descriptor: &CommandDescriptor) -> Result<Self, LaunchError> {
        let plan_redirect = |path: &Option<String>, direction: &str| -> Result<Option<Redirect>, LaunchError> {
            path.as_deref()
                .map(|p| {
                    Ok(Redirect {
                        path: c_string(p)?,
                        diagnostic: format!("cannot open {} for {}\n", p, direction),
                    })
                })
                .transpose()
        };
        Ok(Self {
            program: c_string(&descriptor.program)?,
            argv: descriptor
                .arguments
                .iter()
                .map(|arg| c_string(arg))
                .collect::<Result<_, _>>()?,
            input: plan_redirect(&descriptor.input_path, "input")?,
            output: plan_redirect(&descriptor.output_path, "output")?,
            background: descriptor.background,
        })
    }
}

/// Forks and runs `descriptor`.
///
/// Background children are recorded in the job table and the SIGCHLD reaper
/// is installed before returning their pid. Foreground children are waited
/// for and their outcome returned.
pub fn launch(descriptor: &CommandDescriptor, state: &Arc<SharedState>) -> Result<Launch, LaunchError> {
    let plan = ChildPlan::new(descriptor)?;
    let _ = io::stdout().flush();

    let mask = SigchldBlock::new().map_err(LaunchError::SignalMask)?;
    // SAFETY: the child only calls async-signal-safe functions before exec.
    match unsafe { unistd::fork() } {
        Err(e) => Err(LaunchError::Fork(e)),
        Ok(ForkResult::Child) => run_child(&plan, &mask),
        Ok(ForkResult::Parent { child }) => {
            tracing::debug!(pid = %child, program = %descriptor.program, background = plan.background, "forked");
            if plan.background {
                Ok(start_background(child, state, mask))
            } else {
                wait_foreground(child, state, mask).map(Launch::Foreground)
            }
        }
    }
}

fn start_background(child: Pid, state: &Arc<SharedState>, mask: SigchldBlock) -> Launch {
    let tracked = state.jobs.insert(child);
    if !tracked {
        tracing::warn!(pid = %child, capacity = state.jobs.capacity(), "job table full, background job is not tracked");
    }
    let installed = signals::ensure_reaper(state);
    drop(mask);
    if let Err(e) = installed {
        tracing::warn!("cannot install SIGCHLD handler: {}", e);
    }
    Launch::Background { pid: child, tracked }
}

fn wait_foreground(child: Pid, state: &SharedState, mask: SigchldBlock) -> Result<LastStatus, LaunchError> {
    state.begin_foreground(child);
    drop(mask);
    let outcome = loop {
        match wait::waitpid(child, None) {
            Ok(status) => {
                if let Some(outcome) = LastStatus::from_wait_status(status) {
                    break Ok(outcome);
                }
            }
            Err(Errno::EINTR) => continue,
            // The reaper got to it first.
            Err(Errno::ECHILD) => {
                break state.stashed_foreground().ok_or(LaunchError::Wait {
                    pid: child,
                    source: Errno::ECHILD,
                });
            }
            Err(source) => break Err(LaunchError::Wait { pid: child, source }),
        }
    };
    state.end_foreground();
    outcome
}

fn redirect(path: &CStr, flags: OFlag, target: RawFd) -> nix::Result<()> {
    let fd = fcntl::open(path, flags, Mode::from_bits_truncate(0o644))?;
    if fd != target {
        unistd::dup2(fd, target)?;
        unistd::close(fd)?;
    }
    Ok(())
}

fn run_child(plan: &ChildPlan, mask: &SigchldBlock) -> ! {
    let _ = mask.restore();

    if let Some(input) = &plan.input {
        if redirect(&input.path, OFlag::O_RDONLY, libc::STDIN_FILENO).is_err() {
            signals::write_raw(libc::STDOUT_FILENO, &[input.diagnostic.as_bytes()]);
            unsafe { libc::_exit(1) };
        }
    }
    if let Some(output) = &plan.output {
        let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
        if redirect(&output.path, flags, libc::STDOUT_FILENO).is_err() {
            signals::write_raw(libc::STDOUT_FILENO, &[output.diagnostic.as_bytes()]);
            unsafe { libc::_exit(1) };
        }
    }

    let _ = signals::reset_child_dispositions(plan.background);

    let err = match unistd::execvp(&plan.program, &plan.argv) {
        Ok(never) => match never {},
        Err(e) => e,
    };
    signals::write_raw(
        libc::STDERR_FILENO,
        &[plan.program.as_bytes(), b": ", err.desc().as_bytes(), b"\n"],
    );
    unsafe { libc::_exit(1) }
}
