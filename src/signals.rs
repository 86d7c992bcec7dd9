//! Signal dispositions of the shell and of its children.
//!
//! - SIGINT is ignored by the shell; foreground children get the default
//!   action back, background children keep ignoring it.
//! - SIGTSTP toggles foreground-only mode and is ignored by every child.
//! - SIGCHLD reaps every terminated child, installed on the first background
//!   launch.
//!
//! Handlers are closures registered through `signal_hook::low_level`, each
//! holding an `Arc<SharedState>`. Inside them only atomics are touched and
//! only `write(2)` is called.

use std::io;
use std::os::fd::{BorrowedFd, RawFd};
use std::sync::Arc;

use nix::libc;
use nix::sys::signal::{self, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};
use signal_hook::consts::signal::{SIGCHLD, SIGTSTP};

use crate::command::LastStatus;
use crate::notify::ReapEvent;
use crate::state::SharedState;

pub const ENTER_FOREGROUND_ONLY: &str = "\nEntering foreground-only mode (& is now ignored)\n";
pub const EXIT_FOREGROUND_ONLY: &str = "\nExiting foreground-only mode\n";

/// Sets up the shell's own dispositions. Called once, before the first prompt.
pub fn install_shell_handlers(state: &Arc<SharedState>, prompt: &str) -> io::Result<()> {
    unsafe { signal::signal(Signal::SIGINT, SigHandler::SigIgn) }.map_err(io::Error::from)?;

    let state = Arc::clone(state);
    let prompt = prompt.to_owned();
    let action = move || {
        let entering = state.toggle_foreground_only();
        announce_mode(entering, &prompt);
    };
    // SAFETY: the action only flips an atomic and calls write(2).
    unsafe { signal_hook::low_level::register(SIGTSTP, action) }?;
    tracing::debug!("installed SIGINT and SIGTSTP dispositions");
    Ok(())
}

/// Installs the SIGCHLD reaper unless it already is.
///
/// Returns true if this call installed it.
pub fn ensure_reaper(state: &Arc<SharedState>) -> io::Result<bool> {
    install_once(state, || {
        let handle = Arc::clone(state);
        // SAFETY: reap_children only calls waitpid(2) and touches atomics.
        unsafe { signal_hook::low_level::register(SIGCHLD, move || reap_children(&handle)) }?;
        Ok(())
    })
}

/// Runs `install` for the first caller only. A failed install releases the
/// claim so the next background launch tries again.
fn install_once(state: &SharedState, install: impl FnOnce() -> io::Result<()>) -> io::Result<bool> {
    if !state.claim_reaper_installation() {
        return Ok(false);
    }
    if let Err(e) = install() {
        state.release_reaper_installation();
        return Err(e);
    }
    Ok(true)
}

/// Collects every child that has terminated so far, without blocking.
///
/// One SIGCHLD may stand for several children, so this loops until waitpid
/// reports nothing left.
pub fn reap_children(state: &SharedState) {
    loop {
        match wait::waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(status) => {
                if let (Some(pid), Some(outcome)) = (status.pid(), LastStatus::from_wait_status(status)) {
                    state.record_reaped(ReapEvent { pid, outcome });
                }
            }
        }
    }
}

fn announce_mode(entering: bool, prompt: &str) {
    let message = if entering {
        ENTER_FOREGROUND_ONLY
    } else {
        EXIT_FOREGROUND_ONLY
    };
    write_raw(libc::STDOUT_FILENO, &[message.as_bytes(), prompt.as_bytes()]);
}

/// Writes directly to a descriptor, bypassing std's buffered handles.
///
/// Usable from signal handlers and from a freshly forked child.
pub(crate) fn write_raw(fd: RawFd, parts: &[&[u8]]) {
    // SAFETY: the standard descriptors stay open for the life of the process.
    let fd = unsafe { BorrowedFd::borrow_raw(fd) };
    for part in parts {
        let mut rest = *part;
        while !rest.is_empty() {
            match unistd::write(fd, rest) {
                Ok(0) | Err(_) => return,
                Ok(n) => rest = &rest[n..],
            }
        }
    }
}

/// Dispositions a child applies between fork and exec.
pub fn reset_child_dispositions(background: bool) -> nix::Result<()> {
    let interrupt = if background {
        SigHandler::SigIgn
    } else {
        SigHandler::SigDfl
    };
    unsafe {
        signal::signal(Signal::SIGINT, interrupt)?;
        signal::signal(Signal::SIGTSTP, SigHandler::SigIgn)?;
    }
    Ok(())
}

/// Keeps SIGCHLD blocked for the calling thread until dropped.
///
/// Held across fork and job registration so the reaper never sees a child
/// the launcher has not recorded yet.
pub struct SigchldBlock {
    previous: SigSet,
}

impl SigchldBlock {
    pub fn new() -> nix::Result<Self> {
        let mut blocked = SigSet::empty();
        blocked.add(Signal::SIGCHLD);
        let mut previous = SigSet::empty();
        signal::pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&blocked), Some(&mut previous))?;
        Ok(Self { previous })
    }

    /// Puts back the mask that was in effect before `new`.
    pub fn restore(&self) -> nix::Result<()> {
        signal::pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None)
    }
}

impl Drop for SigchldBlock {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            tracing::warn!("failed to restore signal mask: {}", e);
        }
    }
}
