use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

use nix::unistd::Pid;

use crate::command::LastStatus;
use crate::config::ShellConfig;
use crate::jobs::JobTable;
use crate::notify::{NotificationQueue, ReapEvent};

/// Everything the prompt loop shares with signal handlers.
///
/// Shared through an `Arc`: the interpreter and launcher hold one handle, the
/// handler closures registered by [`crate::signals`] hold the others. All
/// fields are fixed-size atomics, so handlers may interrupt the loop at any
/// point.
pub struct SharedState {
    pub jobs: JobTable,
    pub notices: NotificationQueue,
    foreground_only: AtomicBool,
    foreground: ForegroundSlot,
    reaper_installed: AtomicBool,
}

/// The foreground child currently waited on, plus the outcome the reaper
/// stashes if it collects that child before the launcher's own wait does.
struct ForegroundSlot {
    pid: AtomicI32,
    stashed: AtomicU64,
}

impl SharedState {
    pub fn new(config: &ShellConfig) -> Self {
        Self {
            jobs: JobTable::with_capacity(config.job_capacity),
            notices: NotificationQueue::with_capacity(config.notice_capacity),
            foreground_only: AtomicBool::new(false),
            foreground: ForegroundSlot {
                pid: AtomicI32::new(0),
                stashed: AtomicU64::new(0),
            },
            reaper_installed: AtomicBool::new(false),
        }
    }

    pub fn foreground_only(&self) -> bool {
        self.foreground_only.load(Ordering::SeqCst)
    }

    /// Flips foreground-only mode and returns the new value.
    pub fn toggle_foreground_only(&self) -> bool {
        !self.foreground_only.fetch_xor(true, Ordering::SeqCst)
    }

    /// Marks the reaper as installed; true only for the first caller.
    pub(crate) fn claim_reaper_installation(&self) -> bool {
        !self.reaper_installed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn release_reaper_installation(&self) {
        self.reaper_installed.store(false, Ordering::SeqCst);
    }

    pub fn reaper_installed(&self) -> bool {
        self.reaper_installed.load(Ordering::SeqCst)
    }

    pub(crate) fn begin_foreground(&self, pid: Pid) {
        self.foreground.stashed.store(0, Ordering::SeqCst);
        self.foreground.pid.store(pid.as_raw(), Ordering::SeqCst);
    }

    pub(crate) fn end_foreground(&self) {
        self.foreground.pid.store(0, Ordering::SeqCst);
        self.foreground.stashed.store(0, Ordering::SeqCst);
    }

    /// Outcome of the foreground child if the reaper collected it.
    pub(crate) fn stashed_foreground(&self) -> Option<LastStatus> {
        match self.foreground.stashed.load(Ordering::SeqCst) {
            0 => None,
            word => Some(ReapEvent::unpack(word).outcome),
        }
    }

    /// Routes one reaped child. Async-signal-safe.
    ///
    /// The current foreground child is handed back to the launcher; any other
    /// child leaves the job table and becomes a completion notice.
    pub fn record_reaped(&self, event: ReapEvent) {
        let raw = event.pid.as_raw();
        if raw != 0 && self.foreground.pid.load(Ordering::SeqCst) == raw {
            self.foreground.stashed.store(event.pack(), Ordering::SeqCst);
            return;
        }
        self.jobs.remove(event.pid);
        self.notices.push(event);
    }
}
