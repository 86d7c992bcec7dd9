use std::fmt;

use nix::sys::wait::WaitStatus;

use crate::builtin::Builtin;
use crate::parser::CommandDescriptor;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// How the most recent foreground command ended.
///
/// Displayed exactly as the `status` builtin prints it: `exit value N` or
/// `terminated by signal N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastStatus {
    /// Process returned normally with this exit code.
    Exited(ExitCode),
    /// Process was killed by this signal number.
    Signaled(i32),
}

impl LastStatus {
    /// Translates a terminal wait status; `None` for stop/continue reports.
    pub fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(LastStatus::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(LastStatus::Signaled(signal as i32)),
            _ => None,
        }
    }
}

impl Default for LastStatus {
    fn default() -> Self {
        LastStatus::Exited(0)
    }
}

impl fmt::Display for LastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastStatus::Exited(code) => write!(f, "exit value {}", code),
            LastStatus::Signaled(signal) => write!(f, "terminated by signal {}", signal),
        }
    }
}

/// What the prompt loop does after a line has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Leave the loop and terminate the process with this code.
    Exit(ExitCode),
}

/// A parsed line, classified once by its first word.
#[derive(Debug)]
pub enum Command {
    /// `exit`, `status` or `cd`, executed inside the shell process.
    Builtin(Builtin),
    /// Anything else, launched as a child process.
    External(CommandDescriptor),
}

impl Command {
    pub fn classify(descriptor: CommandDescriptor) -> Self {
        let args: Vec<&str> = descriptor.arguments[1..]
            .iter()
            .map(String::as_str)
            .collect();
        match Builtin::parse(&descriptor.program, &args) {
            Some(builtin) => Command::Builtin(builtin),
            None => Command::External(descriptor),
        }
    }
}
