//! Limits and fixed strings the shell is built around.

use crate::command::ExitCode;

/// Number of background jobs the job table can track at once.
pub const JOB_CAPACITY: usize = 200;

/// Number of completion notices held between two prompts.
pub const NOTICE_CAPACITY: usize = 50;

/// Lines whose content is this long or longer are ignored.
pub const MAX_LINE_LEN: usize = 2048;

/// Arguments accepted after the program name; the rest are dropped.
pub const MAX_ARGS: usize = 512;

/// Source and sink used for background jobs without explicit redirection.
pub const NULL_DEVICE: &str = "/dev/null";

/// Prompt marker printed before every line is read.
pub const PROMPT: &str = ": ";

/// Exit code of the `exit` builtin.
pub const SHUTDOWN_EXIT_CODE: ExitCode = 3;

/// Runtime configuration of a shell instance.
///
/// [`Default`] yields the limits above. Tests shrink the capacities to
/// exercise the overflow policies without launching hundreds of processes.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub job_capacity: usize,
    pub notice_capacity: usize,
    pub max_line_len: usize,
    pub max_args: usize,
    pub null_device: String,
    pub prompt: String,
    pub shutdown_exit_code: ExitCode,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            job_capacity: JOB_CAPACITY,
            notice_capacity: NOTICE_CAPACITY,
            max_line_len: MAX_LINE_LEN,
            max_args: MAX_ARGS,
            null_device: NULL_DEVICE.to_string(),
            prompt: PROMPT.to_string(),
            shutdown_exit_code: SHUTDOWN_EXIT_CODE,
        }
    }
}
