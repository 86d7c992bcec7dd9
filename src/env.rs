use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

use crate::command::LastStatus;

/// State of the shell that only the prompt loop touches.
///
/// Signal handlers never see this structure; everything they share with the
/// loop lives in [`crate::state::SharedState`].
#[derive(Debug, Clone)]
pub struct Environment {
    /// Overrides for the process env, consulted before it.
    vars: HashMap<String, String>,
    /// The current working directory, kept in sync with the process cwd.
    pub current_dir: PathBuf,
    /// Set by `exit`; the loop shuts down once it sees it.
    pub should_exit: bool,
    /// Process id substituted for `$$`.
    pub shell_pid: u32,
    /// Outcome of the last foreground command, printed by `status`.
    pub last_status: LastStatus,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars: HashMap::new(),
            current_dir,
            should_exit: false,
            shell_pid: std::process::id(),
            last_status: LastStatus::default(),
        }
    }

    /// Get the value of a variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override a variable in `self.vars`.
    #[cfg(test)]
    pub(crate) fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment::new();

        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn test_new_env_starts_clean() {
        let env = Environment::new();
        assert_eq!(env.shell_pid, std::process::id());
        assert_eq!(env.last_status, LastStatus::Exited(0));
        assert!(!env.should_exit);
    }
}
