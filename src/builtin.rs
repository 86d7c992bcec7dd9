use crate::env::Environment;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process. They ignore redirection and `&`.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "status" or "cd".
    fn name() -> &'static str;

    /// Executes the command, writing any output to `stdout`.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<()>;
}

/// Output of `argh` when the arguments were rejected or help was requested.
#[derive(Debug)]
pub struct InvalidArgs {
    output: String,
    is_error: bool,
}

/// The closed set of builtins, selected by the exact first word of a line.
#[derive(Debug)]
pub enum Builtin {
    Exit(Exit),
    Status(Status),
    Cd(Cd),
    Invalid(InvalidArgs),
}

fn try_parse<T: BuiltinCommand>(
    name: &str,
    args: &[&str],
    wrap: fn(T) -> Builtin,
) -> Option<Builtin> {
    if name != T::name() {
        return None;
    }
    Some(match T::from_args(&[name], args) {
        Ok(cmd) => wrap(cmd),
        Err(EarlyExit { output, status }) => Builtin::Invalid(InvalidArgs {
            output,
            is_error: status.is_err(),
        }),
    })
}

fn run<T: BuiltinCommand>(cmd: T, stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
    if let Err(e) = cmd.execute(stdout, env) {
        tracing::debug!(builtin = T::name(), "builtin failed: {:#}", e);
        writeln!(stdout, "{:#}", e)?;
    }
    Ok(())
}

impl Builtin {
    /// Returns `None` when `name` is not a builtin.
    pub fn parse(name: &str, args: &[&str]) -> Option<Self> {
        try_parse::<Exit>(name, args, Builtin::Exit)
            .or_else(|| try_parse::<Status>(name, args, Builtin::Status))
            .or_else(|| try_parse::<Cd>(name, args, Builtin::Cd))
    }

    /// Runs the builtin. Failures are reported on `stdout` and never change
    /// the last status; only errors writing to `stdout` itself propagate.
    pub fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        match self {
            Builtin::Exit(cmd) => run(cmd, stdout, env),
            Builtin::Status(cmd) => run(cmd, stdout, env),
            Builtin::Cd(cmd) => run(cmd, stdout, env),
            Builtin::Invalid(invalid) => {
                if invalid.is_error {
                    tracing::debug!("rejected builtin arguments");
                }
                stdout.write_all(invalid.output.as_bytes())?;
                Ok(())
            }
        }
    }
}

#[derive(FromArgs, Debug)]
/// Terminate background jobs and leave the shell.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        env.should_exit = true;
        Ok(())
    }
}

#[derive(FromArgs, Debug)]
/// Print the exit value or terminating signal of the last foreground command.
pub struct Status {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Status {
    fn name() -> &'static str {
        "status"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        writeln!(stdout, "{}", env.last_status)?;
        Ok(())
    }
}

#[derive(FromArgs, Debug)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional, greedy)]
    /// directory to switch to; absolute or relative to the current directory. Extra words are ignored.
    pub targets: Vec<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        let target = match self.targets.first() {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => return Err(anyhow::anyhow!("cd: no target and HOME not set")),
            },
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::LastStatus;
    use std::env as stdenv;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn test_env() -> Environment {
        let mut env = Environment::new();
        env.current_dir = stdenv::current_dir().unwrap();
        env.shell_pid = 1;
        env
    }

    #[test]
    fn test_parse_recognizes_only_builtins() {
        assert!(matches!(Builtin::parse("exit", &[]), Some(Builtin::Exit(_))));
        assert!(matches!(Builtin::parse("status", &["x"]), Some(Builtin::Status(_))));
        assert!(matches!(Builtin::parse("cd", &["a", "b"]), Some(Builtin::Cd(_))));
        assert!(Builtin::parse("ls", &[]).is_none());
        assert!(Builtin::parse("Exit", &[]).is_none());
    }

    #[test]
    fn test_help_flag_is_reported_not_executed() {
        let mut env = test_env();
        let mut out = Vec::new();
        let builtin = Builtin::parse("exit", &["--help"]).unwrap();
        assert!(matches!(builtin, Builtin::Invalid(_)));
        builtin.execute(&mut out, &mut env).unwrap();
        assert!(!env.should_exit);
        assert!(String::from_utf8(out).unwrap().contains("Usage: exit"));
    }

    #[test]
    fn test_status_prints_last_status() {
        let mut env = test_env();
        let mut out = Vec::new();
        Builtin::parse("status", &[])
            .unwrap()
            .execute(&mut out, &mut env)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "exit value 0\n");

        env.last_status = LastStatus::Signaled(2);
        let mut out = Vec::new();
        Builtin::parse("status", &[])
            .unwrap()
            .execute(&mut out, &mut env)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "terminated by signal 2\n");
    }

    #[test]
    fn test_exit_requests_shutdown() {
        let mut env = test_env();
        Builtin::parse("exit", &["now"])
            .unwrap()
            .execute(&mut Vec::new(), &mut env)
            .unwrap();
        assert!(env.should_exit);
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_current_dir();
        let temp = tempfile::tempdir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(temp.path()).expect("canonicalize failed");
        let orig = stdenv::current_dir().unwrap();

        let mut env = test_env();
        let cmd = Cd {
            targets: vec![canonical_temp.to_string_lossy().to_string()],
        };
        let res = cmd.execute(&mut Vec::new(), &mut env);
        let new_cwd = stdenv::current_dir().unwrap();
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert!(res.is_ok());
        assert_eq!(fs::canonicalize(new_cwd).unwrap(), canonical_temp);
        assert_eq!(env.current_dir, canonical_temp);
    }

    #[test]
    fn test_cd_to_home_when_none() {
        let _lock = lock_current_dir();
        let temp = tempfile::tempdir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(temp.path()).expect("canonicalize failed");
        let orig = stdenv::current_dir().unwrap();

        let mut env = test_env();
        env.set_var("HOME", canonical_temp.to_string_lossy().to_string());

        let res = Cd { targets: vec![] }.execute(&mut Vec::new(), &mut env);
        let new_cwd = stdenv::current_dir().unwrap();
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert!(res.is_ok());
        assert_eq!(fs::canonicalize(new_cwd).unwrap(), canonical_temp);
        assert_eq!(env.current_dir, canonical_temp);
    }

    #[test]
    fn test_cd_nonexistent_path_reports_and_keeps_state() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let mut env = test_env();
        env.last_status = LastStatus::Exited(4);

        let name = format!("nonexistent_dir_for_cd_test_{}", std::process::id());
        let mut out = Vec::new();
        Builtin::parse("cd", &[name.as_str()])
            .unwrap()
            .execute(&mut out, &mut env)
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.starts_with("cd: "), "unexpected diagnostic: {printed}");
        assert!(printed.contains(&name));
        assert_eq!(stdenv::current_dir().unwrap(), orig);
        assert_eq!(env.current_dir, orig);
        assert_eq!(env.last_status, LastStatus::Exited(4));
    }
}
