use std::io::Write;
use std::sync::Arc;

use nix::sys::signal::{self, Signal};

use crate::command::{Command, ExitCode, Flow, LastStatus};
use crate::config::ShellConfig;
use crate::env::Environment;
use crate::io_adapters::LineSource;
use crate::launcher::{self, Launch};
use crate::lexer;
use crate::parser::{self, CommandDescriptor, ParseOptions};
use crate::state::SharedState;

/// The prompt loop: reads lines, runs them, and reports finished jobs.
///
/// Everything written by the shell itself (builtin output, job notices,
/// diagnostics) goes to the `out` writer handed to each call; children write
/// to the inherited standard streams.
///
/// Example
/// ```no_run
/// use jobsh::Interpreter;
/// use jobsh::io_adapters::Script;
///
/// let mut sh = Interpreter::default();
/// let mut source = Script::new(std::io::Cursor::new("status\nexit\n"), std::io::sink());
/// let code = sh.repl(&mut source, &mut std::io::stdout()).unwrap();
/// assert_eq!(code, 3);
/// ```
pub struct Interpreter {
    env: Environment,
    state: Arc<SharedState>,
    config: ShellConfig,
}

impl Interpreter {
    pub fn new(config: ShellConfig, state: Arc<SharedState>) -> Self {
        Self {
            env: Environment::new(),
            state,
            config,
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn last_status(&self) -> LastStatus {
        self.env.last_status
    }

    /// Runs until `exit` or end of input and returns the process exit code.
    pub fn repl(&mut self, source: &mut dyn LineSource, out: &mut dyn Write) -> anyhow::Result<ExitCode> {
        loop {
            self.report_finished_jobs(out)?;

            let Some(line) = source.read_line(&self.config.prompt)? else {
                tracing::info!("end of input");
                return self.shutdown(out, 0);
            };

            if let Flow::Exit(code) = self.execute_line(&line, out)? {
                return Ok(code);
            }
        }
    }

    /// Handles one raw input line.
    pub fn execute_line(&mut self, line: &str, out: &mut dyn Write) -> anyhow::Result<Flow> {
        // The limit counts the trailing newline.
        if line.len() >= self.config.max_line_len {
            tracing::warn!(len = line.len(), limit = self.config.max_line_len, "ignoring overlong line");
            return Ok(Flow::Continue);
        }

        let Some(tokens) = lexer::split_into_tokens(line, self.env.shell_pid) else {
            return Ok(Flow::Continue);
        };
        let options = ParseOptions {
            foreground_only: self.state.foreground_only(),
            max_args: self.config.max_args,
            null_device: &self.config.null_device,
        };
        let Some(descriptor) = parser::construct_descriptor(tokens, options) else {
            return Ok(Flow::Continue);
        };

        match Command::classify(descriptor) {
            Command::Builtin(builtin) => {
                builtin.execute(out, &mut self.env)?;
                if self.env.should_exit {
                    let code = self.config.shutdown_exit_code;
                    return self.shutdown(out, code).map(Flow::Exit);
                }
            }
            Command::External(descriptor) => self.run_external(&descriptor, out)?,
        }
        Ok(Flow::Continue)
    }

    fn run_external(&mut self, descriptor: &CommandDescriptor, out: &mut dyn Write) -> anyhow::Result<()> {
        out.flush()?;
        match launcher::launch(descriptor, &self.state) {
            Ok(Launch::Background { pid, .. }) => {
                writeln!(out, "background pid is {}", pid)?;
            }
            Ok(Launch::Foreground(status)) => {
                self.env.last_status = status;
                if let LastStatus::Signaled(_) = status {
                    writeln!(out, "{}", status)?;
                }
            }
            Err(e) => {
                tracing::warn!(program = %descriptor.program, "launch failed: {}", e);
                writeln!(out, "{}: {}", descriptor.program, e)?;
                self.env.last_status = LastStatus::Exited(1);
            }
        }
        out.flush()?;
        Ok(())
    }

    /// Prints every queued completion notice, oldest first.
    pub fn report_finished_jobs(&self, out: &mut dyn Write) -> std::io::Result<()> {
        for event in self.state.notices.drain() {
            writeln!(out, "{}", event)?;
        }
        let dropped = self.state.notices.take_dropped();
        if dropped > 0 {
            tracing::warn!(dropped, "completion notices discarded, queue was full");
        }
        out.flush()
    }

    /// Reports pending notices and sends SIGTERM to every tracked job.
    ///
    /// Jobs are not waited for. Returns `code` so callers can hand it to
    /// `std::process::exit`.
    pub fn shutdown(&mut self, out: &mut dyn Write, code: ExitCode) -> anyhow::Result<ExitCode> {
        self.report_finished_jobs(out)?;
        for pid in self.state.jobs.take_all() {
            if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
                tracing::debug!(%pid, "could not terminate job: {}", e);
            }
        }
        tracing::info!(code, "shell exiting");
        Ok(code)
    }
}

impl Default for Interpreter {
    /// An interpreter with the reference limits and a fresh shared state.
    ///
    /// No signal handler is installed; see [`crate::signals::install_shell_handlers`].
    fn default() -> Self {
        let config = ShellConfig::default();
        let state = Arc::new(SharedState::new(&config));
        Self::new(config, state)
    }
}
