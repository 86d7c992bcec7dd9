//! jobsh entry point.
//!
//! Usage:
//!   jobsh                  # Interactive prompt
//!   jobsh script.sh        # Run the lines of a file
//!   cmds | jobsh           # Run lines from a pipe
//!   jobsh --log debug      # More diagnostics on stderr

use std::fs::File;
use std::io::{self, BufReader, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use jobsh::Interpreter;
use jobsh::config::ShellConfig;
use jobsh::io_adapters::{LineSource, Script, Terminal};
use jobsh::signals;
use jobsh::state::SharedState;

#[derive(FromArgs)]
/// A small job-control shell.
struct Args {
    /// file to read commands from instead of standard input
    #[argh(positional)]
    script: Option<PathBuf>,

    /// log filter used when RUST_LOG is unset
    #[argh(option, default = "String::from(\"warn\")")]
    log: String,
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    match run(args) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("jobsh: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<i32> {
    let config = ShellConfig::default();
    let state = Arc::new(SharedState::new(&config));
    signals::install_shell_handlers(&state, &config.prompt).context("installing signal handlers")?;

    let mut source: Box<dyn LineSource> = match &args.script {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
            Box::new(Script::new(BufReader::new(file), io::sink()))
        }
        None if io::stdin().is_terminal() => Box::new(Terminal::new().context("starting line editor")?),
        None => Box::new(Script::new(io::stdin().lock(), io::stdout())),
    };
    tracing::info!(pid = std::process::id(), script = ?args.script, "shell started");

    let mut sh = Interpreter::new(config, state);
    sh.repl(source.as_mut(), &mut io::stdout())
}
