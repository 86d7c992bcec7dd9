//! A small job-control shell.
//!
//! Each input line is split into words (with `$$` expanded to the shell's
//! pid), turned into a [`parser::CommandDescriptor`], and either handled by a
//! builtin (`exit`, `status`, `cd`) or run as a child process with optional
//! `<`/`>` redirection. A trailing `&` runs the child in the background; its
//! completion is collected by a SIGCHLD handler and reported before the next
//! prompt. SIGTSTP toggles a foreground-only mode in which `&` is ignored.
//!
//! The main entry point is [`Interpreter`]. State shared with signal handlers
//! lives in [`state::SharedState`] and is made only of fixed-size atomics.

pub mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod interpreter;
pub mod io_adapters;
pub mod jobs;
pub mod launcher;
pub mod lexer;
pub mod notify;
pub mod parser;
pub mod signals;
pub mod state;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
