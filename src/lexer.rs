//! A module implementing lexical analysis (tokenization) of a command line.
//!
//! Words are separated by spaces and newlines only. There is no quoting and no
//! escaping; the single substitution performed is `$$`, which becomes the
//! decimal process id of the shell.

use std::str::Split;

/// Marker replaced by the shell's process id inside any word.
pub const PID_MARKER: &str = "$$";

/// Lazy sequence of expanded words of a single line.
///
/// Produced by [`split_into_tokens`]. Each word is expanded only when it is
/// pulled from the iterator.
pub struct Tokens<'a> {
    words: Split<'a, [char; 2]>,
    pid: String,
}

impl Iterator for Tokens<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let word = self.words.next()?;
            if !word.is_empty() {
                return Some(substitute(word, &self.pid));
            }
        }
    }
}

fn is_delimiter(c: char) -> bool {
    c == ' ' || c == '\n'
}

fn substitute(word: &str, pid: &str) -> String {
    if word.contains(PID_MARKER) {
        word.replace(PID_MARKER, pid)
    } else {
        word.to_string()
    }
}

/// Replaces every `$$` in `token` with `pid`.
///
/// Occurrences are matched left to right without overlap, so `$$$` becomes
/// the pid followed by a single `$`.
pub fn expand_pid(token: &str, pid: u32) -> String {
    substitute(token, &pid.to_string())
}

/// Returns true when the line carries no command: it is empty, made only of
/// delimiters, or its first non-delimiter byte is `#`.
pub fn is_skippable(line: &str) -> bool {
    match line.trim_start_matches(is_delimiter).as_bytes().first() {
        None => true,
        Some(b) => *b == b'#',
    }
}

/// Splits a raw line into words, expanding `$$` to `pid` in each of them.
///
/// Returns `None` for lines that must be skipped (see [`is_skippable`]); the
/// caller is expected to prompt again without building a command.
pub fn split_into_tokens(line: &str, pid: u32) -> Option<Tokens<'_>> {
    if is_skippable(line) {
        return None;
    }
    Some(Tokens {
        words: line.split([' ', '\n']),
        pid: pid.to_string(),
    })
}
