use std::iter::Peekable;

use crate::config::{MAX_ARGS, NULL_DEVICE};

/// Structured form of one command line.
///
/// Invariants upheld by [`construct_descriptor`]:
/// - `program` is non-empty and equal to `arguments[0]`;
/// - `arguments` holds at most `max_args + 1` entries;
/// - `background` is never set while foreground-only mode is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Executable name or path.
    pub program: String,
    /// Argument vector, the program included as element 0.
    pub arguments: Vec<String>,
    /// File that replaces standard input (`< path`).
    pub input_path: Option<String>,
    /// File that replaces standard output (`> path`).
    pub output_path: Option<String>,
    /// Run without waiting for completion (trailing `&`).
    pub background: bool,
}

/// Limits applied while building a descriptor.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions<'a> {
    pub foreground_only: bool,
    pub max_args: usize,
    pub null_device: &'a str,
}

impl Default for ParseOptions<'_> {
    fn default() -> Self {
        Self {
            foreground_only: false,
            max_args: MAX_ARGS,
            null_device: NULL_DEVICE,
        }
    }
}

struct DescriptorBuilder<'a, I: Iterator<Item = String>> {
    tokens: Peekable<I>,
    options: ParseOptions<'a>,
}

impl<'a, I: Iterator<Item = String>> DescriptorBuilder<'a, I> {
    fn from(tokens: I, options: ParseOptions<'a>) -> Self {
        Self {
            tokens: tokens.peekable(),
            options,
        }
    }

    fn consume(&mut self) -> Option<String> {
        self.tokens.next()
    }

    fn at_end(&mut self) -> bool {
        self.tokens.peek().is_none()
    }

    fn build(mut self) -> Option<CommandDescriptor> {
        let program = self.consume()?;
        let mut descriptor = CommandDescriptor {
            arguments: vec![program.clone()],
            program,
            input_path: None,
            output_path: None,
            background: false,
        };

        while let Some(token) = self.consume() {
            match token.as_str() {
                // A redirection without operand is ignored.
                "<" => {
                    if let Some(path) = self.consume() {
                        descriptor.input_path = Some(path);
                    }
                }
                ">" => {
                    if let Some(path) = self.consume() {
                        descriptor.output_path = Some(path);
                    }
                }
                // Only a standalone `&` in last position backgrounds the command.
                "&" => descriptor.background = self.at_end(),
                _ => {
                    if descriptor.arguments.len() <= self.options.max_args {
                        descriptor.arguments.push(token);
                    }
                }
            }
        }

        if self.options.foreground_only {
            descriptor.background = false;
        }

        if descriptor.background {
            let null_device = self.options.null_device;
            descriptor
                .input_path
                .get_or_insert_with(|| null_device.to_string());
            descriptor
                .output_path
                .get_or_insert_with(|| null_device.to_string());
        }

        tracing::debug!(?descriptor, "constructed command descriptor");
        Some(descriptor)
    }
}

/// Consumes the words of a line into a [`CommandDescriptor`].
///
/// Returns `None` only when `tokens` is empty. Malformed input never fails:
/// a `<` or `>` without operand is dropped, an `&` followed by more words is
/// dropped, and words beyond `options.max_args` are discarded.
pub fn construct_descriptor<I>(tokens: I, options: ParseOptions<'_>) -> Option<CommandDescriptor>
where
    I: IntoIterator<Item = String>,
{
    DescriptorBuilder::from(tokens.into_iter(), options).build()
}
