//! [`InputPort`] – where interactive config repair gets its answers.
//!
//! The config store never reads a terminal directly; it asks an injected
//! port for a value of a given type.  [`LinePrompt`] is the line-oriented
//! implementation used with stdin by the CLI and with in-memory cursors by
//! tests.

use std::io::{BufRead, Write};

use anvil_types::{KernelError, OptionType, Value};

/// Source of operator-supplied values.
pub trait InputPort {
    /// Show `description` and block until a value of type `ty` is obtained.
    fn prompt_typed(&mut self, ty: OptionType, description: &str) -> Result<Value, KernelError>;
}

/// Prompts on a writer and reads answers line by line from a reader.
///
/// Malformed answers are rejected and the question is asked again; there is
/// no timeout.  End of input yields [`KernelError::InputClosed`].
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use anvil_kernel::input::{InputPort, LinePrompt};
/// use anvil_types::{OptionType, Value};
///
/// let mut prompt = LinePrompt::new(Cursor::new("five\n5\n"), Vec::new());
/// let value = prompt.prompt_typed(OptionType::Number, "How many slots?").unwrap();
/// assert_eq!(value, Value::Number(5.0));
/// ```
pub struct LinePrompt<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: BufRead, W: Write> InputPort for LinePrompt<R, W> {
    fn prompt_typed(&mut self, ty: OptionType, description: &str) -> Result<Value, KernelError> {
        writeln!(self.writer, "{description}").map_err(console_error)?;
        loop {
            write!(self.writer, "{ty}> ").map_err(console_error)?;
            self.writer.flush().map_err(console_error)?;

            let mut line = String::new();
            if self.reader.read_line(&mut line).map_err(console_error)? == 0 {
                return Err(KernelError::InputClosed(ty));
            }
            if let Some(value) = ty.parse_input(&line) {
                return Ok(value);
            }
            writeln!(self.writer, "Not a valid {ty}, try again.").map_err(console_error)?;
        }
    }
}

fn console_error(e: std::io::Error) -> KernelError {
    KernelError::Console(e.to_string())
}
