//! Operator prompt used while repairing settings at boot.

use std::io::{BufRead, Write};

use anvil_kernel::{InputPort, LinePrompt};
use anvil_types::{KernelError, OptionType, Value};
use colored::Colorize;

/// Wraps a [`LinePrompt`] with a highlighted notice so repair questions stand
/// out from the boot log.
pub struct RepairPrompt<R, W> {
    inner: LinePrompt<R, W>,
    asked: usize,
}

impl<R: BufRead, W: Write> RepairPrompt<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            inner: LinePrompt::new(reader, writer),
            asked: 0,
        }
    }

    /// Number of questions asked so far.
    pub fn asked(&self) -> usize {
        self.asked
    }

    #[cfg(test)]
    fn into_writer(self) -> W {
        self.inner.into_parts().1
    }
}

impl<R: BufRead, W: Write> InputPort for RepairPrompt<R, W> {
    fn prompt_typed(&mut self, ty: OptionType, description: &str) -> Result<Value, KernelError> {
        self.asked += 1;
        let notice = format!("⚠  setting needs a {ty} value", ty = ty.to_string().bold());
        let question = format!("{}\n  {description}", notice.yellow());
        self.inner.prompt_typed(ty, &question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn retries_until_the_answer_parses() {
        colored::control::set_override(false);
        let mut prompt = RepairPrompt::new(Cursor::new("\nlots\n12\n"), Vec::new());
        let value = prompt
            .prompt_typed(OptionType::Number, "[heartbeat] every: Timer ticks per beat")
            .unwrap();
        assert_eq!(value, Value::Number(12.0));
        assert_eq!(prompt.asked(), 1);

        let out = String::from_utf8(prompt.into_writer()).unwrap();
        assert!(out.contains("setting needs a number value"));
        assert!(out.contains("[heartbeat] every: Timer ticks per beat"));
        assert_eq!(out.matches("Not a valid number").count(), 2);
    }

    #[test]
    fn closed_stdin_aborts() {
        let mut prompt = RepairPrompt::new(Cursor::new(""), Vec::new());
        assert!(matches!(
            prompt.prompt_typed(OptionType::String, "label"),
            Err(KernelError::InputClosed(OptionType::String))
        ));
    }
}
