use std::io::{BufRead, Write};

use anyhow::{bail, Result};

pub trait Confirm {
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool>;
}

/// Yes/No question on a line based terminal.
///
/// An empty answer picks the default. Anything that is not `yes` or `no`
/// (case insensitive) asks the question again. Reads from any `BufRead`
/// so the loop can be driven without a terminal.
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Confirm for TerminalPrompt<R, W> {
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        let default_answer = if default { "Yes" } else { "No" };

        loop {
            write!(
                self.output,
                "{question} (Yes/No, default {default_answer}): "
            )?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                bail!("Input closed before the question was answered");
            }

            let line = line.trim_end_matches(&['\r', '\n'][..]);
            let answer = if line.is_empty() { default_answer } else { line };
            match answer.to_lowercase().as_str() {
                "yes" => return Ok(true),
                "no" => return Ok(false),
                _ => continue,
            }
        }
    }
}
