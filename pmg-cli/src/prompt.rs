//! Terminal prompt.

use pmg_core::{Prompt, Result};
use std::io::{self, BufRead, Write};

/// Reads answers from stdin, one line per question.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        print!("{} ", question);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}
