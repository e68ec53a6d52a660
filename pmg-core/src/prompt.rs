//! Interactive input, injected wherever an operation needs an answer from the user.

use crate::error::Result;
use std::collections::VecDeque;

/// Source of answers to interactive questions.
pub trait Prompt {
    /// Ask a question and return the trimmed answer. An empty string means no answer.
    fn ask(&mut self, question: &str) -> Result<String>;

    /// Ask a yes/no question; `y` and `yes` (any case) confirm.
    fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self.ask(&format!("{} (y/n):", question))?;
        Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

/// Prompt that replays a fixed list of answers, for scripted runs and tests.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    /// Questions asked so far, in order.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        self.asked.push(question.to_string());
        Ok(self.answers.pop_front().unwrap_or_default().trim().to_string())
    }
}
