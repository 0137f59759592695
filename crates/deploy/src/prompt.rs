//! Operator prompts.
//!
//! The prompt strategy is picked once per run: a terminal on stdin gets interactive
//! questions, anything else is headless and every answer must come from arguments.

use std::{
    collections::VecDeque,
    io::{BufRead, IsTerminal, Write},
};

use crate::error::{DeployError, Result};

/// Source of operator answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompter {
    /// Questions are written to stderr and answers read from stdin.
    Terminal,
    /// Answers are replayed from a queue. Once exhausted, behaves like [`Prompter::Headless`].
    Scripted(VecDeque<String>),
    /// No operator is available.
    Headless,
}

impl Prompter {
    /// Pick the prompt strategy from the kind of stdin attached to the process.
    pub fn detect() -> Self {
        if std::io::stdin().is_terminal() {
            Prompter::Terminal
        } else {
            Prompter::Headless
        }
    }

    /// Build a prompter that replays the given answers in order.
    pub fn scripted<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Prompter::Scripted(answers.into_iter().map(Into::into).collect())
    }

    /// Ask a question and return the answer without its line terminator.
    ///
    /// Returns `None` when no answer can be obtained (headless run, closed stdin or an
    /// exhausted script).
    pub async fn ask(&mut self, question: &str) -> Result<Option<String>> {
        match self {
            Prompter::Terminal => {
                let question = question.to_string();
                tokio::task::spawn_blocking(move || read_terminal_line(&question))
                    .await
                    .map_err(|e| DeployError::Prompt(std::io::Error::other(e)))?
                    .map_err(DeployError::Prompt)
            }
            Prompter::Scripted(answers) => Ok(answers.pop_front()),
            Prompter::Headless => Ok(None),
        }
    }

    /// Ask a yes/no question. Anything but `y`/`yes` counts as a no.
    pub async fn confirm(&mut self, question: &str) -> Result<Option<bool>> {
        let answer = self.ask(&format!("{question} [y/N]")).await?;
        Ok(answer.map(|answer| {
            matches!(
                answer.trim().to_ascii_lowercase().as_str(),
                "y" | "yes"
            )
        }))
    }
}

fn read_terminal_line(question: &str) -> std::io::Result<Option<String>> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{question} ")?;
    stderr.flush()?;

    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Ok(None);
    }

    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}
