//! Interactive prompts.

use std::collections::VecDeque;
use std::io::{self, IsTerminal, Write};

use colored::Colorize;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use crate::signal;

/// Source of interactive answers.
pub trait Prompter {
    /// Ask for a value. Secret values are not echoed.
    fn prompt(&mut self, label: &str, secret: bool) -> io::Result<String>;

    /// Ask a yes/no question. Anything but yes is no.
    fn confirm(&mut self, question: &str) -> io::Result<bool>;

    /// Tell the user something without expecting an answer.
    fn notify(&mut self, message: &str);
}

impl<P: Prompter + ?Sized> Prompter for &mut P {
    fn prompt(&mut self, label: &str, secret: bool) -> io::Result<String> {
        (**self).prompt(label, secret)
    }

    fn confirm(&mut self, question: &str) -> io::Result<bool> {
        (**self).confirm(question)
    }

    fn notify(&mut self, message: &str) {
        (**self).notify(message)
    }
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt(&mut self, label: &str, secret: bool) -> io::Result<String> {
        eprint!("{label}: ");
        io::stderr().flush()?;

        if secret && io::stdin().is_terminal() {
            read_hidden()
        } else {
            read_line()
        }
    }

    fn confirm(&mut self, question: &str) -> io::Result<bool> {
        eprint!("{question} (y/N) ");
        io::stderr().flush()?;

        let answer = read_line()?;
        Ok(matches!(
            answer.trim().to_ascii_lowercase().as_str(),
            "y" | "yes"
        ))
    }

    fn notify(&mut self, message: &str) {
        eprintln!("{}", message.yellow());
    }
}

fn read_line() -> io::Result<String> {
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "end of input while waiting for an answer",
        ));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

fn read_hidden() -> io::Result<String> {
    let mut value = String::new();
    {
        enable_raw_mode()?;
        let raw_guard = RawModeGuard;

        loop {
            let Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) = event::read()?
            else {
                continue;
            };
            if kind != KeyEventKind::Press {
                continue;
            }

            match code {
                KeyCode::Enter => break,
                KeyCode::Backspace => {
                    value.pop();
                }
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                    // Raw mode swallows SIGINT.
                    drop(raw_guard);
                    signal::exit_interrupted();
                }
                KeyCode::Char(c) => value.push(c),
                _ => {}
            }
        }
    }
    eprintln!();
    Ok(value)
}

/// Prompter that replays canned answers, for tests and scripted use.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    confirm: bool,
    prompts: usize,
    notices: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Answer every confirmation with `answer`.
    pub fn confirming(mut self, answer: bool) -> Self {
        self.confirm = answer;
        self
    }

    /// Number of prompts answered so far.
    pub fn prompts(&self) -> usize {
        self.prompts
    }

    /// Number of notices shown so far.
    pub fn notices(&self) -> usize {
        self.notices.len()
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt(&mut self, label: &str, _secret: bool) -> io::Result<String> {
        let answer = self.answers.pop_front().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("no scripted answer for '{label}'"),
            )
        })?;
        self.prompts += 1;
        Ok(answer)
    }

    fn confirm(&mut self, _question: &str) -> io::Result<bool> {
        Ok(self.confirm)
    }

    fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}
