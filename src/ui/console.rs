use std::io::{self, Write};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::{cursor, queue, terminal};

pub const PROMPT: &str = "> ";

/// What a keystroke amounts to once the editor has seen it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Submit(String),
    Quit,
}

/// Minimal single-line editor for raw mode: printable characters,
/// backspace and enter.
#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: String,
}

impl LineEditor {
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Edit> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c' | 'd') if ctrl => Some(Edit::Quit),
            KeyCode::Esc => Some(Edit::Quit),
            KeyCode::Enter => Some(Edit::Submit(std::mem::take(&mut self.buffer))),
            KeyCode::Backspace => {
                self.buffer.pop();
                None
            }
            KeyCode::Char(c) if !ctrl => {
                self.buffer.push(c);
                None
            }
            _ => None,
        }
    }
}

/// Line-oriented output that keeps the prompt and the partially typed
/// line at the bottom when the terminal is in raw mode.
pub struct Console<W: Write> {
    out: W,
    raw: bool,
}

impl<W: Write> Console<W> {
    pub fn new(out: W, raw: bool) -> Self {
        Self { out, raw }
    }

    pub fn say(&mut self, text: &str, pending: &str) -> io::Result<()> {
        if self.raw {
            queue!(
                self.out,
                cursor::MoveToColumn(0),
                terminal::Clear(terminal::ClearType::CurrentLine)
            )?;
            for line in text.lines() {
                write!(self.out, "{line}\r\n")?;
            }
            write!(self.out, "{PROMPT}{pending}")?;
        } else {
            for line in text.lines() {
                writeln!(self.out, "{line}")?;
            }
        }
        self.out.flush()
    }

    pub fn redraw(&mut self, pending: &str) -> io::Result<()> {
        if !self.raw {
            return Ok(());
        }
        queue!(
            self.out,
            cursor::MoveToColumn(0),
            terminal::Clear(terminal::ClearType::CurrentLine)
        )?;
        write!(self.out, "{PROMPT}{pending}")?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Rewrites bare `\n` as `\r\n` so log lines stay aligned while the
/// terminal is in raw mode.
pub struct LineEndings<W>(pub W);

impl<W: Write> Write for LineEndings<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;
        for (i, &byte) in buf.iter().enumerate() {
            if byte == b'\n' {
                self.0.write_all(&buf[start..i])?;
                self.0.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.0.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}
