use std::fs;
use std::path::Path;

use crate::error::{Result, SequencerError};

/// Joins the names of instruments that onset on the same sixteenth.
pub const COMPOSITE_SEPARATOR: &str = "+";

/// Marks an onset in a pattern string. Any other character is a rest.
pub const ONSET_MARK: char = 'x';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RhythmLine {
    pub name: String,
    pub pattern: Vec<bool>,
}

/// A reference rhythm: one fixed-width onset pattern per instrument,
/// covering exactly one bar and repeating cyclically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rhythm {
    lines: Vec<RhythmLine>,
    length: u32,
}

fn strip_comment(s: &str) -> &str {
    s.split('#').next().unwrap_or("")
}

fn parse_line(line: &str, line_no: usize) -> Result<RhythmLine> {
    let err = |message: String| SequencerError::RhythmFormat {
        line: line_no,
        message,
    };

    let mut parts = line.split_whitespace();
    let name = parts.next().ok_or_else(|| err("missing instrument name".into()))?;
    let pattern = parts
        .next()
        .ok_or_else(|| err(format!("missing pattern for '{name}'")))?;
    if let Some(extra) = parts.next() {
        return Err(err(format!("unexpected '{extra}' after pattern")));
    }
    if name.contains(COMPOSITE_SEPARATOR) {
        return Err(err(format!(
            "instrument name '{name}' contains '{COMPOSITE_SEPARATOR}'"
        )));
    }

    Ok(RhythmLine {
        name: name.to_string(),
        pattern: pattern.chars().map(|c| c == ONSET_MARK).collect(),
    })
}

impl Rhythm {
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines: Vec<RhythmLine> = Vec::new();
        let mut length: Option<usize> = None;

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            let parsed = parse_line(line, line_no)?;
            if lines.iter().any(|l| l.name == parsed.name) {
                return Err(SequencerError::RhythmFormat {
                    line: line_no,
                    message: format!("instrument '{}' listed twice", parsed.name),
                });
            }
            match length {
                None => length = Some(parsed.pattern.len()),
                Some(expected) if expected != parsed.pattern.len() => {
                    return Err(SequencerError::RhythmFormat {
                        line: line_no,
                        message: format!(
                            "pattern has {} subdivisions, expected {expected}",
                            parsed.pattern.len()
                        ),
                    });
                }
                Some(_) => {}
            }
            lines.push(parsed);
        }

        let length = length.ok_or(SequencerError::RhythmFormat {
            line: 0,
            message: "no instrument lines".into(),
        })?;

        Ok(Self {
            lines,
            length: length as u32,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Subdivisions per cycle.
    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|l| l.name.as_str())
    }

    /// Onset positions of one instrument, or `None` if it is not listed.
    pub fn onsets(&self, name: &str) -> Option<Vec<u32>> {
        let line = self.lines.iter().find(|l| l.name == name)?;
        Some(
            line.pattern
                .iter()
                .enumerate()
                .filter(|(_, on)| **on)
                .map(|(pos, _)| pos as u32)
                .collect(),
        )
    }

    /// The composite state name at every position: the instruments
    /// onsetting there, in file order, joined by the separator. Rests
    /// produce the empty name.
    pub fn composite_states(&self) -> Vec<String> {
        (0..self.length as usize)
            .map(|pos| {
                self.lines
                    .iter()
                    .filter(|l| l.pattern[pos])
                    .map(|l| l.name.as_str())
                    .collect::<Vec<_>>()
                    .join(COMPOSITE_SEPARATOR)
            })
            .collect()
    }
}
