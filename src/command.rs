use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which track(s) a regeneration applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSelector {
    All,
    Named(String),
}

/// A validated instruction for the scheduler. Built only by the control
/// surface; the scheduler never sees malformed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    SetBpm(u32),
    RegenerateTrack(TrackSelector),
    ExportMidi(PathBuf),
    ModulateMeter,
}

impl Command {
    /// Commands the caller waits on until the scheduler has applied them.
    pub fn requires_ack(&self) -> bool {
        matches!(self, Command::SetBpm(_) | Command::ModulateMeter)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Quit => write!(f, "quit"),
            Command::SetBpm(bpm) => write!(f, "bpm {bpm}"),
            Command::RegenerateTrack(TrackSelector::All) => write!(f, "regen all"),
            Command::RegenerateTrack(TrackSelector::Named(name)) => write!(f, "regen {name}"),
            Command::ExportMidi(path) => write!(f, "export {}", path.display()),
            Command::ModulateMeter => write!(f, "modulate"),
        }
    }
}

/// A line of user input after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("nothing entered")]
    Empty,
    #[error("unknown command '{0}', type 'help' for a list")]
    UnknownKeyword(String),
    #[error("'{keyword}' needs {expected}")]
    MissingArgument {
        keyword: &'static str,
        expected: &'static str,
    },
    #[error("'{keyword}' takes no argument '{found}'")]
    UnexpectedArgument {
        keyword: &'static str,
        found: String,
    },
    #[error("tempo must be a positive integer, got '{0}'")]
    InvalidBpm(String),
    #[error("unknown track '{0}'")]
    UnknownTrack(String),
}

pub const HELP: &str = "\
commands:
  bpm <n>                 change tempo (positive integer)
  regen <track|all>       generate a new rhythm from the current meter's model
  modulate                switch to the next meter
  export <path>           write the current tracks to a MIDI file
  help                    show this list
  quit                    stop and exit";

fn no_argument(keyword: &'static str, rest: &str) -> Result<(), CommandError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(CommandError::UnexpectedArgument {
            keyword,
            found: rest.to_string(),
        })
    }
}

/// Parses one line of user input. Keywords and track names are matched
/// case-insensitively; the track name in the result is the configured
/// spelling.
pub fn parse_input(line: &str, track_names: &[String]) -> Result<Input, CommandError> {
    let line = line.trim();
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };
    if keyword.is_empty() {
        return Err(CommandError::Empty);
    }

    let command = match keyword.to_ascii_lowercase().as_str() {
        "help" => {
            no_argument("help", rest)?;
            return Ok(Input::Help);
        }
        "quit" => {
            no_argument("quit", rest)?;
            Command::Quit
        }
        "modulate" => {
            no_argument("modulate", rest)?;
            Command::ModulateMeter
        }
        "bpm" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    keyword: "bpm",
                    expected: "a tempo",
                });
            }
            let bpm = match rest.parse::<u32>() {
                Ok(bpm) if bpm > 0 => bpm,
                _ => return Err(CommandError::InvalidBpm(rest.to_string())),
            };
            Command::SetBpm(bpm)
        }
        "regen" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    keyword: "regen",
                    expected: "a track name or 'all'",
                });
            }
            if rest.contains(char::is_whitespace) {
                return Err(CommandError::UnknownTrack(rest.to_string()));
            }
            if rest.eq_ignore_ascii_case("all") {
                Command::RegenerateTrack(TrackSelector::All)
            } else {
                let name = track_names
                    .iter()
                    .find(|name| name.eq_ignore_ascii_case(rest))
                    .ok_or_else(|| CommandError::UnknownTrack(rest.to_string()))?;
                Command::RegenerateTrack(TrackSelector::Named(name.clone()))
            }
        }
        "export" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    keyword: "export",
                    expected: "a file path",
                });
            }
            Command::ExportMidi(PathBuf::from(rest))
        }
        _ => return Err(CommandError::UnknownKeyword(keyword.to_string())),
    };

    Ok(Input::Command(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["high".into(), "mid".into(), "low".into()]
    }

    fn parse(line: &str) -> Result<Input, CommandError> {
        parse_input(line, &names())
    }

    #[test]
    fn parses_the_vocabulary() {
        assert_eq!(parse("quit"), Ok(Input::Command(Command::Quit)));
        assert_eq!(parse("  BPM 140 "), Ok(Input::Command(Command::SetBpm(140))));
        assert_eq!(
            parse("regen ALL"),
            Ok(Input::Command(Command::RegenerateTrack(TrackSelector::All)))
        );
        assert_eq!(
            parse("Regen Low"),
            Ok(Input::Command(Command::RegenerateTrack(TrackSelector::Named(
                "low".into()
            ))))
        );
        assert_eq!(
            parse("export out/my beat.mid"),
            Ok(Input::Command(Command::ExportMidi(PathBuf::from(
                "out/my beat.mid"
            ))))
        );
        assert_eq!(parse("modulate"), Ok(Input::Command(Command::ModulateMeter)));
        assert_eq!(parse("help"), Ok(Input::Help));
    }

    #[test]
    fn rejects_malformed_tempo() {
        assert_eq!(parse("bpm 0"), Err(CommandError::InvalidBpm("0".into())));
        assert_eq!(parse("bpm -5"), Err(CommandError::InvalidBpm("-5".into())));
        assert_eq!(parse("bpm 12.5"), Err(CommandError::InvalidBpm("12.5".into())));
        assert!(matches!(
            parse("bpm"),
            Err(CommandError::MissingArgument { keyword: "bpm", .. })
        ));
    }

    #[test]
    fn rejects_unknown_input() {
        assert_eq!(parse(""), Err(CommandError::Empty));
        assert_eq!(parse("   "), Err(CommandError::Empty));
        assert!(matches!(parse("play"), Err(CommandError::UnknownKeyword(_))));
        assert!(matches!(parse("regen cowbell"), Err(CommandError::UnknownTrack(_))));
        assert!(matches!(
            parse("quit now"),
            Err(CommandError::UnexpectedArgument { keyword: "quit", .. })
        ));
        assert!(matches!(
            parse("modulate 5/4"),
            Err(CommandError::UnexpectedArgument { .. })
        ));
    }

    #[test]
    fn only_tempo_and_meter_changes_are_acknowledged() {
        assert!(Command::SetBpm(90).requires_ack());
        assert!(Command::ModulateMeter.requires_ack());
        assert!(!Command::Quit.requires_ack());
        assert!(!Command::RegenerateTrack(TrackSelector::All).requires_ack());
        assert!(!Command::ExportMidi("x.mid".into()).requires_ack());
    }

    #[test]
    fn display_round_trips_through_the_parser() {
        for command in [
            Command::Quit,
            Command::SetBpm(97),
            Command::RegenerateTrack(TrackSelector::Named("mid".into())),
            Command::ModulateMeter,
        ] {
            assert_eq!(parse(&command.to_string()), Ok(Input::Command(command)));
        }
    }
}
