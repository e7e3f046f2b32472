mod console;

use std::io::{self, BufRead, IsTerminal, Write};
use std::time::Duration;

use crossbeam::channel::RecvTimeoutError;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal;
use tracing::warn;

use crate::command::{Command, CommandError, HELP, Input, parse_input};
use crate::engine::EngineHandle;
use crate::error::{Result, SequencerError};
use crate::events::Notification;

pub use console::{Console, Edit, LineEditor, LineEndings, PROMPT};

const INPUT_POLL: Duration = Duration::from_millis(50);
const SHUTDOWN_WAIT: Duration = Duration::from_secs(2);

/// Reads commands until the user quits. Uses a raw-mode line editor on a
/// terminal and plain line reading otherwise.
pub fn run_console(engine: &EngineHandle, track_names: &[String]) -> Result<()> {
    if io::stdin().is_terminal() {
        run_interactive(engine, track_names)
    } else {
        run_piped(engine, track_names, io::BufReader::new(io::stdin()), io::stdout())
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Handles one submitted line. Returns false once a quit went out or the
/// scheduler turns out to have stopped already.
fn handle_line<W: Write>(
    engine: &EngineHandle,
    track_names: &[String],
    line: &str,
    console: &mut Console<W>,
    pending: &str,
) -> Result<bool> {
    match parse_input(line, track_names) {
        Ok(Input::Help) => console.say(HELP, pending)?,
        Ok(Input::Command(command)) => {
            let quit = command == Command::Quit;
            return match engine.dispatch(command) {
                Ok(()) => Ok(!quit),
                Err(SequencerError::EngineStopped) => Ok(false),
                Err(e) => Err(e),
            };
        }
        Err(CommandError::Empty) => console.redraw(pending)?,
        Err(e) => console.say(&format!("error: {e}"), pending)?,
    }
    Ok(true)
}

/// Prints pending notifications. Returns true once the scheduler has
/// reported that it stopped.
fn drain_updates<W: Write>(
    engine: &EngineHandle,
    console: &mut Console<W>,
    pending: &str,
) -> io::Result<bool> {
    while let Some(update) = engine.try_update() {
        console.say(&update.to_string(), pending)?;
        if update == Notification::Stopped {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Prints what the scheduler reports until it confirms it has stopped.
fn wait_for_stop<W: Write>(engine: &EngineHandle, console: &mut Console<W>) -> io::Result<()> {
    loop {
        match engine.updates().recv_timeout(SHUTDOWN_WAIT) {
            Ok(Notification::Stopped) => return console.say("stopped", ""),
            Ok(update) => console.say(&update.to_string(), "")?,
            Err(_) => {
                warn!("scheduler did not confirm shutdown");
                return Ok(());
            }
        }
    }
}

fn run_interactive(engine: &EngineHandle, track_names: &[String]) -> Result<()> {
    let guard = RawModeGuard::enable()?;
    let mut console = Console::new(io::stdout(), true);
    let mut editor = LineEditor::default();
    console.say("type 'help' for commands", "")?;

    loop {
        if drain_updates(engine, &mut console, editor.buffer())? {
            return Ok(());
        }
        if !event::poll(INPUT_POLL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match editor.handle_key(key) {
            Some(Edit::Quit) => {
                console.say("quit", "")?;
                engine.interrupter().interrupt();
                break;
            }
            Some(Edit::Submit(line)) => {
                console.say(&format!("{PROMPT}{line}"), "")?;
                if !handle_line(engine, track_names, &line, &mut console, "")? {
                    break;
                }
            }
            None => console.redraw(editor.buffer())?,
        }
    }

    wait_for_stop(engine, &mut console)?;
    drop(guard);
    Ok(())
}

/// One command per input line; end of input means quit. Lines are read on
/// a separate thread so a scheduler stopped from elsewhere (a signal, say)
/// ends the session without waiting for more input.
pub fn run_piped<R, W>(
    engine: &EngineHandle,
    track_names: &[String],
    input: R,
    output: W,
) -> Result<()>
where
    R: BufRead + Send + 'static,
    W: Write,
{
    let mut console = Console::new(output, false);
    let (line_tx, line_rx) = crossbeam::channel::unbounded();
    std::thread::spawn(move || {
        for line in input.lines() {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        if drain_updates(engine, &mut console, "")? {
            return Ok(());
        }
        match line_rx.recv_timeout(INPUT_POLL) {
            Ok(line) => {
                if !handle_line(engine, track_names, &line?, &mut console, "")? {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                engine.interrupter().interrupt();
                break;
            }
        }
    }

    wait_for_stop(engine, &mut console)?;
    Ok(())
}
