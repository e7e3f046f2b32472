use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender};
use tracing::debug;

use crate::command::Command;
use crate::error::{Result, SequencerError};
use crate::events::Notification;
use crate::timing::Scheduler;

/// Control side of a running scheduler thread.
pub struct EngineHandle {
    command_tx: Sender<Command>,
    ack_rx: Receiver<()>,
    update_rx: Receiver<Notification>,
    thread: JoinHandle<Scheduler>,
}

/// Asks a running scheduler to stop.
#[derive(Clone)]
pub struct Interrupter {
    command_tx: Sender<Command>,
}

impl Interrupter {
    /// Returns false if the scheduler had already stopped.
    pub fn interrupt(&self) -> bool {
        self.command_tx.send(Command::Quit).is_ok()
    }
}

/// Moves the scheduler onto its own thread and starts playing.
pub fn spawn_engine(scheduler: Scheduler) -> EngineHandle {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (ack_tx, ack_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    let mut scheduler = scheduler.with_updates(update_tx);
    let thread = std::thread::spawn(move || {
        scheduler.run(&command_rx, &ack_tx);
        scheduler
    });

    EngineHandle {
        command_tx,
        ack_rx,
        update_rx,
        thread,
    }
}

impl EngineHandle {
    /// Sends a command. Tempo and meter changes block until the scheduler
    /// has applied them.
    pub fn dispatch(&self, command: Command) -> Result<()> {
        let needs_ack = command.requires_ack();
        debug!(%command, "dispatching");
        self.command_tx
            .send(command)
            .map_err(|_| SequencerError::EngineStopped)?;
        if needs_ack {
            self.ack_rx
                .recv()
                .map_err(|_| SequencerError::EngineStopped)?;
        }
        Ok(())
    }

    /// Stop-only handle for signal handlers and other threads. It can only
    /// send `Quit`, which is never acknowledged, so acks stay paired with
    /// the `dispatch` call that waits for them.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            command_tx: self.command_tx.clone(),
        }
    }

    pub fn try_update(&self) -> Option<Notification> {
        self.update_rx.try_recv().ok()
    }

    pub fn updates(&self) -> &Receiver<Notification> {
        &self.update_rx
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the scheduler to stop and hands it back. Closing the
    /// command channel is itself a stop request, so this returns even
    /// without a prior quit unless an `Interrupter` is still alive.
    pub fn join(self) -> Result<Scheduler> {
        let EngineHandle {
            command_tx, thread, ..
        } = self;
        drop(command_tx);
        thread.join().map_err(|_| SequencerError::EngineStopped)
    }
}
