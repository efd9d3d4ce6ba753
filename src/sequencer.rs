use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;

use crate::error::{PortError, Result, SequencerError};
use crate::midi::{MidiMessage, OutputPort};
use crate::timing::{Clock, DEFAULT_TICK_PERIOD, EventQueue, IntervalClock};

/// Failures kept for [`Sequencer::failures`] before new ones are dropped.
const FAILURE_BACKLOG: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Stopped,
    Running,
    Closed,
}

/// A scheduled message that could not be written to the output port.
#[derive(Debug, Clone, Error)]
#[error("failed to send {message:?} due at tick {target_tick} (tick {tick}): {error}")]
pub struct TransmissionFailure {
    pub message: MidiMessage,
    pub target_tick: u64,
    pub tick: u64,
    pub port: Option<String>,
    #[source]
    pub error: PortError,
}

/// State shared between callers and the worker, behind a single lock.
struct Core {
    queue: EventQueue,
    tick: u64,
    port: Option<Box<dyn OutputPort>>,
    closed: bool,
    failures: Sender<TransmissionFailure>,
}

impl Core {
    fn enqueue(&mut self, message: MidiMessage, delay: u64) -> Result<()> {
        if self.closed {
            return Err(SequencerError::SequencerClosed);
        }
        let target = self.tick.saturating_add(delay);
        tracing::trace!(?message, delay, target, "enqueue");
        self.queue.push(target, message);
        Ok(())
    }

    fn enqueue_all(&mut self, batch: Vec<(MidiMessage, u64)>) -> Result<()> {
        if self.closed {
            return Err(SequencerError::SequencerClosed);
        }
        let tick = self.tick;
        tracing::trace!(messages = batch.len(), tick, "enqueue batch");
        for (message, delay) in batch {
            self.queue.push(tick.saturating_add(delay), message);
        }
        Ok(())
    }

    /// Sends everything due at the current tick, then advances the counter.
    fn run_pass(&mut self) {
        for entry in self.queue.drain_due(self.tick) {
            let result = match self.port.as_mut() {
                Some(port) => port.send(entry.message.as_bytes()),
                None => Err(PortError::NotConnected),
            };
            if let Err(error) = result {
                let failure = TransmissionFailure {
                    message: entry.message,
                    target_tick: entry.target_tick,
                    tick: self.tick,
                    port: self.port.as_ref().map(|p| p.name().to_string()),
                    error,
                };
                tracing::warn!(
                    bytes = ?failure.message,
                    port = ?failure.port,
                    error = %failure.error,
                    "MIDI transmission failed"
                );
                let _ = self.failures.try_send(failure);
            }
        }
        self.tick += 1;
    }
}

enum Lifecycle<C> {
    Stopped(C),
    Running {
        worker: JoinHandle<C>,
        stop: Sender<()>,
    },
    Closed,
}

/// Background sender of delayed MIDI messages.
///
/// Messages are queued with a delay in ticks and written to the output
/// port by a dedicated thread on the pass where the tick counter reaches
/// `tick at enqueue + delay`. Each pass sends what is due and then advances
/// the counter, so a delay of `d` goes out `d` passes after a delay of 0.
/// Messages due on the same tick go out in the order they were queued.
pub struct Sequencer<C: Clock = IntervalClock> {
    core: Arc<Mutex<Core>>,
    lifecycle: Mutex<Lifecycle<C>>,
    failures: Receiver<TransmissionFailure>,
}

/// Cloneable producer handle for queueing messages from other threads.
#[derive(Clone)]
pub struct MidiSender {
    core: Arc<Mutex<Core>>,
}

impl MidiSender {
    /// Queues `message` to go out `delay` ticks from now. A delay of 0 is
    /// sent on the next tick.
    pub fn enqueue(&self, message: MidiMessage, delay: u64) -> Result<()> {
        self.core.lock().enqueue(message, delay)
    }

    /// Validates raw bytes and queues them. Invalid bytes never reach the queue.
    pub fn enqueue_bytes(&self, bytes: impl Into<Vec<u8>>, delay: u64) -> Result<()> {
        let message = MidiMessage::new(bytes)?;
        self.enqueue(message, delay)
    }

    /// Queues every `(message, delay)` pair under one lock, so all delays
    /// count from the same tick and no pass runs in between.
    pub fn enqueue_all(&self, batch: impl IntoIterator<Item = (MidiMessage, u64)>) -> Result<()> {
        let batch: Vec<_> = batch.into_iter().collect();
        self.core.lock().enqueue_all(batch)
    }
}

impl Sequencer<IntervalClock> {
    pub fn new(tick_period: Duration) -> Self {
        Self::with_clock(IntervalClock::new(tick_period))
    }
}

impl Default for Sequencer<IntervalClock> {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_PERIOD)
    }
}

impl<C: Clock> Sequencer<C> {
    pub fn with_clock(clock: C) -> Self {
        let (failure_tx, failure_rx) = channel::bounded(FAILURE_BACKLOG);
        let core = Core {
            queue: EventQueue::new(),
            tick: 0,
            port: None,
            closed: false,
            failures: failure_tx,
        };
        Self {
            core: Arc::new(Mutex::new(core)),
            lifecycle: Mutex::new(Lifecycle::Stopped(clock)),
            failures: failure_rx,
        }
    }

    pub fn sender(&self) -> MidiSender {
        MidiSender {
            core: Arc::clone(&self.core),
        }
    }

    pub fn enqueue(&self, message: MidiMessage, delay: u64) -> Result<()> {
        self.core.lock().enqueue(message, delay)
    }

    pub fn enqueue_bytes(&self, bytes: impl Into<Vec<u8>>, delay: u64) -> Result<()> {
        self.sender().enqueue_bytes(bytes, delay)
    }

    pub fn enqueue_all(&self, batch: impl IntoIterator<Item = (MidiMessage, u64)>) -> Result<()> {
        self.sender().enqueue_all(batch)
    }

    /// Starts the worker with the tick counter reset to 0. Does nothing if
    /// already running.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
            Lifecycle::Closed => Err(SequencerError::SequencerClosed),
            running @ Lifecycle::Running { .. } => {
                *lifecycle = running;
                Ok(())
            }
            Lifecycle::Stopped(mut clock) => {
                {
                    let mut core = self.core.lock();
                    if core.port.is_none() {
                        *lifecycle = Lifecycle::Stopped(clock);
                        return Err(SequencerError::PortUnavailable(PortError::NotConnected));
                    }
                    core.tick = 0;
                }
                clock.reset();

                let (stop_tx, stop_rx) = channel::bounded(0);
                let core = Arc::clone(&self.core);
                let worker = thread::spawn(move || sequencer_thread(clock, core, stop_rx));

                *lifecycle = Lifecycle::Running {
                    worker,
                    stop: stop_tx,
                };
                tracing::debug!("sequencer started");
                Ok(())
            }
        }
    }

    /// Stops the worker after its current pass. Queued messages stay queued.
    ///
    /// Their target ticks are absolute, so after the next [`start`] resets
    /// the counter to 0 they are measured against the new count: a message
    /// due at tick 40 waits for tick 40 again after restart no matter how
    /// close it was before the stop.
    ///
    /// [`start`]: Sequencer::start
    pub fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
            Lifecycle::Closed => Err(SequencerError::SequencerClosed),
            stopped @ Lifecycle::Stopped(_) => {
                *lifecycle = stopped;
                Ok(())
            }
            Lifecycle::Running { worker, stop } => {
                drop(stop);
                match worker.join() {
                    Ok(clock) => {
                        *lifecycle = Lifecycle::Stopped(clock);
                        tracing::debug!(pending = self.pending(), "sequencer stopped");
                        Ok(())
                    }
                    Err(_) => {
                        tracing::error!("sequencer worker panicked, closing");
                        self.close_core();
                        Err(SequencerError::SequencerClosed)
                    }
                }
            }
        }
    }

    /// Replaces the output port and returns the previous one, which the
    /// caller is responsible for closing.
    pub fn set_output<P: OutputPort + 'static>(
        &self,
        port: P,
    ) -> Result<Option<Box<dyn OutputPort>>> {
        self.replace_output(Box::new(port))
    }

    /// Opens a port with `open` and installs it. A failing `open` leaves the
    /// current port in place.
    pub fn set_output_with<P, F>(&self, open: F) -> Result<Option<Box<dyn OutputPort>>>
    where
        P: OutputPort + 'static,
        F: FnOnce() -> std::result::Result<P, PortError>,
    {
        if self.core.lock().closed {
            return Err(SequencerError::SequencerClosed);
        }
        let port = open().map_err(SequencerError::PortUnavailable)?;
        self.set_output(port)
    }

    pub fn replace_output(&self, port: Box<dyn OutputPort>) -> Result<Option<Box<dyn OutputPort>>> {
        let mut core = self.core.lock();
        if core.closed {
            return Err(SequencerError::SequencerClosed);
        }
        tracing::info!(port = port.name(), "output port set");
        Ok(core.port.replace(port))
    }

    /// Stops the worker, discards queued messages and closes the port.
    /// Every later operation fails with [`SequencerError::SequencerClosed`].
    pub fn shutdown(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
            Lifecycle::Closed => return Err(SequencerError::SequencerClosed),
            Lifecycle::Running { worker, stop } => {
                drop(stop);
                if worker.join().is_err() {
                    tracing::error!("sequencer worker panicked");
                }
            }
            Lifecycle::Stopped(_) => {}
        }
        self.close_core();
        Ok(())
    }

    fn close_core(&self) {
        let (port, discarded) = {
            let mut core = self.core.lock();
            core.closed = true;
            (core.port.take(), core.queue.clear())
        };
        if let Some(port) = port {
            port.close();
        }
        tracing::info!(discarded, "sequencer shut down");
    }

    pub fn state(&self) -> SequencerState {
        match *self.lifecycle.lock() {
            Lifecycle::Stopped(_) => SequencerState::Stopped,
            Lifecycle::Running { .. } => SequencerState::Running,
            Lifecycle::Closed => SequencerState::Closed,
        }
    }

    /// Number of queued messages not yet sent.
    pub fn pending(&self) -> usize {
        self.core.lock().queue.len()
    }

    pub fn output_name(&self) -> Option<String> {
        self.core.lock().port.as_ref().map(|p| p.name().to_string())
    }

    /// Messages the worker failed to write.
    pub fn failures(&self) -> Receiver<TransmissionFailure> {
        self.failures.clone()
    }
}

impl<C: Clock> Drop for Sequencer<C> {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn sequencer_thread<C: Clock>(mut clock: C, core: Arc<Mutex<Core>>, stop: Receiver<()>) -> C {
    while clock.wait_tick(&stop) {
        core.lock().run_pass();
    }
    clock
}
