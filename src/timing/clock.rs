use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;

/// Default interval between two sequencer ticks.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(5);

/// Timer driving a sequencer's scheduling loop.
///
/// A clock is owned by one sequencer. It moves into the worker thread on
/// start and comes back when the worker is joined on stop.
pub trait Clock: Send + 'static {
    /// Called on every start, before the first `wait_tick`.
    fn reset(&mut self);

    /// Blocks until the next tick and returns `true`, or returns `false`
    /// as soon as `stop` receives a message or is disconnected.
    fn wait_tick(&mut self, stop: &Receiver<()>) -> bool;
}

/// Wall-clock timer firing every `period`.
pub struct IntervalClock {
    period: Duration,
    ticker: Receiver<Instant>,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ticker: channel::tick(period),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for IntervalClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_PERIOD)
    }
}

impl Clock for IntervalClock {
    fn reset(&mut self) {
        self.ticker = channel::tick(self.period);
    }

    fn wait_tick(&mut self, stop: &Receiver<()>) -> bool {
        select! {
            recv(self.ticker) -> _ => true,
            recv(stop) -> _ => false,
        }
    }
}

/// Clock that only ticks when its [`ClockDriver`] says so.
pub struct ManualClock {
    ticks: Receiver<()>,
    acks: Sender<()>,
    pending_ack: bool,
}

/// Test-side handle of a [`ManualClock`].
pub struct ClockDriver {
    ticks: Sender<()>,
    acks: Receiver<()>,
    timeout: Duration,
}

/// Creates a manual clock and the driver that advances it.
pub fn manual_clock() -> (ManualClock, ClockDriver) {
    let (tick_tx, tick_rx) = channel::bounded(0);
    let (ack_tx, ack_rx) = channel::unbounded();
    (
        ManualClock {
            ticks: tick_rx,
            acks: ack_tx,
            pending_ack: false,
        },
        ClockDriver {
            ticks: tick_tx,
            acks: ack_rx,
            timeout: Duration::from_secs(1),
        },
    )
}

impl Clock for ManualClock {
    fn reset(&mut self) {
        self.pending_ack = false;
    }

    fn wait_tick(&mut self, stop: &Receiver<()>) -> bool {
        // Reaching here again means the previous pass has finished.
        if std::mem::take(&mut self.pending_ack) {
            let _ = self.acks.send(());
        }
        select! {
            recv(self.ticks) -> tick => match tick {
                Ok(()) => {
                    self.pending_ack = true;
                    true
                }
                Err(_) => {
                    let _ = stop.recv();
                    false
                }
            },
            recv(stop) -> _ => false,
        }
    }
}

impl ClockDriver {
    /// How long `advance` waits for the sequencer before giving up.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fires up to `n` ticks, returning once each delivered tick's pass has
    /// completed. Returns how many ticks were delivered, which is less than
    /// `n` when the sequencer is not running.
    pub fn advance(&self, n: u64) -> u64 {
        let mut delivered = 0;
        for _ in 0..n {
            if self.ticks.send_timeout((), self.timeout).is_err() {
                break;
            }
            if self.acks.recv_timeout(self.timeout).is_err() {
                break;
            }
            delivered += 1;
        }
        delivered
    }

    pub fn tick(&self) -> bool {
        self.advance(1) == 1
    }
}
