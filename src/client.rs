//! Command channel over the shared serial transport.
//!
//! The channel is a single-slot resource: one command may be outstanding at a
//! time, and a second sender is rejected with [`Error::Busy`] rather than
//! queued. Each outstanding command is tagged with a generation counter; a
//! terminal line is attributed to the slot only while that command is still
//! live. When a command times out, one terminal line is still owed to it on
//! the wire; the slot remembers that debt and swallows the late line when it
//! arrives, so it can neither satisfy a later command nor leak out as a
//! notification.

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};
use embedded_io_async::Write;

use crate::dtr::DtrControl;
use crate::error::Error;
use crate::monitor::{Monitor, MonitorRegistry};
use crate::response::AtResponse;

/// AT command line terminator, appended by the channel.
const TERMINATOR: &[u8] = b"\r\n";

struct SlotState {
    generation: u32,
    pending: bool,
    response: Option<AtResponse>,
    // Terminal lines still owed to commands that timed out.
    stale: u8,
}

/// Single-slot pending-command record shared between the issuing caller and
/// the receive context.
pub(crate) struct ResponseSlot {
    state: BlockingMutex<CriticalSectionRawMutex, RefCell<SlotState>>,
    done: Signal<CriticalSectionRawMutex, ()>,
}

impl ResponseSlot {
    pub const fn new() -> Self {
        Self {
            state: BlockingMutex::new(RefCell::new(SlotState {
                generation: 0,
                pending: false,
                response: None,
                stale: 0,
            })),
            done: Signal::new(),
        }
    }

    /// Claim the slot for a fresh command and return its generation.
    ///
    /// The completion signal is cleared under the same lock, so a stale
    /// signal left over from an earlier command cannot satisfy this one.
    fn acquire(&self) -> Result<u32, Error> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.pending {
                return Err(Error::Busy);
            }
            self.done.reset();
            state.generation = state.generation.wrapping_add(1);
            state.pending = true;
            state.response = None;
            Ok(state.generation)
        })
    }

    /// Free the slot without a response (transmit failed).
    fn release(&self, generation: u32) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.generation == generation && state.pending {
                state.pending = false;
                state.response = None;
            }
        });
    }

    /// Resolve the outstanding command from the receive context.
    ///
    /// A terminal line owed to an already-timed-out command is consumed and
    /// discarded before any pending command is considered. Returns `false`
    /// when the line was not consumed at all, in which case it remains a
    /// notification candidate. Never blocks.
    pub(crate) fn resolve(&self, response: AtResponse) -> bool {
        let (consumed, resolved) = self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.stale > 0 {
                state.stale -= 1;
                debug!("discarding stale terminal line, code {}", response.code());
                return (true, false);
            }
            if !state.pending {
                return (false, false);
            }
            state.response = Some(response);
            (true, true)
        });
        if resolved {
            self.done.signal(());
        }
        consumed
    }

    /// Wait until the command of `generation` resolves or `timeout` elapses.
    /// A zero timeout waits forever.
    ///
    /// On timeout the slot is freed atomically with invalidating the
    /// generation and recording the owed terminal line: there is no window
    /// in which the old command and a new one are both considered live.
    async fn wait(&self, generation: u32, timeout: Duration) -> Result<AtResponse, Error> {
        if timeout.as_ticks() == 0 {
            self.done.wait().await;
        } else {
            let _ = with_timeout(timeout, self.done.wait()).await;
        }

        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.generation != generation {
                // Cannot happen while we hold the slot; fail safe.
                return Err(Error::Timeout);
            }
            state.pending = false;
            match state.response.take() {
                // Accept a response that raced the timeout expiry.
                Some(response) => Ok(response),
                None => {
                    state.stale = state.stale.saturating_add(1);
                    Err(Error::Timeout)
                }
            }
        })
    }
}

/// Single global Ring Indicate callback slot.
pub(crate) struct RiHandlerSlot {
    handler: BlockingMutex<CriticalSectionRawMutex, Cell<Option<fn()>>>,
}

impl RiHandlerSlot {
    pub const fn new() -> Self {
        Self {
            handler: BlockingMutex::new(Cell::new(None)),
        }
    }

    fn set(&self, handler: fn()) {
        self.handler.lock(|slot| slot.set(Some(handler)));
    }

    fn invoke(&self) {
        if let Some(handler) = self.handler.lock(|slot| slot.get()) {
            handler();
        }
    }
}

/// Handle for issuing commands and raw data over the modem transport.
///
/// Cheap to copy; every copy refers to the same single-slot channel.
pub struct Client<'a, W: Write, const MAX_MONITORS: usize> {
    writer: &'a Mutex<NoopRawMutex, W>,
    slot: &'a ResponseSlot,
    monitors: &'a MonitorRegistry<MAX_MONITORS>,
    dtr: &'a DtrControl,
    ri: &'a RiHandlerSlot,
}

impl<'a, W: Write, const MAX_MONITORS: usize> Client<'a, W, MAX_MONITORS> {
    pub(crate) fn new(
        writer: &'a Mutex<NoopRawMutex, W>,
        slot: &'a ResponseSlot,
        monitors: &'a MonitorRegistry<MAX_MONITORS>,
        dtr: &'a DtrControl,
        ri: &'a RiHandlerSlot,
    ) -> Self {
        Self {
            writer,
            slot,
            monitors,
            dtr,
            ri,
        }
    }

    /// Send an AT command, without its terminator, and wait for the terminal
    /// result line.
    ///
    /// A zero `timeout` waits forever. Fails with [`Error::Busy`] while
    /// another command is outstanding, without disturbing that command.
    pub async fn send_cmd(&self, cmd: &str, timeout: Duration) -> Result<AtResponse, Error> {
        if cmd.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let generation = self.slot.acquire()?;
        debug!("--> {:?}", cmd);

        if let Err(e) = self.transmit(cmd.as_bytes(), true).await {
            self.slot.release(generation);
            return Err(e);
        }

        // Any command transmission counts as activity for the wake line.
        self.dtr.on_activity();

        let result = self.slot.wait(generation, timeout).await;
        match &result {
            Ok(response) => debug!("<-- result code {}", response.code()),
            Err(_) => warn!("no terminal response for {:?} in time", cmd),
        }
        result
    }

    /// Send raw bytes outside command framing (transport in data mode).
    pub async fn send_data(&self, data: &[u8]) -> Result<(), Error> {
        self.transmit(data, false).await
    }

    /// Register the callback invoked on a Ring Indicate toggle. Replaces any
    /// previously registered handler.
    pub fn register_ri_handler(&self, handler: fn()) {
        self.ri.set(handler);
    }

    /// Feed a Ring Indicate edge from the host's GPIO layer.
    ///
    /// Invokes the registered RI handler and, when automatic DTR/UART
    /// handling is active, enables the wake line and arms its inactivity
    /// timer.
    pub fn notify_ri(&self) {
        trace!("RI");
        self.ri.invoke();
        self.dtr.on_ri();
    }

    /// Register a notification monitor; see [`Monitor`].
    pub fn register_monitor(&self, monitor: &'static Monitor) -> Result<(), Error> {
        self.monitors.register(monitor)
    }

    /// Configure automatic DTR/UART handling; see
    /// [`DtrControl::configure`](crate::dtr::DtrControl).
    pub fn configure_dtr_uart(&self, automatic: bool, inactivity: Duration) {
        self.dtr.configure(automatic, inactivity);
    }

    /// Force the wake line on. Disables automatic handling.
    pub fn enable_dtr_uart(&self) {
        self.dtr.enable();
    }

    /// Force the wake line off. Disables automatic handling.
    pub fn disable_dtr_uart(&self) {
        self.dtr.disable();
    }

    async fn transmit(&self, data: &[u8], terminate: bool) -> Result<(), Error> {
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await.map_err(|_| Error::Transport)?;
        if terminate {
            writer
                .write_all(TERMINATOR)
                .await
                .map_err(|_| Error::Transport)?;
        }
        writer.flush().await.map_err(|_| Error::Transport)
    }
}

impl<'a, W: Write, const MAX_MONITORS: usize> Clone for Client<'a, W, MAX_MONITORS> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, W: Write, const MAX_MONITORS: usize> Copy for Client<'a, W, MAX_MONITORS> {}
