//! AT command transport and power management for serial cellular modems.
//!
//! One physical UART carries a textual command/response protocol interleaved
//! with unsolicited notifications. This crate provides the shared-channel
//! core on top of a byte-level transport:
//!
//! - [`Ingress`]: feed received bytes from the UART side; lines are
//!   reassembled, terminal result lines resolve the outstanding command and
//!   everything else is queued for monitor dispatch.
//! - [`Client`]: send commands (one outstanding at a time, later senders get
//!   `Busy`), send raw data-mode bytes, control the DTR/UART wake line and
//!   register Ring Indicate and notification handlers.
//! - [`PowerControl`]: power-managed command path that wakes an idle modem
//!   before forwarding and requests modem sleep after inactivity.
//! - [`Runner`]: background task driving monitor dispatch and the two
//!   inactivity timers. Must be polled for any of the automatic behavior.
//!
//! Storage is borrowed from a [`Resources`] instance, typically a static;
//! all handles are created at once by [`new`].

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod client;
pub mod config;
mod dtr;
pub mod error;
pub mod ingress;
mod module_timing;
pub mod monitor;
pub mod power;
mod resources;
mod runner;
pub mod response;

#[cfg(test)]
mod test_helpers;

pub use client::Client;
pub use error::{Error, ProtocolError};
pub use ingress::Ingress;
pub use monitor::{Monitor, MonitorHandler};
pub use power::{PowerControl, PowerState, SLEEP_CMD};
pub use resources::Resources;
pub use response::AtResponse;
pub use runner::Runner;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_io_async::Write;

use config::ModemConfig;

/// Wire up one modem transport instance over `writer`.
///
/// When the config enables `AUTOMATIC_UART`, the DTR wake line is managed
/// from RI events and inactivity right away; otherwise it stays manual until
/// [`Client::configure_dtr_uart`] is called. A catch-all notification
/// handler provided by the config is installed before any line can arrive.
///
/// The caller is responsible for pumping received bytes into the returned
/// [`Ingress`] and for polling [`Runner::run`] on its executor.
pub fn new<
    'a,
    W: Write,
    C: ModemConfig,
    const INGRESS_BUF_SIZE: usize,
    const NOTIF_CAPACITY: usize,
    const MAX_MONITORS: usize,
>(
    resources: &'a mut Resources<W, INGRESS_BUF_SIZE, NOTIF_CAPACITY, MAX_MONITORS>,
    writer: W,
    config: C,
) -> (
    Ingress<'a, INGRESS_BUF_SIZE, NOTIF_CAPACITY>,
    Client<'a, W, MAX_MONITORS>,
    PowerControl<'a, W, MAX_MONITORS>,
    Runner<'a, W, C, INGRESS_BUF_SIZE, NOTIF_CAPACITY, MAX_MONITORS>,
) {
    if C::AUTOMATIC_UART {
        resources.dtr.configure(true, config.uart_inactivity());
    }
    if let Some(handler) = config.notification_handler() {
        resources.monitors.set_catch_all(handler);
    }

    let writer: &'a Mutex<NoopRawMutex, W> = resources.writer.write(Mutex::new(writer));

    let ingress = Ingress::new(&resources.slot, resources.notifs.sender());
    let client = Client::new(
        writer,
        &resources.slot,
        &resources.monitors,
        &resources.dtr,
        &resources.ri,
    );
    let power = PowerControl::new(client, &resources.pwr);
    let runner = Runner::new(
        client,
        config,
        &resources.dtr,
        &resources.pwr,
        &resources.monitors,
        resources.notifs.receiver(),
    );

    (ingress, client, power, runner)
}
