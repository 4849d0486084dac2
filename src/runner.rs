//! Background task for the transport.
//!
//! Owns the DTR pin (through the board config) and everything timer-driven:
//! monitor dispatch, the DTR inactivity timer and the power-management
//! inactivity timer. `run()` must be polled for monitors, automatic DTR
//! handling and auto-sleep to operate.

use embassy_futures::join::join3;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;
use embassy_time::Timer;
use embedded_hal::digital::OutputPin;
use embedded_io_async::Write;
use heapless::String;

use crate::client::Client;
use crate::config::ModemConfig;
use crate::dtr::DtrControl;
use crate::error::Error;
use crate::module_timing::{internal_cmd_timeout, sleep_retry_time};
use crate::monitor::MonitorRegistry;
use crate::power::{PwrControl, SLEEP_CMD};

pub struct Runner<
    'a,
    W: Write,
    C: ModemConfig,
    const INGRESS_BUF_SIZE: usize,
    const NOTIF_CAPACITY: usize,
    const MAX_MONITORS: usize,
> {
    at: Client<'a, W, MAX_MONITORS>,
    config: C,
    dtr: &'a DtrControl,
    pwr: &'a PwrControl,
    monitors: &'a MonitorRegistry<MAX_MONITORS>,
    notifs: Receiver<'a, CriticalSectionRawMutex, String<INGRESS_BUF_SIZE>, NOTIF_CAPACITY>,
}

impl<
        'a,
        W: Write,
        C: ModemConfig,
        const INGRESS_BUF_SIZE: usize,
        const NOTIF_CAPACITY: usize,
        const MAX_MONITORS: usize,
    > Runner<'a, W, C, INGRESS_BUF_SIZE, NOTIF_CAPACITY, MAX_MONITORS>
{
    pub(crate) fn new(
        at: Client<'a, W, MAX_MONITORS>,
        config: C,
        dtr: &'a DtrControl,
        pwr: &'a PwrControl,
        monitors: &'a MonitorRegistry<MAX_MONITORS>,
        notifs: Receiver<'a, CriticalSectionRawMutex, String<INGRESS_BUF_SIZE>, NOTIF_CAPACITY>,
    ) -> Self {
        Self {
            at,
            config,
            dtr,
            pwr,
            monitors,
            notifs,
        }
    }

    pub async fn run(mut self) -> ! {
        join3(
            monitor_dispatch(self.monitors, self.notifs),
            dtr_line(self.dtr, &mut self.config),
            auto_sleep(self.pwr, &self.at),
        )
        .await;
        unreachable!()
    }
}

/// Deliver queued notification lines to the registered monitors, off the
/// receive context so handlers may issue commands of their own.
async fn monitor_dispatch<const INGRESS_BUF_SIZE: usize, const NOTIF_CAPACITY: usize, const MAX_MONITORS: usize>(
    monitors: &MonitorRegistry<MAX_MONITORS>,
    notifs: Receiver<'_, CriticalSectionRawMutex, String<INGRESS_BUF_SIZE>, NOTIF_CAPACITY>,
) -> ! {
    loop {
        let line = notifs.receive().await;
        trace!("notification {:?}", line.as_str());
        monitors.dispatch(&line);
    }
}

/// Keep the physical DTR pin in step with the desired wake-line state and
/// drop the line when the inactivity timer fires.
async fn dtr_line<C: ModemConfig>(dtr: &DtrControl, config: &mut C) -> ! {
    let mut applied = None;
    loop {
        let (enabled, deadline) = dtr.status();
        if applied != Some(enabled) {
            if let Some(pin) = config.dtr_pin() {
                if enabled {
                    pin.set_high().ok();
                } else {
                    pin.set_low().ok();
                }
            }
            applied = Some(enabled);
        }

        match deadline {
            Some(at) => {
                if let Either::First(_) = select(Timer::at(at), dtr.wait_kick()).await {
                    dtr.expire(at);
                }
            }
            None => dtr.wait_kick().await,
        }
    }
}

/// Issue the logical sleep command when the power-management inactivity
/// window elapses. Best effort: there is no caller to report to.
async fn auto_sleep<W: Write, const MAX_MONITORS: usize>(
    pwr: &PwrControl,
    at: &Client<'_, W, MAX_MONITORS>,
) -> ! {
    loop {
        match pwr.deadline() {
            Some(deadline) => {
                if let Either::Second(_) = select(Timer::at(deadline), pwr.wait_kick()).await {
                    continue;
                }
                if !pwr.take_expiry(deadline) {
                    continue;
                }
                match at.send_cmd(SLEEP_CMD, internal_cmd_timeout()).await {
                    Ok(response) => {
                        debug!("auto sleep result code {}", response.code());
                        pwr.set_idle();
                    }
                    Err(Error::Busy) => {
                        // A caller holds the channel; yield and retry.
                        trace!("channel busy, deferring auto sleep");
                        pwr.retry_after(sleep_retry_time());
                    }
                    Err(_) => {
                        warn!("auto sleep request failed");
                        pwr.set_idle();
                    }
                }
            }
            None => pwr.wait_kick().await,
        }
    }
}
