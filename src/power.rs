//! Logical power management layered on the command channel.
//!
//! Tracks whether the modem is in its command-mode sleep (`AT#XSLEEP=2`),
//! wakes it before forwarding a caller's command, and autonomously requests
//! sleep again after a window of inactivity. The inactivity timer runs on
//! the background [`Runner`](crate::Runner); the timer-driven sleep command
//! goes through the same single-slot channel as everything else and yields
//! to a caller-issued command instead of contending for the slot.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use embedded_io_async::Write;

use crate::client::Client;
use crate::error::Error;
use crate::module_timing::{internal_cmd_timeout, wake_settle_time};
use crate::response::AtResponse;

/// Command putting the modem into its command-mode idle sleep.
pub const SLEEP_CMD: &str = "AT#XSLEEP=2";

/// Bytes sent to wake the modem out of idle; any UART traffic lifts the
/// sleep, an empty line elicits no result code.
const WAKE_BYTES: &[u8] = b"\r\n";

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PowerState {
    Unknown = 0,
    Awake = 1,
    Idle = 2,
}

impl PowerState {
    /// Integer state code: 0 = UNKNOWN, 1 = AWAKE, 2 = IDLE.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

struct PwrState {
    initialized: bool,
    inactivity: Option<Duration>,
    state: PowerState,
    deadline: Option<Instant>,
}

pub(crate) struct PwrControl {
    state: Mutex<CriticalSectionRawMutex, RefCell<PwrState>>,
    kick: Signal<CriticalSectionRawMutex, ()>,
}

impl PwrControl {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(PwrState {
                initialized: false,
                inactivity: None,
                state: PowerState::Unknown,
                deadline: None,
            })),
            kick: Signal::new(),
        }
    }

    fn init(&self, inactivity: Option<Duration>) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.initialized = true;
            state.inactivity = inactivity;
            state.state = PowerState::Unknown;
            state.deadline = None;
        });
        self.kick.signal(());
    }

    fn power_state(&self) -> Result<PowerState, Error> {
        self.state.lock(|state| {
            let state = state.borrow();
            if !state.initialized {
                return Err(Error::Uninitialized);
            }
            Ok(state.state)
        })
    }

    fn set_power_state(&self, new: PowerState) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.state != new {
                debug!("power state {:?} -> {:?}", state.state, new);
                state.state = new;
            }
        });
    }

    /// Re-arm the full inactivity window after command activity.
    fn rearm(&self) {
        let armed = self.state.lock(|state| {
            let mut state = state.borrow_mut();
            match state.inactivity {
                Some(window) if state.initialized => {
                    state.deadline = Some(Instant::now() + window);
                    true
                }
                _ => false,
            }
        });
        if armed {
            self.kick.signal(());
        }
    }

    fn cancel(&self) {
        self.state.lock(|state| state.borrow_mut().deadline = None);
        self.kick.signal(());
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.state.lock(|state| state.borrow().deadline)
    }

    /// Runner-side: claim an expired deadline. Returns false if it was
    /// re-armed or cancelled in the meantime, or the modem is already idle.
    pub(crate) fn take_expiry(&self, deadline: Instant) -> bool {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.deadline != Some(deadline) {
                return false;
            }
            state.deadline = None;
            state.state != PowerState::Idle
        })
    }

    /// Runner-side: the sleep attempt found the channel busy; try again
    /// shortly, unless a caller re-armed the full window already.
    pub(crate) fn retry_after(&self, delay: Duration) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.deadline.is_none() {
                state.deadline = Some(Instant::now() + delay);
            }
        });
        self.kick.signal(());
    }

    pub(crate) fn set_idle(&self) {
        self.set_power_state(PowerState::Idle);
    }

    pub(crate) async fn wait_kick(&self) {
        self.kick.wait().await;
    }
}

/// Power-managed command interface.
pub struct PowerControl<'a, W: Write, const MAX_MONITORS: usize> {
    at: Client<'a, W, MAX_MONITORS>,
    pwr: &'a PwrControl,
}

impl<'a, W: Write, const MAX_MONITORS: usize> PowerControl<'a, W, MAX_MONITORS> {
    pub(crate) fn new(at: Client<'a, W, MAX_MONITORS>, pwr: &'a PwrControl) -> Self {
        Self { at, pwr }
    }

    /// Enable power management. State starts out UNKNOWN and no timer is
    /// armed until the first command. `None` disables auto-sleep.
    pub fn init(&self, inactivity: Option<Duration>) {
        self.pwr.init(inactivity);
    }

    /// Current logical power state.
    pub fn get_state(&self) -> Result<PowerState, Error> {
        self.pwr.power_state()
    }

    /// Send a command through the power-managed path: wake the modem first
    /// when idle, forward through the command channel, and re-arm the
    /// inactivity timer whether the command succeeded or not.
    pub async fn send_at(&self, cmd: &str, timeout: Duration) -> Result<AtResponse, Error> {
        if self.pwr.power_state()? == PowerState::Idle {
            self.wake().await?;
        }
        self.pwr.set_power_state(PowerState::Awake);

        let result = self.at.send_cmd(cmd, timeout).await;
        self.pwr.rearm();
        result
    }

    /// Cancel the inactivity timer and request modem sleep immediately,
    /// whatever the current state.
    ///
    /// When another command holds the channel, `Busy` is propagated and the
    /// tracked state is left alone: no sleep command reached the modem.
    pub async fn sleep(&self) -> Result<AtResponse, Error> {
        self.pwr.power_state()?;
        self.pwr.cancel();

        let result = self.at.send_cmd(SLEEP_CMD, internal_cmd_timeout()).await;
        if !matches!(result, Err(Error::Busy)) {
            self.pwr.set_power_state(PowerState::Idle);
        }
        result
    }

    async fn wake(&self) -> Result<(), Error> {
        debug!("waking modem");
        self.at
            .send_data(WAKE_BYTES)
            .await
            .map_err(|_| Error::WakeHandshake)?;
        Timer::after(wake_settle_time()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use embassy_futures::block_on;
    use embassy_futures::join::join;

    use crate::test_helpers::{FailWriter, SharedBuf, TestConfig, TestResources};

    #[test]
    fn uninitialized_power_management_rejects_commands() {
        let buf = SharedBuf::new();
        let mut resources = TestResources::new();
        let (_ingress, _client, power, _runner) =
            crate::new(&mut resources, buf.writer(), TestConfig);

        assert_eq!(power.get_state(), Err(Error::Uninitialized));
        assert_eq!(
            block_on(power.send_at("AT", Duration::from_secs(1))),
            Err(Error::Uninitialized)
        );
    }

    #[test]
    fn state_is_unknown_after_init_and_awake_after_first_send() {
        let buf = SharedBuf::new();
        let mut resources = TestResources::new();
        let (mut ingress, _client, power, _runner) =
            crate::new(&mut resources, buf.writer(), TestConfig);

        power.init(Some(Duration::from_secs(60)));
        assert_eq!(power.get_state(), Ok(PowerState::Unknown));

        let (result, _) = block_on(join(
            power.send_at("AT+CFUN=1", Duration::from_secs(10)),
            async {
                embassy_time::Timer::after_millis(10).await;
                ingress.write(b"OK\r\n");
            },
        ));

        assert_eq!(result, Ok(AtResponse::Ok));
        assert_eq!(power.get_state(), Ok(PowerState::Awake));
    }

    #[test]
    fn sleep_is_immediate_and_idempotent_in_state() {
        let buf = SharedBuf::new();
        let mut resources = TestResources::new();
        let (mut ingress, _client, power, _runner) =
            crate::new(&mut resources, buf.writer(), TestConfig);

        power.init(None);

        for _ in 0..2 {
            let (result, _) = block_on(join(power.sleep(), async {
                embassy_time::Timer::after_millis(10).await;
                ingress.write(b"OK\r\n");
            }));
            assert_eq!(result, Ok(AtResponse::Ok));
            assert_eq!(power.get_state(), Ok(PowerState::Idle));
        }

        assert_eq!(buf.count_occurrences(SLEEP_CMD.as_bytes()), 2);
    }

    #[test]
    fn busy_channel_does_not_fake_an_idle_state() {
        let buf = SharedBuf::new();
        let mut resources = TestResources::new();
        let (mut ingress, client, power, _runner) =
            crate::new(&mut resources, buf.writer(), TestConfig);

        power.init(None);

        // Reach AWAKE first.
        let (result, _) = block_on(join(power.send_at("AT", Duration::from_secs(1)), async {
            embassy_time::Timer::after_millis(10).await;
            ingress.write(b"OK\r\n");
        }));
        result.unwrap();

        // A sleep request while another command holds the channel is
        // rejected and must not pretend the modem went idle.
        let (outstanding, _) = block_on(join(
            client.send_cmd("AT+COPS=?", Duration::from_secs(1)),
            async {
                embassy_time::Timer::after_millis(10).await;
                assert_eq!(power.sleep().await, Err(Error::Busy));
                assert_eq!(power.get_state(), Ok(PowerState::Awake));
                ingress.write(b"OK\r\n");
            },
        ));
        outstanding.unwrap();
        assert_eq!(buf.count_occurrences(SLEEP_CMD.as_bytes()), 0);
    }

    #[test]
    fn idle_modem_is_woken_before_the_command_goes_out() {
        let buf = SharedBuf::new();
        let mut resources = TestResources::new();
        let (mut ingress, _client, power, _runner) =
            crate::new(&mut resources, buf.writer(), TestConfig);

        power.init(Some(Duration::from_secs(60)));

        // Reach IDLE first.
        let (result, _) = block_on(join(power.sleep(), async {
            embassy_time::Timer::after_millis(10).await;
            ingress.write(b"OK\r\n");
        }));
        assert_eq!(result, Ok(AtResponse::Ok));
        buf.clear();

        // The command fails, but wake bytes precede it and the state is
        // AWAKE regardless of the command's own outcome.
        let (result, _) = block_on(join(
            power.send_at("AT+COPS?", Duration::from_secs(10)),
            async {
                embassy_time::Timer::after_millis(150).await;
                ingress.write(b"ERROR\r\n");
            },
        ));

        assert_eq!(result, Ok(AtResponse::Error));
        assert_eq!(power.get_state(), Ok(PowerState::Awake));

        let written = buf.contents();
        let wake_at = written
            .windows(WAKE_BYTES.len())
            .position(|w| w == WAKE_BYTES)
            .unwrap();
        let cmd_at = written
            .windows(b"AT+COPS?".len())
            .position(|w| w == b"AT+COPS?")
            .unwrap();
        assert!(wake_at < cmd_at);
    }

    #[test]
    fn wake_failure_is_a_distinct_error() {
        let mut resources = TestResources::new();
        let (_ingress, _client, power, _runner) =
            crate::new(&mut resources, FailWriter, TestConfig);

        power.init(None);

        // Force IDLE; the sleep command itself fails on the transport, the
        // state transition still happens.
        let sleep_result = block_on(power.sleep());
        assert_eq!(sleep_result, Err(Error::Transport));
        assert_eq!(power.get_state(), Ok(PowerState::Idle));

        assert_eq!(
            block_on(power.send_at("AT", Duration::from_secs(1))),
            Err(Error::WakeHandshake)
        );
    }

    #[test]
    fn state_codes_match_the_public_surface() {
        assert_eq!(PowerState::Unknown.code(), 0);
        assert_eq!(PowerState::Awake.code(), 1);
        assert_eq!(PowerState::Idle.code(), 2);
    }
}
