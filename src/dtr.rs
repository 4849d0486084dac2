//! DTR/UART wake-line control.
//!
//! The modem asserts RI when it wants the host to bring the UART up; the
//! host answers by asserting DTR, and drops it again after a window with no
//! command traffic. This module keeps the desired line state and the
//! inactivity deadline; the background [`Runner`](crate::Runner) owns the
//! physical pin and applies changes (pins live with the runner's config,
//! not behind the public handles).

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant};

struct DtrState {
    automatic: bool,
    inactivity: Duration,
    line_enabled: bool,
    deadline: Option<Instant>,
}

pub(crate) struct DtrControl {
    state: Mutex<CriticalSectionRawMutex, RefCell<DtrState>>,
    kick: Signal<CriticalSectionRawMutex, ()>,
}

impl DtrControl {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(DtrState {
                automatic: false,
                inactivity: Duration::from_secs(10),
                line_enabled: false,
                deadline: None,
            })),
            kick: Signal::new(),
        }
    }

    /// Set automatic mode and the inactivity window. Disabling automatic
    /// mode cancels any armed timer.
    pub fn configure(&self, automatic: bool, inactivity: Duration) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.automatic = automatic;
            state.inactivity = inactivity;
            if !automatic {
                state.deadline = None;
            }
        });
        self.kick.signal(());
    }

    /// Force the wake line on; manual override disables automatic mode.
    pub fn enable(&self) {
        debug!("DTR UART enabled (manual)");
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.automatic = false;
            state.line_enabled = true;
            state.deadline = None;
        });
        self.kick.signal(());
    }

    /// Force the wake line off; manual override disables automatic mode.
    pub fn disable(&self) {
        debug!("DTR UART disabled (manual)");
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.automatic = false;
            state.line_enabled = false;
            state.deadline = None;
        });
        self.kick.signal(());
    }

    /// RI edge: in automatic mode, enable the line and (re)arm the timer.
    pub fn on_ri(&self) {
        let armed = self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if !state.automatic {
                return false;
            }
            state.line_enabled = true;
            state.deadline = Some(Instant::now() + state.inactivity);
            true
        });
        if armed {
            self.kick.signal(());
        }
    }

    /// Command traffic: re-arm the timer while the line is up automatically.
    pub fn on_activity(&self) {
        let armed = self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if !(state.automatic && state.line_enabled) {
                return false;
            }
            state.deadline = Some(Instant::now() + state.inactivity);
            true
        });
        if armed {
            self.kick.signal(());
        }
    }

    /// Desired line level plus the currently armed deadline.
    pub fn status(&self) -> (bool, Option<Instant>) {
        self.state
            .lock(|state| {
                let state = state.borrow();
                (state.line_enabled, state.deadline)
            })
    }

    /// Called by the runner when the timer armed for `deadline` fired.
    /// Returns true if it was still current and the line was dropped; a
    /// deadline re-armed in the meantime stays live.
    pub fn expire(&self, deadline: Instant) -> bool {
        let expired = self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.deadline != Some(deadline) {
                return false;
            }
            state.deadline = None;
            state.line_enabled = false;
            true
        });
        if expired {
            debug!("DTR UART disabled (inactivity)");
        }
        expired
    }

    pub async fn wait_kick(&self) {
        self.kick.wait().await;
    }
}
