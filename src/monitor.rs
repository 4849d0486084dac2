//! Notification monitors.
//!
//! A monitor is a `(filter, handler)` pair receiving unsolicited notification
//! lines whose text starts with the filter, or every notification for the
//! wildcard filter. Monitors are registered once during startup, in dispatch
//! order, and stay registered for the life of the process; only their paused
//! flag is mutable.
//!
//! Handlers run on the background [`Runner`](crate::Runner) task, never in
//! the receive context, so they are free to block and to issue commands of
//! their own.

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::error::Error;

pub type MonitorHandler = fn(&str);

pub struct Monitor {
    filter: Option<&'static str>,
    handler: MonitorHandler,
    paused: AtomicBool,
}

impl Monitor {
    /// New active monitor. A `None` filter matches every notification.
    pub const fn new(filter: Option<&'static str>, handler: MonitorHandler) -> Self {
        Self {
            filter,
            handler,
            paused: AtomicBool::new(false),
        }
    }

    /// New monitor starting out paused.
    pub const fn new_paused(filter: Option<&'static str>, handler: MonitorHandler) -> Self {
        Self {
            filter,
            handler,
            paused: AtomicBool::new(true),
        }
    }

    /// Stop forwarding notifications to this monitor. Idempotent.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    /// Resume forwarding notifications to this monitor. Idempotent.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    fn matches(&self, notif: &str) -> bool {
        match self.filter {
            None => true,
            Some(filter) => notif.starts_with(filter),
        }
    }
}

pub struct MonitorRegistry<const MAX_MONITORS: usize> {
    entries: Mutex<CriticalSectionRawMutex, RefCell<Vec<&'static Monitor, MAX_MONITORS>>>,
    catch_all: Mutex<CriticalSectionRawMutex, Cell<Option<MonitorHandler>>>,
}

impl<const MAX_MONITORS: usize> MonitorRegistry<MAX_MONITORS> {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(RefCell::new(Vec::new())),
            catch_all: Mutex::new(Cell::new(None)),
        }
    }

    /// Install the init-time catch-all receiver; it sees every dispatched
    /// line, ahead of the filtered monitors.
    pub(crate) fn set_catch_all(&self, handler: MonitorHandler) {
        self.catch_all.lock(|slot| slot.set(Some(handler)));
    }

    /// Append a monitor. Registration order is dispatch order.
    pub fn register(&self, monitor: &'static Monitor) -> Result<(), Error> {
        self.entries.lock(|entries| {
            entries
                .borrow_mut()
                .push(monitor)
                .map_err(|_| Error::Overflow)
        })
    }

    /// Invoke the catch-all receiver, then every matching unpaused monitor
    /// in registration order.
    ///
    /// The entry list is copied out before any handler runs, so a handler may
    /// pause, resume or register monitors without deadlocking the registry.
    pub(crate) fn dispatch(&self, notif: &str) {
        if let Some(handler) = self.catch_all.lock(|slot| slot.get()) {
            handler(notif);
        }
        let entries = self.entries.lock(|entries| entries.borrow().clone());
        for monitor in entries {
            if monitor.matches(notif) && !monitor.is_paused() {
                (monitor.handler)(notif);
            }
        }
    }
}

impl<const MAX_MONITORS: usize> Default for MonitorRegistry<MAX_MONITORS> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::string::{String, ToString};
    use std::sync::Mutex as StdMutex;
    use std::vec::Vec as StdVec;

    static CREG_SEEN: StdMutex<StdVec<String>> = StdMutex::new(StdVec::new());
    static ANY_SEEN: StdMutex<StdVec<String>> = StdMutex::new(StdVec::new());

    fn creg_handler(notif: &str) {
        CREG_SEEN.lock().unwrap().push(notif.to_string());
    }

    fn any_handler(notif: &str) {
        ANY_SEEN.lock().unwrap().push(notif.to_string());
    }

    #[test]
    fn prefix_filter_is_exact() {
        static MON: Monitor = Monitor::new(Some("+CREG"), creg_handler);

        assert!(MON.matches("+CREG: 1,5"));
        assert!(!MON.matches("+CEREG: 1,5"));
        assert!(!MON.matches("CREG"));
    }

    #[test]
    fn wildcard_matches_everything() {
        static MON: Monitor = Monitor::new(None, any_handler);

        assert!(MON.matches("+CEREG: 5"));
        assert!(MON.matches("RING"));
    }

    #[test]
    fn dispatch_hits_all_matching_entries_in_order() {
        static SEEN: StdMutex<StdVec<&'static str>> = StdMutex::new(StdVec::new());

        fn first(_: &str) {
            SEEN.lock().unwrap().push("first");
        }
        fn second(_: &str) {
            SEEN.lock().unwrap().push("second");
        }
        fn other(_: &str) {
            SEEN.lock().unwrap().push("other");
        }

        static FIRST: Monitor = Monitor::new(Some("+CREG"), first);
        static SECOND: Monitor = Monitor::new(None, second);
        static OTHER: Monitor = Monitor::new(Some("+CGEV"), other);

        let registry = MonitorRegistry::<4>::new();
        registry.register(&FIRST).unwrap();
        registry.register(&SECOND).unwrap();
        registry.register(&OTHER).unwrap();

        registry.dispatch("+CREG: 1,5");
        assert_eq!(*SEEN.lock().unwrap(), ["first", "second"]);
    }

    #[test]
    fn paused_monitor_is_skipped_until_resumed() {
        static SEEN: StdMutex<StdVec<String>> = StdMutex::new(StdVec::new());

        fn handler(notif: &str) {
            SEEN.lock().unwrap().push(notif.to_string());
        }

        static MON: Monitor = Monitor::new(Some("+CESQ"), handler);

        let registry = MonitorRegistry::<2>::new();
        registry.register(&MON).unwrap();

        MON.pause();
        MON.pause();
        registry.dispatch("+CESQ: 99");
        assert!(SEEN.lock().unwrap().is_empty());

        MON.resume();
        registry.dispatch("+CESQ: 42");
        assert_eq!(*SEEN.lock().unwrap(), ["+CESQ: 42"]);
    }

    #[test]
    fn catch_all_sees_every_line_ahead_of_filtered_monitors() {
        static SEEN: StdMutex<StdVec<&'static str>> = StdMutex::new(StdVec::new());

        fn catch_all(_: &str) {
            SEEN.lock().unwrap().push("catch_all");
        }
        fn filtered(_: &str) {
            SEEN.lock().unwrap().push("filtered");
        }

        static MON: Monitor = Monitor::new(Some("+CREG"), filtered);

        let registry = MonitorRegistry::<2>::new();
        registry.set_catch_all(catch_all);
        registry.register(&MON).unwrap();

        registry.dispatch("+CREG: 1,5");
        registry.dispatch("RING");

        // The catch-all is not subject to the prefix filters.
        assert_eq!(
            *SEEN.lock().unwrap(),
            ["catch_all", "filtered", "catch_all"]
        );
    }

    #[test]
    fn initially_paused_monitor() {
        static MON: Monitor = Monitor::new_paused(None, any_handler);
        assert!(MON.is_paused());
    }

    #[test]
    fn registry_overflow() {
        static MON: Monitor = Monitor::new(None, any_handler);

        let registry = MonitorRegistry::<1>::new();
        assert_eq!(registry.register(&MON), Ok(()));
        assert_eq!(registry.register(&MON), Err(Error::Overflow));
    }
}
