use core::mem::MaybeUninit;

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embedded_io_async::Write;
use heapless::String;

use crate::client::{ResponseSlot, RiHandlerSlot};
use crate::dtr::DtrControl;
use crate::monitor::MonitorRegistry;
use crate::power::PwrControl;

/// Statically allocatable storage for one modem transport instance.
///
/// All handles returned by [`new`](crate::new) borrow from this struct, so
/// it must outlive them; dropping everything together is the teardown path.
pub struct Resources<
    W: Write,
    const INGRESS_BUF_SIZE: usize,
    const NOTIF_CAPACITY: usize,
    const MAX_MONITORS: usize,
> {
    pub(crate) slot: ResponseSlot,
    pub(crate) notifs: Channel<CriticalSectionRawMutex, String<INGRESS_BUF_SIZE>, NOTIF_CAPACITY>,
    pub(crate) monitors: MonitorRegistry<MAX_MONITORS>,
    pub(crate) dtr: DtrControl,
    pub(crate) pwr: PwrControl,
    pub(crate) ri: RiHandlerSlot,
    pub(crate) writer: MaybeUninit<Mutex<NoopRawMutex, W>>,
}

impl<
        W: Write,
        const INGRESS_BUF_SIZE: usize,
        const NOTIF_CAPACITY: usize,
        const MAX_MONITORS: usize,
    > Resources<W, INGRESS_BUF_SIZE, NOTIF_CAPACITY, MAX_MONITORS>
{
    pub const fn new() -> Self {
        Self {
            slot: ResponseSlot::new(),
            notifs: Channel::new(),
            monitors: MonitorRegistry::new(),
            dtr: DtrControl::new(),
            pwr: PwrControl::new(),
            ri: RiHandlerSlot::new(),
            writer: MaybeUninit::uninit(),
        }
    }
}

impl<
        W: Write,
        const INGRESS_BUF_SIZE: usize,
        const NOTIF_CAPACITY: usize,
        const MAX_MONITORS: usize,
    > Default for Resources<W, INGRESS_BUF_SIZE, NOTIF_CAPACITY, MAX_MONITORS>
{
    fn default() -> Self {
        Self::new()
    }
}
