//! Receive-path line reassembly and classification.
//!
//! [`Ingress::write`] is meant to be called from the byte-delivery context
//! (UART interrupt or reader task). It reassembles the byte stream into
//! lines, resolves the outstanding command on a terminal result line, and
//! queues everything else for deferred monitor dispatch. It never blocks,
//! never awaits and never transmits.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use heapless::String;

use crate::client::ResponseSlot;
use crate::response::classify;

pub struct Ingress<'a, const INGRESS_BUF_SIZE: usize, const NOTIF_CAPACITY: usize> {
    slot: &'a ResponseSlot,
    notifs: Sender<'a, CriticalSectionRawMutex, String<INGRESS_BUF_SIZE>, NOTIF_CAPACITY>,
    buf: [u8; INGRESS_BUF_SIZE],
    pos: usize,
    overrun: bool,
}

impl<'a, const INGRESS_BUF_SIZE: usize, const NOTIF_CAPACITY: usize>
    Ingress<'a, INGRESS_BUF_SIZE, NOTIF_CAPACITY>
{
    pub(crate) fn new(
        slot: &'a ResponseSlot,
        notifs: Sender<'a, CriticalSectionRawMutex, String<INGRESS_BUF_SIZE>, NOTIF_CAPACITY>,
    ) -> Self {
        Self {
            slot,
            notifs,
            buf: [0; INGRESS_BUF_SIZE],
            pos: 0,
            overrun: false,
        }
    }

    /// Feed received bytes. May be called with arbitrary chunk boundaries.
    pub fn write(&mut self, data: &[u8]) {
        for &byte in data {
            match byte {
                b'\r' | b'\n' => self.complete_line(),
                _ => {
                    if self.pos == INGRESS_BUF_SIZE {
                        self.overrun = true;
                    } else {
                        self.buf[self.pos] = byte;
                        self.pos += 1;
                    }
                }
            }
        }
    }

    fn complete_line(&mut self) {
        let len = self.pos;
        self.pos = 0;

        if core::mem::take(&mut self.overrun) {
            warn!("dropping oversized line ({} byte buffer)", INGRESS_BUF_SIZE);
            return;
        }
        if len == 0 {
            return;
        }

        let Ok(line) = core::str::from_utf8(&self.buf[..len]) else {
            warn!("dropping non-UTF-8 line");
            return;
        };

        match classify(line) {
            Some(response) => {
                if !self.slot.resolve(response) {
                    // No command outstanding: a terminal token on its own is
                    // still a notification candidate.
                    self.offer_notification(line);
                }
            }
            None => self.offer_notification(line),
        }
    }

    fn offer_notification(&self, line: &str) {
        let Ok(line) = String::try_from(line) else {
            return;
        };
        if self.notifs.try_send(line).is_err() {
            warn!("notification queue full, dropping line");
        }
    }
}
