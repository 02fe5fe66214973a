//! Callback-driven event system.
//!
//! Events are produced by:
//! - the BLE stack callbacks (peer connected / disconnected / RX write)
//! - timer callbacks (status pattern tick, telemetry tick)
//!
//! and consumed by the main loop, which is the single owner of the link
//! state machine, the configuration and the sensor table.  Producers never
//! touch application state; they only enqueue.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ GATTS cb    │────▶│              │     │              │
//! │ status tmr  │────▶│  EventQueue  │────▶│  Main Loop   │
//! │ telem tmr   │────▶│  (bounded)   │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! ## Capacity
//!
//! Connect and disconnect must never be lost, so the channel is partitioned:
//!
//! | Slots | Holder                                               |
//! |-------|------------------------------------------------------|
//! | 2     | ticks, at most one pending per kind (later ones fold) |
//! | 8     | RX writes                                            |
//! | 6     | peer connected / disconnected                        |

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::warn;

use crate::link::RadioEvent;

/// Largest inbound write carried through the queue.
pub const MAX_PAYLOAD: usize = 512;

/// Channel depth.
pub const EVENT_QUEUE_DEPTH: usize = 16;

/// RX writes allowed in the channel at once.
pub const MAX_PENDING_WRITES: usize = 8;

/// One pending tick per kind.
const TICK_SLOTS: usize = 2;

/// Slots only connect/disconnect can occupy.
pub const LIFECYCLE_SLOTS: usize = EVENT_QUEUE_DEPTH - TICK_SLOTS - MAX_PENDING_WRITES;

const _: () = assert!(LIFECYCLE_SLOTS >= 2);

/// Inbound RX characteristic payload.
pub type Payload = heapless::Vec<u8, MAX_PAYLOAD>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Connection lifecycle or RX data from the BLE stack.
    Radio(RadioEvent),
    /// Status LED pattern timer fired.  Carries the timer generation the
    /// tick was scheduled under.
    StatusTick(u32),
    /// Telemetry timer fired.
    TelemetryTick,
}

/// The queue fed by the BLE stack and timer callbacks.
///
/// C callbacks cannot capture state, so producers reach it as a static.
pub static EVENTS: EventQueue = EventQueue::new();

/// Bounded multi-producer queue between callbacks and the main loop.
pub struct EventQueue {
    channel: Channel<CriticalSectionRawMutex, Event, EVENT_QUEUE_DEPTH>,
    status_pending: AtomicBool,
    telemetry_pending: AtomicBool,
    writes_pending: AtomicUsize,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            status_pending: AtomicBool::new(false),
            telemetry_pending: AtomicBool::new(false),
            writes_pending: AtomicUsize::new(0),
        }
    }

    fn tick_flag(&self, event: &Event) -> Option<&AtomicBool> {
        match event {
            Event::StatusTick(_) => Some(&self.status_pending),
            Event::TelemetryTick => Some(&self.telemetry_pending),
            Event::Radio(_) => None,
        }
    }

    /// Enqueue an event.  Safe to call from any callback context.
    ///
    /// A tick while one of the same kind is still queued folds into it and
    /// counts as accepted.  Returns `false` only if the event was dropped.
    pub fn push(&self, event: Event) -> bool {
        let flag = self.tick_flag(&event);
        if let Some(flag) = flag {
            if flag.swap(true, Ordering::AcqRel) {
                return true;
            }
        }
        match self.channel.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                if let Some(flag) = flag {
                    flag.store(false, Ordering::Release);
                }
                warn!("EVENTS: queue full, {:?} dropped", event);
                false
            }
        }
    }

    /// Enqueue an RX write, copying the bytes into a fixed buffer.
    /// Oversize writes are dropped: a truncated JSON document would only
    /// fail to decode later.  So are writes beyond [`MAX_PENDING_WRITES`].
    pub fn push_write(&self, data: &[u8]) -> bool {
        let Ok(payload) = Payload::from_slice(data) else {
            warn!(
                "EVENTS: RX write of {} bytes exceeds {} byte buffer, dropped",
                data.len(),
                MAX_PAYLOAD
            );
            return false;
        };
        if self.writes_pending.fetch_add(1, Ordering::AcqRel) >= MAX_PENDING_WRITES {
            self.writes_pending.fetch_sub(1, Ordering::AcqRel);
            warn!("EVENTS: {} RX writes pending, write dropped", MAX_PENDING_WRITES);
            return false;
        }
        let pushed = self.push(Event::Radio(RadioEvent::DataReceived(payload)));
        if !pushed {
            self.writes_pending.fetch_sub(1, Ordering::AcqRel);
        }
        pushed
    }

    /// Release the slot accounting of an event leaving the channel.
    fn taken(&self, event: Event) -> Event {
        match &event {
            Event::Radio(RadioEvent::DataReceived(_)) => {
                self.writes_pending.fetch_sub(1, Ordering::AcqRel);
            }
            Event::Radio(_) => {}
            tick => {
                if let Some(flag) = self.tick_flag(tick) {
                    flag.store(false, Ordering::Release);
                }
            }
        }
        event
    }

    /// Pop the next event without blocking.
    pub fn try_pop(&self) -> Option<Event> {
        self.channel.try_receive().ok().map(|e| self.taken(e))
    }

    /// Wait for the next event.
    pub async fn pop(&self) -> Event {
        let event = self.channel.receive().await;
        self.taken(event)
    }

    /// Drain all pending events into a callback, FIFO order.
    pub fn drain(&self, mut handler: impl FnMut(Event)) {
        while let Some(event) = self.try_pop() {
            handler(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }
}
