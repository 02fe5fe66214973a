//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ LinkStateMachine / BoardController (domain)
//! ```
//!
//! Driven adapters (radio, LED, timers, storage, clock) implement these
//! traits.  The domain consumes them via generics, so the link state
//! machine and the protocol engine never touch hardware directly.

use crate::error::{RadioError, StorageError};
use crate::link::{LinkState, SendStatus};

// ───────────────────────────────────────────────────────────────
// Radio port (driven adapter: domain ↔ BLE peripheral stack)
// ───────────────────────────────────────────────────────────────

/// The BLE peripheral primitives the link state machine needs.
///
/// Connection events flow the other way, as
/// [`RadioEvent`](crate::link::RadioEvent)s delivered by the main loop.
pub trait Radio {
    /// (Re)start advertising with the given raw advertising payload.
    fn advertise(&mut self, adv_data: &[u8]) -> Result<(), RadioError>;

    /// Push `payload` to the connected peer on the TX characteristic.
    fn notify(&mut self, payload: &[u8]) -> Result<(), RadioError>;
}

// ───────────────────────────────────────────────────────────────
// LED port (driven adapter: domain → RGB status light)
// ───────────────────────────────────────────────────────────────

/// Colour as (R, G, B) tuple, each 0–255.
pub type Rgb = (u8, u8, u8);

pub trait RgbLed {
    fn set_colour(&mut self, colour: Rgb);
}

// ───────────────────────────────────────────────────────────────
// Timer port
// ───────────────────────────────────────────────────────────────

/// A single periodic timer.  Each firing is delivered to the main loop as
/// an event; the timer itself never runs domain code.
///
/// `start` on a running timer cancels the pending period first, so one
/// handle can never have two active schedules.
pub trait PeriodicTimer {
    fn start(&mut self, period_ms: u32);
    fn stop(&mut self);
    fn is_running(&self) -> bool;

    /// Bumped by every `start`.  Ticks carry the generation they were
    /// scheduled under, so a consumer can tell a late tick from an older
    /// schedule.  Timers that do not tag their ticks stay at 0.
    fn generation(&self) -> u32 {
        0
    }
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash filesystem)
// ───────────────────────────────────────────────────────────────

/// Durable named blobs.
///
/// `write` MUST be atomic: after a failed or interrupted write the previous
/// contents are still readable.
pub trait BlobStore {
    /// Read a blob.  `Ok(None)` if it does not exist.
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace a blob atomically.
    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a blob.  Returns `Ok(())` even if it didn't exist.
    fn remove(&mut self, name: &str) -> Result<(), StorageError>;

    fn exists(&self, name: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time since boot.
pub trait Clock {
    fn uptime_us(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Link-side ports (domain ↔ domain)
// ───────────────────────────────────────────────────────────────

/// What a link observer may do with the link while handling a callback.
pub trait LinkHandle {
    /// Send a payload to the peer.  Reports `NotConnected` rather than
    /// failing when no peer is attached.
    fn send(&mut self, payload: &str) -> SendStatus;

    fn state(&self) -> LinkState;

    /// Name used the next time advertising is (re)started.
    fn set_link_name(&mut self, name: &str);
}

/// Lifecycle callbacks fired by the
/// [`LinkStateMachine`](crate::link::LinkStateMachine).
///
/// The observer set is fixed at construction.  Several observers are
/// combined with a tuple or a `Vec`.
pub trait LinkObserver {
    fn on_connect(&mut self, link: &mut dyn LinkHandle);
    fn on_disconnect(&mut self, link: &mut dyn LinkHandle);
    fn on_write(&mut self, link: &mut dyn LinkHandle, payload: &[u8]);
}

impl<A: LinkObserver, B: LinkObserver> LinkObserver for (A, B) {
    fn on_connect(&mut self, link: &mut dyn LinkHandle) {
        self.0.on_connect(link);
        self.1.on_connect(link);
    }

    fn on_disconnect(&mut self, link: &mut dyn LinkHandle) {
        self.0.on_disconnect(link);
        self.1.on_disconnect(link);
    }

    fn on_write(&mut self, link: &mut dyn LinkHandle, payload: &[u8]) {
        self.0.on_write(link, payload);
        self.1.on_write(link, payload);
    }
}

impl<T: LinkObserver + ?Sized> LinkObserver for Box<T> {
    fn on_connect(&mut self, link: &mut dyn LinkHandle) {
        (**self).on_connect(link);
    }

    fn on_disconnect(&mut self, link: &mut dyn LinkHandle) {
        (**self).on_disconnect(link);
    }

    fn on_write(&mut self, link: &mut dyn LinkHandle, payload: &[u8]) {
        (**self).on_write(link, payload);
    }
}

impl<T: LinkObserver> LinkObserver for Vec<T> {
    fn on_connect(&mut self, link: &mut dyn LinkHandle) {
        for observer in self.iter_mut() {
            observer.on_connect(link);
        }
    }

    fn on_disconnect(&mut self, link: &mut dyn LinkHandle) {
        for observer in self.iter_mut() {
            observer.on_disconnect(link);
        }
    }

    fn on_write(&mut self, link: &mut dyn LinkHandle, payload: &[u8]) {
        for observer in self.iter_mut() {
            observer.on_write(link, payload);
        }
    }
}

/// The visual side effects of link transitions.
pub trait StatusSignal {
    /// Peer attached.  May block for the connect burst.
    fn connected_signal(&mut self);

    /// Peer gone, advertising.
    fn disconnected_signal(&mut self);

    /// The indicator's pattern timer fired under timer generation
    /// `generation`.
    fn on_tick(&mut self, generation: u32);
}
