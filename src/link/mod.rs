//! Radio link lifecycle state machine.
//!
//! ```text
//!                 PeerConnected
//!   ┌──────────────┐ ─────────▶ ┌─────────────┐
//!   │ Disconnected │            │  Connected  │──┐ PeerConnected
//!   │ (advertising)│ ◀───────── │             │◀─┘ (re-run signal)
//!   └──────────────┘ PeerDisc.  └─────────────┘
//!          ▲  │ PeerDisconnected (idempotent)
//!          └──┘
//! ```
//!
//! The state machine owns the radio and the status indicator.  It fires
//! the observer set given at construction on every transition and hands
//! every RX write to the observers, whatever the current state: the stack
//! only delivers writes on a live channel, so the write is trusted.
//!
//! Nobody else reads [`LinkState`] by polling; observers see it through the
//! callbacks and through the [`LinkHandle`] they are given.

use log::{debug, info, warn};

use crate::app::ports::{LinkHandle, LinkObserver, Radio, StatusSignal};
use crate::error::RadioError;
use crate::events::Payload;

/// Advertising interval used by the radio adapters.
pub const ADV_INTERVAL_MS: u32 = 200;

/// Maximum legacy advertising payload.
pub const MAX_ADV_LEN: usize = 31;

/// AD type: flags.
const AD_TYPE_FLAGS: u8 = 0x01;
/// AD type: complete local name.
const AD_TYPE_COMPLETE_NAME: u8 = 0x09;
/// LE General Discoverable.
const ADV_FLAGS: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// Events delivered by the BLE stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    PeerConnected,
    PeerDisconnected,
    DataReceived(Payload),
}

/// Outcome of [`LinkHandle::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Sent,
    /// No peer attached; nothing was handed to the radio.
    NotConnected,
    Failed(RadioError),
}

/// Build the raw advertising payload: flags + complete local name.
///
/// The name is cut at a character boundary if it does not fit.
pub fn advertising_payload(name: &str) -> heapless::Vec<u8, MAX_ADV_LEN> {
    let mut adv = heapless::Vec::new();
    let _ = adv.extend_from_slice(&[0x02, AD_TYPE_FLAGS, ADV_FLAGS]);

    let room = MAX_ADV_LEN - adv.len() - 2;
    let mut end = name.len().min(room);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let name = &name.as_bytes()[..end];

    let _ = adv.push(name.len() as u8 + 1);
    let _ = adv.push(AD_TYPE_COMPLETE_NAME);
    let _ = adv.extend_from_slice(name);
    adv
}

// ---------------------------------------------------------------------------
// Link: the part of the machine observers may touch
// ---------------------------------------------------------------------------

/// Radio plus connection state.
pub struct Link<R: Radio> {
    radio: R,
    state: LinkState,
    link_name: String,
}

impl<R: Radio> Link<R> {
    fn new(radio: R, link_name: &str) -> Self {
        Self {
            radio,
            state: LinkState::Disconnected,
            link_name: link_name.into(),
        }
    }

    fn advertise(&mut self) {
        let adv = advertising_payload(&self.link_name);
        match self.radio.advertise(&adv) {
            Ok(()) => info!("LINK: advertising as '{}'", self.link_name),
            Err(e) => warn!("LINK: advertising failed: {}", e),
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn link_name(&self) -> &str {
        &self.link_name
    }
}

impl<R: Radio> LinkHandle for Link<R> {
    fn send(&mut self, payload: &str) -> SendStatus {
        if self.state != LinkState::Connected {
            warn!("LINK: not connected, dropping {} byte payload", payload.len());
            return SendStatus::NotConnected;
        }

        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.extend_from_slice(payload.as_bytes());
        if !payload.ends_with('\n') {
            frame.push(b'\n');
        }

        match self.radio.notify(&frame) {
            Ok(()) => {
                debug!("LINK: notified {} bytes", frame.len());
                SendStatus::Sent
            }
            Err(e) => {
                warn!("LINK: notify failed: {}", e);
                SendStatus::Failed(e)
            }
        }
    }

    fn state(&self) -> LinkState {
        self.state
    }

    fn set_link_name(&mut self, name: &str) {
        if self.link_name != name {
            info!("LINK: link name '{}' -> '{}'", self.link_name, name);
            self.link_name = name.into();
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub struct LinkStateMachine<R: Radio, I: StatusSignal, O: LinkObserver> {
    link: Link<R>,
    indicator: I,
    observer: O,
}

impl<R: Radio, I: StatusSignal, O: LinkObserver> LinkStateMachine<R, I, O> {
    /// Construct in `Disconnected`: start advertising and the searching
    /// pattern.  The observer set cannot be changed afterwards.
    pub fn new(radio: R, indicator: I, link_name: &str, observer: O) -> Self {
        let mut machine = Self {
            link: Link::new(radio, link_name),
            indicator,
            observer,
        };
        machine.indicator.disconnected_signal();
        machine.link.advertise();
        info!("LINK: initialised, state={:?}", machine.link.state);
        machine
    }

    /// Apply one radio event.
    pub fn handle(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::PeerConnected => self.on_peer_connected(),
            RadioEvent::PeerDisconnected => self.on_peer_disconnected(),
            RadioEvent::DataReceived(payload) => {
                debug!(
                    "LINK: received {} bytes (state={:?})",
                    payload.len(),
                    self.link.state
                );
                self.observer.on_write(&mut self.link, &payload);
            }
        }
    }

    /// The indicator's timer fired under timer generation `generation`.
    pub fn status_tick(&mut self, generation: u32) {
        self.indicator.on_tick(generation);
    }

    pub fn send(&mut self, payload: &str) -> SendStatus {
        self.link.send(payload)
    }

    pub fn state(&self) -> LinkState {
        self.link.state
    }

    /// Borrow the link and the observers together, for work that is not a
    /// radio event (the telemetry tick).
    pub fn split(&mut self) -> (&mut Link<R>, &mut O) {
        (&mut self.link, &mut self.observer)
    }

    pub fn link(&self) -> &Link<R> {
        &self.link
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    fn on_peer_connected(&mut self) {
        if self.link.state == LinkState::Connected {
            info!("LINK: connect while already connected, re-running connect actions");
        } else {
            info!("LINK: peer connected");
        }
        self.link.state = LinkState::Connected;
        self.indicator.connected_signal();
        self.observer.on_connect(&mut self.link);
    }

    fn on_peer_disconnected(&mut self) {
        if self.link.state == LinkState::Disconnected {
            debug!("LINK: disconnect while already disconnected");
        } else {
            info!("LINK: peer disconnected");
        }
        self.link.state = LinkState::Disconnected;
        self.link.advertise();
        self.indicator.disconnected_signal();
        self.observer.on_disconnect(&mut self.link);
    }
}
