//! Board controller and event dispatcher, the hexagonal core.
//!
//! [`BoardController`] is the link observer: it owns the configuration, the
//! sensor registry and the telemetry scheduler, answers control messages
//! and runs telemetry cycles.  [`Device`] owns the link state machine with
//! the controller plugged in and routes every queued [`Event`] to it.
//!
//! ```text
//!  EventQueue ──▶ Device::dispatch
//!                   ├─ Radio(e)      ──▶ LinkStateMachine::handle ──▶ BoardController
//!                   ├─ StatusTick    ──▶ StatusIndicator::on_tick
//!                   └─ TelemetryTick ──▶ BoardController::telemetry_tick
//! ```

use log::{debug, info, warn};

use crate::adapters::device_id::DeviceIdentity;
use crate::config::Config;
use crate::events::{Event, EventQueue};
use crate::link::{LinkState, LinkStateMachine, SendStatus};
use crate::rpc::codec::{Command, ControlMessage, decode_control, encode_reply, encode_telemetry};
use crate::scheduler::TelemetryScheduler;
use crate::sensors::SensorRegistry;
use crate::store::ConfigStore;

use super::ports::{BlobStore, Clock, LinkHandle, LinkObserver, PeriodicTimer, Radio, StatusSignal};

/// Version reported as `firmware` in every telemetry record.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ───────────────────────────────────────────────────────────────
// BoardController
// ───────────────────────────────────────────────────────────────

pub struct BoardController<S: BlobStore, T: PeriodicTimer, C: Clock> {
    store: ConfigStore<S>,
    sensors: SensorRegistry<C>,
    scheduler: TelemetryScheduler<T>,
    firmware: &'static str,
}

impl<S: BlobStore, T: PeriodicTimer, C: Clock> BoardController<S, T, C> {
    pub fn new(
        store: ConfigStore<S>,
        sensors: SensorRegistry<C>,
        scheduler: TelemetryScheduler<T>,
    ) -> Self {
        Self {
            store,
            sensors,
            scheduler,
            firmware: FIRMWARE_VERSION,
        }
    }

    pub fn config(&self) -> &Config {
        self.store.config()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        self.store.identity()
    }

    pub fn store(&self) -> &ConfigStore<S> {
        &self.store
    }

    pub fn scheduler(&self) -> &TelemetryScheduler<T> {
        &self.scheduler
    }

    /// The telemetry timer fired: run one sense-and-send cycle unless the
    /// tick is stale.
    pub fn telemetry_tick(&mut self, link: &mut dyn LinkHandle) {
        let now = self.sensors.clock().uptime_us();
        if !self.scheduler.should_run(now) {
            return;
        }
        if link.state() != LinkState::Connected {
            debug!("TELEM: no peer, cycle skipped");
            return;
        }

        let record = self
            .sensors
            .poll(self.store.config(), self.store.identity(), self.firmware);
        let line = encode_telemetry(&record);
        match link.send(&line) {
            SendStatus::Sent => debug!("TELEM: sent {} fields", record.fields.len()),
            SendStatus::NotConnected => debug!("TELEM: peer gone before send"),
            SendStatus::Failed(e) => warn!("TELEM: send failed: {}", e),
        }
    }

    fn handle_control(&mut self, link: &mut dyn LinkHandle, msg: &ControlMessage) {
        let before = (
            self.store.config().link_name.clone(),
            self.store.config().telemetry_interval_ms,
        );
        let mut errors: Vec<String> = Vec::new();

        if let Some(Command::Set(patch)) = &msg.config {
            match self.store.set_config(patch) {
                Ok(()) => info!("CFG: config updated ({} keys)", patch.len()),
                Err(e) => {
                    warn!("CFG: config update: {}", e);
                    errors.push(e.to_string());
                }
            }
        }
        if let Some(Command::Set(upserts)) = &msg.sensor {
            match self.store.set_sensors(upserts) {
                Ok(()) => info!("CFG: {} sensor(s) upserted", upserts.len()),
                Err(e) => {
                    warn!("CFG: sensor update: {}", e);
                    errors.push(e.to_string());
                }
            }
        }

        // A failed persist still leaves the new value in memory.
        let cfg = self.store.config();
        if cfg.link_name != before.0 {
            link.set_link_name(&cfg.link_name);
        }
        if cfg.telemetry_interval_ms != before.1 {
            self.scheduler.restart_if_running(cfg.telemetry_interval_ms);
        }

        let error = (!errors.is_empty()).then(|| errors.join("; "));
        let reply = encode_reply(self.store.config(), error.as_deref());
        if let SendStatus::Failed(e) = link.send(&reply) {
            warn!("CFG: reply not delivered: {}", e);
        }
    }
}

impl<S: BlobStore, T: PeriodicTimer, C: Clock> LinkObserver for BoardController<S, T, C> {
    fn on_connect(&mut self, _link: &mut dyn LinkHandle) {
        self.scheduler.start(self.store.config().telemetry_interval_ms);
    }

    fn on_disconnect(&mut self, _link: &mut dyn LinkHandle) {
        self.scheduler.stop();
    }

    fn on_write(&mut self, link: &mut dyn LinkHandle, payload: &[u8]) {
        match decode_control(payload) {
            Ok(msg) if msg.is_empty() => debug!("CFG: message without config/sensor ignored"),
            Ok(msg) => self.handle_control(link, &msg),
            Err(e) => warn!("CFG: dropped inbound message: {}", e),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Device
// ───────────────────────────────────────────────────────────────

/// Link state machine with the board controller attached.
pub struct Device<R, I, S, T, C>
where
    R: Radio,
    I: StatusSignal,
    S: BlobStore,
    T: PeriodicTimer,
    C: Clock,
{
    machine: LinkStateMachine<R, I, BoardController<S, T, C>>,
}

impl<R, I, S, T, C> Device<R, I, S, T, C>
where
    R: Radio,
    I: StatusSignal,
    S: BlobStore,
    T: PeriodicTimer,
    C: Clock,
{
    /// Starts advertising under the configured link name.
    pub fn new(radio: R, indicator: I, board: BoardController<S, T, C>) -> Self {
        let link_name = board.config().link_name.clone();
        Self {
            machine: LinkStateMachine::new(radio, indicator, &link_name, board),
        }
    }

    pub fn dispatch(&mut self, event: Event) {
        match event {
            Event::Radio(e) => self.machine.handle(e),
            Event::StatusTick(generation) => self.machine.status_tick(generation),
            Event::TelemetryTick => {
                let (link, board) = self.machine.split();
                board.telemetry_tick(link);
            }
        }
    }

    /// Serve events forever.
    pub async fn run(&mut self, queue: &EventQueue) {
        loop {
            let event = queue.pop().await;
            self.dispatch(event);
        }
    }

    /// Send a payload outside any callback.
    pub fn send(&mut self, payload: &str) -> SendStatus {
        self.machine.send(payload)
    }

    pub fn machine(&self) -> &LinkStateMachine<R, I, BoardController<S, T, C>> {
        &self.machine
    }

    pub fn board(&self) -> &BoardController<S, T, C> {
        self.machine.observer()
    }
}
