//! Control messages in, replies and telemetry out, end to end through the
//! link state machine and the board controller.

use sensorlink::app::ports::BlobStore;
use sensorlink::events::Event;
use sensorlink::store::CONFIG_BLOB;
use serde_json::{Value, json};

use crate::mock_hw::{FakeClock, MemStore, MockDevice, TEST_ID, boot, connect, radio, write};

fn connected() -> (MockDevice, FakeClock) {
    let clock = FakeClock::default();
    let mut dev = boot(MemStore::default(), &clock);
    connect(&mut dev);
    (dev, clock)
}

fn telemetry(dev: &mut MockDevice, clock: &FakeClock) -> Value {
    clock.advance_ms(u64::from(dev.board().config().telemetry_interval_ms));
    let before = radio(dev).notifications.len();
    dev.dispatch(Event::TelemetryTick);
    let sent = radio(dev).sent_json();
    assert_eq!(sent.len(), before + 1, "one record per cycle");
    sent[before].clone()
}

// ── Config get ────────────────────────────────────────────────

#[test]
fn config_get_replies_full_config_without_writing() {
    let (mut dev, _) = connected();
    write(&mut dev, r#"{"config":"get"}"#);

    let sent = radio(&dev).sent_json();
    assert_eq!(sent.len(), 1);
    let expected = serde_json::to_value(dev.board().config()).unwrap();
    assert_eq!(sent[0], json!({ "config": expected }));
    assert_eq!(dev.board().store().store().writes, 0);
    assert!(!dev.board().store().store().exists(CONFIG_BLOB));
}

#[test]
fn sensor_get_also_replies_with_config() {
    let (mut dev, _) = connected();
    write(&mut dev, r#"{"sensor":"get"}"#);
    let sent = radio(&dev).sent_json();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["config"]["sensors"]["random"]["reader_id"], "random");
}

// ── Sensor upsert ─────────────────────────────────────────────

#[test]
fn unknown_reader_reports_interface_not_found() {
    let (mut dev, clock) = connected();
    write(
        &mut dev,
        r#"{"sensor":{"temp":{"name":"temp","reader_id":"unknown_fn","kwargs":{}}}}"#,
    );

    let reply = &radio(&dev).sent_json()[0];
    assert_eq!(reply["config"]["sensors"]["temp"]["reader_id"], "unknown_fn");
    assert!(reply.get("error").is_none());

    let record = telemetry(&mut dev, &clock);
    assert_eq!(record["temp"], "interface 'unknown_fn' not found");
    assert!(record["random"]["value"].is_number());
    assert_eq!(record["_id"], TEST_ID);
}

#[test]
fn failing_reader_does_not_abort_the_cycle() {
    let (mut dev, clock) = connected();
    write(
        &mut dev,
        r#"{"sensor":{"t":{"reader_id":"internal_temp","kwargs":{"unit":"K"}},"c":{"reader_id":"constant","kwargs":{"value":3}}}}"#,
    );

    let record = telemetry(&mut dev, &clock);
    let obj = record.as_object().unwrap();
    // firmware, _id and three sensors.
    assert_eq!(obj.len(), 5);
    let err = record["t"].as_str().unwrap();
    assert!(err.starts_with("error while reading sensor 't':"), "{err}");
    assert_eq!(record["c"]["value"], 3);
}

#[test]
fn upsert_keeps_existing_sensors_in_order() {
    let (mut dev, _) = connected();
    write(&mut dev, r#"{"sensor":{"a":{"reader_id":"uptime"}}}"#);
    write(&mut dev, r#"{"sensor":{"random":{"reader_id":"constant","kwargs":{"value":1}}}}"#);

    let names: Vec<&str> = dev
        .board()
        .config()
        .sensors
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(names, ["random", "a"]);
    assert_eq!(dev.board().config().sensors["random"].reader_id, "constant");
}

// ── Config set ────────────────────────────────────────────────

#[test]
fn config_set_merges_shallowly_and_propagates() {
    let (mut dev, _) = connected();
    write(
        &mut dev,
        r#"{"config":{"link_name":"Greenhouse","telemetry_interval_ms":2000}}"#,
    );

    let cfg = dev.board().config();
    assert_eq!(cfg.link_name, "Greenhouse");
    assert_eq!(cfg.telemetry_interval_ms, 2000);
    assert!(cfg.sensors.contains_key("random"));
    assert_eq!(dev.board().scheduler().timer().period_ms, Some(2000));
    assert_eq!(dev.machine().link().link_name(), "Greenhouse");
}

#[test]
fn config_and_sensor_in_one_message_get_one_reply() {
    let (mut dev, _) = connected();
    write(
        &mut dev,
        r#"{"config":{"owner":"lab 3"},"sensor":{"up":{"reader_id":"uptime"}}}"#,
    );

    let sent = radio(&dev).sent_json();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["config"]["owner"], "lab 3");
    assert_eq!(sent[0]["config"]["sensors"]["up"]["reader_id"], "uptime");
}

#[test]
fn invalid_update_is_rejected_with_error_reply() {
    let (mut dev, _) = connected();
    write(&mut dev, r#"{"config":{"link_name":""}}"#);

    let sent = radio(&dev).sent_json();
    assert_eq!(sent.len(), 1);
    assert!(sent[0]["error"].is_string());
    assert_eq!(sent[0]["config"]["link_name"], "Lass Mich");
    assert_eq!(dev.board().store().store().writes, 0);
}

#[test]
fn reserved_sensor_name_is_rejected() {
    let (mut dev, _) = connected();
    write(&mut dev, r#"{"sensor":{"_id":{"reader_id":"random"}}}"#);

    let sent = radio(&dev).sent_json();
    assert!(sent[0]["error"].is_string());
    assert!(!dev.board().config().sensors.contains_key("_id"));
}

#[test]
fn malformed_messages_are_dropped_silently() {
    let (mut dev, _) = connected();
    write(&mut dev, "{\"config\":");
    write(&mut dev, "[]");
    write(&mut dev, r#"{"config":"put"}"#);
    write(&mut dev, r#"{"unrelated":true}"#);
    assert!(radio(&dev).notifications.is_empty());
    assert_eq!(dev.machine().state(), sensorlink::link::LinkState::Connected);
}

// ── Telemetry pacing ──────────────────────────────────────────

#[test]
fn queued_ticks_do_not_run_back_to_back() {
    let (mut dev, clock) = connected();
    clock.advance_ms(5000);
    for _ in 0..4 {
        dev.dispatch(Event::TelemetryTick);
    }
    assert_eq!(radio(&dev).notifications.len(), 1);

    clock.advance_ms(5000);
    dev.dispatch(Event::TelemetryTick);
    assert_eq!(radio(&dev).notifications.len(), 2);
}

#[test]
fn telemetry_reports_firmware_version() {
    let (mut dev, clock) = connected();
    let record = telemetry(&mut dev, &clock);
    assert_eq!(record["firmware"], env!("CARGO_PKG_VERSION"));
}
