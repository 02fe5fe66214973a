//! Durable configuration and identity across simulated reboots.

use std::path::PathBuf;

use rand::rngs::OsRng;
use sensorlink::adapters::device_id::{DeviceIdentity, IDENTITY_BLOB};
use sensorlink::adapters::fs_store::FileBlobStore;
use sensorlink::app::ports::BlobStore;
use sensorlink::config::{Config, SensorMap};
use sensorlink::store::{CONFIG_BLOB, ConfigStore};
use serde_json::{Map, Value, json};

use crate::mock_hw::{FakeClock, MemStore, boot, connect, identity, radio, write};

fn patch(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => panic!("patch must be an object"),
    }
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sensorlink-{}-{}", tag, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

// ── First boot ────────────────────────────────────────────────

#[test]
fn first_boot_uses_defaults_without_writing() {
    let clock = FakeClock::default();
    let mut dev = boot(MemStore::default(), &clock);
    connect(&mut dev);
    write(&mut dev, r#"{"config":"get"}"#);

    assert_eq!(dev.board().config(), &Config::default());
    assert!(!dev.board().store().is_persisted());
    assert_eq!(dev.board().store().store().writes, 0);
}

#[test]
fn first_update_writes_the_whole_document() {
    let clock = FakeClock::default();
    let mut dev = boot(MemStore::default(), &clock);
    connect(&mut dev);
    write(&mut dev, r#"{"config":{"telemetry_interval_ms":750}}"#);

    let store = dev.board().store().store();
    assert_eq!(store.writes, 1);
    let doc: Value = serde_json::from_slice(&store.blobs[CONFIG_BLOB]).unwrap();
    assert_eq!(doc["telemetry_interval_ms"], 750);
    assert_eq!(doc["link_name"], "Lass Mich");
    assert_eq!(doc["sensors"]["random"]["reader_id"], "random");
}

// ── Reload equals memory ──────────────────────────────────────

#[test]
fn reboot_restores_every_accepted_update() {
    let clock = FakeClock::default();
    let mut dev = boot(MemStore::default(), &clock);
    connect(&mut dev);
    write(&mut dev, r#"{"config":{"link_name":"Shed","owner":"ops"}}"#);
    write(
        &mut dev,
        r#"{"sensor":{"t":{"reader_id":"internal_temp","kwargs":{"unit":"F"}}}}"#,
    );
    let before = dev.board().config().clone();

    let stored = dev.board().store().store().clone();
    let rebooted = boot(stored, &clock);
    assert_eq!(rebooted.board().config(), &before);
    assert!(rebooted.board().store().is_persisted());
    assert_eq!(radio(&rebooted).last_advertised_name(), Some(&b"Shed"[..]));
}

#[test]
fn persist_failure_reports_error_and_keeps_memory() {
    let clock = FakeClock::default();
    let store = MemStore {
        fail_writes: true,
        ..MemStore::default()
    };
    let mut dev = boot(store, &clock);
    connect(&mut dev);
    write(&mut dev, r#"{"config":{"link_name":"Volatile"}}"#);

    let reply = &radio(&dev).sent_json()[0];
    assert!(reply["error"].as_str().unwrap().contains("storage full"));
    assert_eq!(reply["config"]["link_name"], "Volatile");
    assert_eq!(dev.board().config().link_name, "Volatile");
    assert!(!dev.board().store().is_persisted());
    assert!(!dev.board().store().store().exists(CONFIG_BLOB));
}

#[test]
fn invalid_stored_document_falls_back_to_defaults() {
    let mut store = MemStore::default();
    store
        .write(CONFIG_BLOB, br#"{"telemetry_interval_ms": 0}"#)
        .unwrap();
    let clock = FakeClock::default();
    let dev = boot(store, &clock);
    assert_eq!(dev.board().config(), &Config::default());
    assert!(!dev.board().store().is_persisted());
}

// ── Filesystem backend ────────────────────────────────────────

#[test]
fn file_store_round_trips_config() {
    let dir = scratch_dir("cfg");
    let fs = FileBlobStore::open(&dir).unwrap();
    let mut cs = ConfigStore::load(fs, identity());
    cs.set_config(&patch(json!({ "link_name": "Attic" }))).unwrap();

    let mut up = SensorMap::new();
    let descriptor = serde_json::from_value(json!({ "reader_id": "uptime" })).unwrap();
    up.insert("up".into(), descriptor).unwrap();
    cs.set_sensors(&up).unwrap();

    let reloaded = ConfigStore::load(FileBlobStore::open(&dir).unwrap(), identity());
    assert_eq!(reloaded.config(), cs.config());
    assert_eq!(reloaded.config().sensors["up"].name, "up");

    // No temp files left behind.
    let leftovers = std::fs::read_dir(&dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
        .count();
    assert_eq!(leftovers, 0);
    let _ = std::fs::remove_dir_all(&dir);
}

// ── Identity ──────────────────────────────────────────────────

#[test]
fn identity_is_generated_once_and_reused() {
    let dir = scratch_dir("id");
    let mut fs = FileBlobStore::open(&dir).unwrap();
    let first = DeviceIdentity::load_or_create(&mut fs, &mut OsRng).unwrap();
    let mut fs = FileBlobStore::open(&dir).unwrap();
    let second = DeviceIdentity::load_or_create(&mut fs, &mut OsRng).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.as_str().len(), 16);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn corrupted_identity_is_left_in_place() {
    let mut store = MemStore::default();
    store.write(IDENTITY_BLOB, b"not-an-id").unwrap();
    let id = DeviceIdentity::load_or_ephemeral(&mut store, &mut OsRng);
    assert_eq!(id.as_str().len(), 16);
    assert_eq!(store.blobs[IDENTITY_BLOB], b"not-an-id");
}
