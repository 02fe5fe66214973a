//! Fuzz target: `Config::merged`
//!
//! Any JSON object is a candidate merge patch.  A merge either fails and
//! leaves the base alone, or yields a config that validates and reloads
//! unchanged from its own serialised form.
//!
//! cargo fuzz run fuzz_config_merge

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensorlink::config::{Config, validate};
use serde_json::{Map, Value};

fuzz_target!(|data: &[u8]| {
    let Ok(patch) = serde_json::from_slice::<Map<String, Value>>(data) else {
        return;
    };
    let base = Config::default();
    if let Ok(next) = base.merged(&patch) {
        assert!(validate(&next).is_ok());
        let doc = serde_json::to_vec(&next).unwrap();
        let doc: Map<String, Value> = serde_json::from_slice(&doc).unwrap();
        let reloaded = Config::default().merged(&doc).unwrap();
        assert_eq!(reloaded, next);
    }
});
