//! Fuzz target: `decode_control`
//!
//! Drives arbitrary RX writes into the control message decoder and checks
//! that every accepted sensor entry is named after its table key.
//!
//! cargo fuzz run fuzz_control_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensorlink::rpc::codec::{Command, decode_control};

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = decode_control(data) {
        if let Some(Command::Set(sensors)) = &msg.sensor {
            for (name, descriptor) in sensors {
                assert_eq!(name, &descriptor.name, "sensor name must follow its key");
            }
        }
    }
});
