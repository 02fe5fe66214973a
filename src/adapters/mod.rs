//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements   | Connects to                        |
//! |-------------|--------------|------------------------------------|
//! | `ble`       | Radio        | Bluedroid GATT server (UART style) |
//! | `nvs`       | BlobStore    | NVS / in-memory store              |
//! | `fs_store`  | BlobStore    | VFS filesystem, write-then-rename  |
//! | `time`      | Clock        | ESP32 high-resolution timer        |
//! | `device_id` | -            | identity blob + hardware RNG       |

pub mod ble;
pub mod device_id;
pub mod fs_store;
pub mod nvs;
pub mod time;
