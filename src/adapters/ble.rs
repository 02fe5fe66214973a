//! BLE radio adapter.
//!
//! Implements [`Radio`]: a Nordic-UART-style GATT server with one
//! notify+read TX characteristic and one write RX characteristic.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via the raw
//!   `esp_idf_svc::sys` bindings.  Stack callbacks never touch application
//!   state; they push [`RadioEvent`](crate::link::RadioEvent)s into
//!   [`EVENTS`](crate::events::EVENTS).
//! - **all other targets**: simulation that records advertising payloads
//!   and notifications for host-side tests.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                                   | Props        |
//! |----------------|----------------------------------------|--------------|
//! | UART service   | `6E400001-B5A3-F393-E0A9-E50E24DCCA9E` |              |
//! | TX             | `6E400002-B5A3-F393-E0A9-E50E24DCCA9E` | Notify+Read  |
//! | RX             | `6E400003-B5A3-F393-E0A9-E50E24DCCA9E` | Write        |

use log::info;

use crate::app::ports::Radio;
use crate::error::RadioError;

#[cfg(not(target_os = "espidf"))]
use crate::link::MAX_ADV_LEN;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const UART_SERVICE_UUID: u128 = 0x6E40_0001_B5A3_F393_E0A9_E50E_24DC_CA9E;
pub const UART_TX_UUID: u128 = 0x6E40_0002_B5A3_F393_E0A9_E50E_24DC_CA9E;
pub const UART_RX_UUID: u128 = 0x6E40_0003_B5A3_F393_E0A9_E50E_24DC_CA9E;

/// Largest attribute value; the local MTU is sized to carry one.
pub const MAX_ATTR_LEN: usize = 512;

/// Default ATT MTU before the peer negotiates a larger one.
pub const DEFAULT_MTU: u16 = 23;

/// What to do with a GATT write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteVerdict {
    /// RX data: queue it for the main loop and acknowledge.
    Deliver,
    /// Another attribute (the CCCD): acknowledge only.
    Acknowledge,
    /// Prepared (long) writes are not reassembled; refuse them so the peer
    /// does not believe the data arrived.
    Reject,
}

pub fn classify_write(on_rx: bool, prepared: bool) -> WriteVerdict {
    match (on_rx, prepared) {
        (_, true) => WriteVerdict::Reject,
        (true, false) => WriteVerdict::Deliver,
        (false, false) => WriteVerdict::Acknowledge,
    }
}

// ── ESP-IDF BLE static state ──────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures. These atomics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
use log::{error, warn};

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONN_ID: AtomicU16 = AtomicU16::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONNECTED: AtomicBool = AtomicBool::new(false);
#[cfg(target_os = "espidf")]
static BLE_MTU: AtomicU16 = AtomicU16::new(DEFAULT_MTU);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU16 = AtomicU16::new(0);
#[cfg(target_os = "espidf")]
static BLE_TX_HANDLE: AtomicU16 = AtomicU16::new(0);
#[cfg(target_os = "espidf")]
static BLE_RX_HANDLE: AtomicU16 = AtomicU16::new(0);
#[cfg(target_os = "espidf")]
static BLE_CHAR_STEP: AtomicU32 = AtomicU32::new(0);

/// Advertising interval in 0.625 ms units.
#[cfg(target_os = "espidf")]
const ADV_INTERVAL_UNITS: u16 = (crate::link::ADV_INTERVAL_MS * 1000 / 625) as u16;

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    unsafe {
        t.uuid.uuid128 = uuid.to_le_bytes();
    }
    t
}

#[cfg(target_os = "espidf")]
unsafe fn add_gatt_char(svc_handle: u16, uuid: u128, perm: u32, prop: u32) {
    use esp_idf_svc::sys::*;
    let mut char_uuid = uuid128_to_esp(uuid);
    unsafe {
        esp_ble_gatts_add_char(
            svc_handle,
            &mut char_uuid,
            perm as esp_gatt_perm_t,
            prop as esp_gatt_char_prop_t,
            core::ptr::null_mut(),
            core::ptr::null_mut(),
        );
    }
}

/// Client Characteristic Configuration descriptor, so centrals can
/// subscribe to TX notifications.
#[cfg(target_os = "espidf")]
unsafe fn add_cccd(svc_handle: u16) {
    use esp_idf_svc::sys::*;
    let mut uuid: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    uuid.len = 2;
    uuid.uuid.uuid16 = ESP_GATT_UUID_CHAR_CLIENT_CONFIG as u16;
    unsafe {
        esp_ble_gatts_add_char_descr(
            svc_handle,
            &mut uuid,
            (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
            core::ptr::null_mut(),
            core::ptr::null_mut(),
        );
    }
}

#[cfg(target_os = "espidf")]
unsafe fn start_advertising() {
    use esp_idf_svc::sys::*;
    let mut adv_params = esp_ble_adv_params_t {
        adv_int_min: ADV_INTERVAL_UNITS,
        adv_int_max: ADV_INTERVAL_UNITS,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..unsafe { core::mem::zeroed() }
    };
    let ret = unsafe { esp_ble_gap_start_advertising(&mut adv_params) };
    if ret != ESP_OK as i32 {
        warn!("BLE GAP: start advertising failed ({})", ret);
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        // Raw advertising data accepted: (re)start advertising with it.
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_RAW_SET_COMPLETE_EVT => unsafe {
            start_advertising();
        },
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            log::debug!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            log::debug!("BLE GAP: advertising stopped");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use crate::events::{EVENTS, Event};
    use crate::link::RadioEvent;
    use esp_idf_svc::sys::*;

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            BLE_GATTS_IF.store(gatts_if as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: app registered (if={})", gatts_if);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: uuid128_to_esp(UART_SERVICE_UUID),
                    inst_id: 0,
                },
                is_primary: true,
            };
            // Service + 2 characteristics (2 handles each) + CCCD.
            unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, 8) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let svc_handle = unsafe { (*param).create.service_handle };
            BLE_SVC_HANDLE.store(svc_handle, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: UART service created (handle={})", svc_handle);
            unsafe { esp_ble_gatts_start_service(svc_handle) };
            BLE_CHAR_STEP.store(1, AtomicOrdering::Relaxed);
            unsafe {
                add_gatt_char(
                    svc_handle,
                    UART_TX_UUID,
                    ESP_GATT_PERM_READ,
                    ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_NOTIFY,
                );
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let handle = unsafe { (*param).add_char.attr_handle };
            let svc_handle = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed);
            match BLE_CHAR_STEP.load(AtomicOrdering::Relaxed) {
                1 => {
                    BLE_TX_HANDLE.store(handle, AtomicOrdering::Relaxed);
                    log::info!("BLE GATTS: TX char (handle={})", handle);
                    BLE_CHAR_STEP.store(2, AtomicOrdering::Relaxed);
                    unsafe { add_cccd(svc_handle) };
                }
                3 => {
                    BLE_RX_HANDLE.store(handle, AtomicOrdering::Relaxed);
                    BLE_CHAR_STEP.store(4, AtomicOrdering::Relaxed);
                    log::info!("BLE GATTS: RX char (handle={}), service ready", handle);
                }
                _ => {}
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
            if BLE_CHAR_STEP.load(AtomicOrdering::Relaxed) == 2 {
                BLE_CHAR_STEP.store(3, AtomicOrdering::Relaxed);
                unsafe {
                    add_gatt_char(
                        BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed),
                        UART_RX_UUID,
                        ESP_GATT_PERM_WRITE,
                        ESP_GATT_CHAR_PROP_BIT_WRITE | ESP_GATT_CHAR_PROP_BIT_WRITE_NR,
                    );
                }
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let conn_id = unsafe { (*param).connect.conn_id };
            BLE_CONN_ID.store(conn_id, AtomicOrdering::Relaxed);
            BLE_MTU.store(DEFAULT_MTU, AtomicOrdering::Relaxed);
            BLE_CONNECTED.store(true, AtomicOrdering::Release);
            log::info!("BLE GATTS: client connected (conn_id={})", conn_id);
            EVENTS.push(Event::Radio(RadioEvent::PeerConnected));
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            BLE_CONNECTED.store(false, AtomicOrdering::Release);
            log::info!("BLE GATTS: client disconnected");
            EVENTS.push(Event::Radio(RadioEvent::PeerDisconnected));
        }
        esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
            let mtu = unsafe { (*param).mtu.mtu };
            BLE_MTU.store(mtu, AtomicOrdering::Relaxed);
            log::debug!("BLE GATTS: MTU {}", mtu);
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            let on_rx = p.handle == BLE_RX_HANDLE.load(AtomicOrdering::Relaxed);
            let status = match classify_write(on_rx, p.is_prep) {
                WriteVerdict::Deliver => {
                    let data = unsafe { core::slice::from_raw_parts(p.value, p.len as usize) };
                    EVENTS.push_write(data);
                    esp_gatt_status_t_ESP_GATT_OK
                }
                WriteVerdict::Acknowledge => esp_gatt_status_t_ESP_GATT_OK,
                WriteVerdict::Reject => {
                    warn!("BLE GATTS: prepared write ({} bytes) refused", p.len);
                    esp_gatt_status_t_ESP_GATT_REQ_NOT_SUPPORTED
                }
            };
            if p.need_rsp {
                unsafe {
                    esp_ble_gatts_send_response(
                        gatts_if,
                        p.conn_id,
                        p.trans_id,
                        status,
                        core::ptr::null_mut(),
                    );
                }
            }
        }
        // Nothing was prepared, so there is nothing to execute or cancel.
        esp_gatts_cb_event_t_ESP_GATTS_EXEC_WRITE_EVT => {
            let p = unsafe { &(*param).exec_write };
            unsafe {
                esp_ble_gatts_send_response(
                    gatts_if,
                    p.conn_id,
                    p.trans_id,
                    esp_gatt_status_t_ESP_GATT_OK,
                    core::ptr::null_mut(),
                );
            }
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleRadio {
    #[cfg(not(target_os = "espidf"))]
    sim: SimState,
}

/// What the host simulation records.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct SimState {
    pub adverts: Vec<heapless::Vec<u8, MAX_ADV_LEN>>,
    pub notifications: Vec<Vec<u8>>,
    /// Error returned by the next `notify`.
    pub fail_next_notify: Option<RadioError>,
}

impl BleRadio {
    /// Bring up the controller and Bluedroid and register the UART service.
    /// Advertising starts with the first [`Radio::advertise`] call.
    #[cfg(target_os = "espidf")]
    pub fn start() -> Result<Self, RadioError> {
        use esp_idf_svc::sys::*;
        unsafe {
            // BLE-only: release classic BT memory.
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let check = |step: &str, ret: i32| {
                if ret == ESP_OK as i32 {
                    Ok(())
                } else {
                    error!("BLE: {} failed ({})", step, ret);
                    Err(RadioError::StackInitFailed)
                }
            };
            let mut bt_cfg = esp_bt_controller_config_t::default();
            check("bt_controller_init", esp_bt_controller_init(&mut bt_cfg))?;
            check(
                "bt_controller_enable",
                esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
            )?;
            check("bluedroid_init", esp_bluedroid_init())?;
            check("bluedroid_enable", esp_bluedroid_enable())?;

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            check("gatts_app_register", esp_ble_gatts_app_register(0))?;
            esp_ble_gatt_set_local_mtu(MAX_ATTR_LEN as u16 + 3);
        }
        info!("BLE(espidf): Bluedroid stack initialised");
        Ok(Self {})
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn start() -> Result<Self, RadioError> {
        info!("BLE(sim): UART service {:032x}", UART_SERVICE_UUID);
        Ok(Self {
            sim: SimState::default(),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim(&self) -> &SimState {
        &self.sim
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_mut(&mut self) -> &mut SimState {
        &mut self.sim
    }
}

#[cfg(target_os = "espidf")]
impl Radio for BleRadio {
    fn advertise(&mut self, adv_data: &[u8]) -> Result<(), RadioError> {
        use esp_idf_svc::sys::*;
        let mut raw = heapless::Vec::<u8, { crate::link::MAX_ADV_LEN }>::from_slice(adv_data)
            .map_err(|()| RadioError::AdvertiseFailed)?;
        // Advertising starts from the GAP callback once the data is set.
        let ret = unsafe { esp_ble_gap_config_adv_data_raw(raw.as_mut_ptr(), raw.len() as u32) };
        if ret != ESP_OK as i32 {
            return Err(RadioError::AdvertiseFailed);
        }
        Ok(())
    }

    fn notify(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        use esp_idf_svc::sys::*;
        if !BLE_CONNECTED.load(AtomicOrdering::Acquire) {
            return Err(RadioError::NotifyFailed(ESP_ERR_INVALID_STATE as i32));
        }
        let gatts_if = BLE_GATTS_IF.load(AtomicOrdering::Relaxed) as esp_gatt_if_t;
        let conn_id = BLE_CONN_ID.load(AtomicOrdering::Relaxed);
        let handle = BLE_TX_HANDLE.load(AtomicOrdering::Relaxed);
        // A notification carries at most MTU - 3 bytes; longer payloads go
        // out as consecutive notifications and the peer reassembles them up
        // to the trailing newline.
        let chunk = usize::from(BLE_MTU.load(AtomicOrdering::Relaxed).max(DEFAULT_MTU)) - 3;
        for part in payload.chunks(chunk) {
            let ret = unsafe {
                esp_ble_gatts_send_indicate(
                    gatts_if,
                    conn_id,
                    handle,
                    part.len() as u16,
                    part.as_ptr() as *mut u8,
                    false,
                )
            };
            if ret != ESP_OK as i32 {
                return Err(RadioError::NotifyFailed(ret));
            }
        }
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl Radio for BleRadio {
    fn advertise(&mut self, adv_data: &[u8]) -> Result<(), RadioError> {
        let adv = heapless::Vec::from_slice(adv_data).map_err(|()| RadioError::AdvertiseFailed)?;
        self.sim.adverts.push(adv);
        Ok(())
    }

    fn notify(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        if let Some(e) = self.sim.fail_next_notify.take() {
            return Err(e);
        }
        self.sim.notifications.push(payload.to_vec());
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
