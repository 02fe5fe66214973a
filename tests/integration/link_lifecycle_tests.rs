//! Link lifecycle: advertising, connect/disconnect signalling and the
//! timers behind them.

use sensorlink::drivers::led_patterns::{
    COLOUR_CONNECTED, COLOUR_OFF, COLOUR_SEARCHING, CONNECT_BURST_FLASHES, FLASH_HOLD_MS,
    HEARTBEAT_PERIOD_MS, Pattern, SEARCHING_TOGGLE_MS,
};
use sensorlink::link::{LinkState, SendStatus};

use crate::mock_hw::{
    FakeClock, MemStore, MockDevice, boot, connect, disconnect, radio, status_tick,
};

fn booted() -> (MockDevice, FakeClock) {
    let clock = FakeClock::default();
    (boot(MemStore::default(), &clock), clock)
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_advertises_default_name_and_searches() {
    let (dev, _) = booted();

    assert_eq!(dev.machine().state(), LinkState::Disconnected);
    assert_eq!(radio(&dev).last_advertised_name(), Some(&b"Lass Mich"[..]));
    let indicator = dev.machine().indicator();
    assert_eq!(indicator.pattern(), Pattern::Searching);
    assert_eq!(indicator.timer().period_ms, Some(SEARCHING_TOGGLE_MS));
    assert!(!dev.board().scheduler().is_running());
}

// ── Sending ───────────────────────────────────────────────────

#[test]
fn send_while_disconnected_never_notifies() {
    let (mut dev, _) = booted();
    assert_eq!(dev.send("{\"x\":1}"), SendStatus::NotConnected);
    assert!(radio(&dev).notifications.is_empty());

    // Also after a session has ended.
    connect(&mut dev);
    disconnect(&mut dev);
    assert_eq!(dev.send("{\"x\":2}"), SendStatus::NotConnected);
    assert!(radio(&dev).notifications.is_empty());
}

#[test]
fn send_while_connected_appends_newline() {
    let (mut dev, _) = booted();
    connect(&mut dev);
    assert_eq!(dev.send("{\"x\":1}"), SendStatus::Sent);
    assert_eq!(radio(&dev).notifications, [b"{\"x\":1}\n".to_vec()]);
}

// ── Connect / disconnect ──────────────────────────────────────

#[test]
fn connect_plays_burst_then_heartbeat() {
    let (mut dev, _) = booted();
    connect(&mut dev);

    assert_eq!(dev.machine().state(), LinkState::Connected);
    let indicator = dev.machine().indicator();
    assert_eq!(indicator.pattern(), Pattern::Connected);
    assert_eq!(indicator.timer().period_ms, Some(HEARTBEAT_PERIOD_MS));

    let greens = indicator
        .led()
        .history
        .iter()
        .filter(|c| **c == COLOUR_CONNECTED)
        .count();
    assert_eq!(greens, CONNECT_BURST_FLASHES);
    assert_eq!(indicator.led().history.last(), Some(&COLOUR_OFF));
}

#[test]
fn repeated_connect_reruns_connect_actions() {
    let (mut dev, _) = booted();
    connect(&mut dev);
    let first_delay = dev.machine().indicator().delay().total_ns;
    connect(&mut dev);

    assert_eq!(dev.machine().state(), LinkState::Connected);
    let indicator = dev.machine().indicator();
    let greens = indicator
        .led()
        .history
        .iter()
        .filter(|c| **c == COLOUR_CONNECTED)
        .count();
    assert_eq!(greens, 2 * CONNECT_BURST_FLASHES);
    assert_eq!(indicator.delay().total_ns, 2 * first_delay);
    assert_eq!(indicator.timer().period_ms, Some(HEARTBEAT_PERIOD_MS));
    assert_eq!(indicator.timer().overlapping_starts, 0);

    let scheduler = dev.board().scheduler();
    assert!(scheduler.is_running());
    assert_eq!(scheduler.timer().starts, 2);
    assert_eq!(scheduler.timer().overlapping_starts, 0);
}

#[test]
fn connect_burst_blocks_for_two_holds_per_flash() {
    let (mut dev, _) = booted();
    connect(&mut dev);
    let expected = u64::from(FLASH_HOLD_MS) * 1_000_000 * 2 * CONNECT_BURST_FLASHES as u64;
    assert_eq!(dev.machine().indicator().delay().total_ns, expected);
}

#[test]
fn disconnect_readvertises_and_searches() {
    let (mut dev, _) = booted();
    connect(&mut dev);
    disconnect(&mut dev);

    assert_eq!(dev.machine().state(), LinkState::Disconnected);
    assert_eq!(radio(&dev).adverts.len(), 2);
    let indicator = dev.machine().indicator();
    assert_eq!(indicator.pattern(), Pattern::Searching);
    assert_eq!(indicator.timer().period_ms, Some(SEARCHING_TOGGLE_MS));
    assert!(!dev.board().scheduler().is_running());
}

#[test]
fn searching_pattern_toggles_blue() {
    let (mut dev, _) = booted();
    for _ in 0..3 {
        let tick = status_tick(&dev);
        dev.dispatch(tick);
    }

    let history = &dev.machine().indicator().led().history;
    let tail = &history[history.len() - 3..];
    assert_eq!(tail, [COLOUR_SEARCHING, COLOUR_OFF, COLOUR_SEARCHING]);
}

#[test]
fn quick_reconnect_never_leaves_two_schedules() {
    let (mut dev, clock) = booted();
    connect(&mut dev);
    disconnect(&mut dev);
    // Reconnect well inside one searching period.
    clock.advance_ms(100);
    let tick = status_tick(&dev);
    dev.dispatch(tick);
    connect(&mut dev);

    let status = dev.machine().indicator().timer();
    assert_eq!(status.overlapping_starts, 0);
    assert_eq!(status.period_ms, Some(HEARTBEAT_PERIOD_MS));

    let telemetry = dev.board().scheduler().timer();
    assert_eq!(telemetry.overlapping_starts, 0);
    assert!(telemetry.period_ms.is_some());
}

#[test]
fn searching_tick_queued_before_connect_is_not_a_heartbeat() {
    let (mut dev, _) = booted();
    let queued = status_tick(&dev);
    connect(&mut dev);
    let lit = dev.machine().indicator().led().history.len();
    let waited = dev.machine().indicator().delay().total_ns;

    dev.dispatch(queued);

    let indicator = dev.machine().indicator();
    assert_eq!(indicator.led().history.len(), lit);
    assert_eq!(indicator.delay().total_ns, waited);

    let heartbeat = status_tick(&dev);
    dev.dispatch(heartbeat);
    let history = &dev.machine().indicator().led().history;
    assert_eq!(
        &history[history.len() - 3..],
        [COLOUR_OFF, COLOUR_CONNECTED, COLOUR_OFF]
    );
}
