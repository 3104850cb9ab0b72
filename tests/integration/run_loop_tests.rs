//! End-to-end run-loop tests: NetSender → handlers → mock platform.
//!
//! Each test seeds an in-memory NVS with a stored configuration, scripts
//! the mock platform's HTTP replies and sensor readings, and drives whole
//! cycles through `NetSender::run`.

use crate::mock_hw::MockPlatform;
use netsender::adapters::nvs::NvsAdapter;
use netsender::app::context::{Context, DeviceError};
use netsender::app::service::NetSender;
use netsender::config::{self, BootReason, Config, VERSION, Var};
use netsender::pins::{BAT_PIN, Pin, X_BAT, X_BOOT_REASON};

/// Seed NVS with a baseline config (60 s periods, armed voltage alarm
/// thresholds left to each test).
fn seeded_nvs(customize: impl FnOnce(&mut Config)) -> NvsAdapter {
    let nvs = NvsAdapter::new();
    let mut cfg = Config {
        version: VERSION,
        mon_period: 60,
        act_period: 60,
        ..Config::default()
    };
    cfg.dkey.push_str("DK1").unwrap();
    cfg.set_var(Var::AutoRestart, 600);
    cfg.set_var(Var::PeakVoltage, 845);
    customize(&mut cfg);
    config::save(&nvs, &cfg).unwrap();
    nvs
}

#[test]
fn happy_poll_writes_outputs_and_caches_varsum() {
    let nvs = seeded_nvs(|cfg| {
        cfg.inputs.push_str("A4,X10").unwrap();
        cfg.outputs.push_str("D5").unwrap();
        cfg.set_var(Var::AlarmNetwork, 3);
    });
    let mut plat = MockPlatform::new();
    plat.push_reply(r#"{"D5":1,"rc":0,"vs":12345}"#);
    plat.push_reply(r#"{"id":1,"vs":12345}"#);

    let mut node = NetSender::init(&mut plat, &nvs);
    let ok = node.run(&mut plat, &nvs);

    assert!(ok);
    assert_eq!(plat.levels.get(&5), Some(&1), "D5 commanded high");
    assert_eq!(node.context().alarms.network_failures(), 0);
    assert_eq!(node.context().varsum, 12345);
    assert_eq!(node.varsum(), 12345);
    assert_eq!(plat.nav_flashes(), 1, "single OK status flash");

    // The poll carried both inputs; X10 is reported even while negative.
    let paths = plat.request_paths();
    let poll = paths.iter().find(|p| p.starts_with("/poll")).unwrap();
    assert!(poll.contains("&A4=0"));
    assert!(poll.contains("&X10=-1"));
    assert!(poll.contains("dk=DK1"));
}

#[test]
fn update_response_cascades_into_reconfiguration() {
    let nvs = seeded_nvs(|cfg| {
        cfg.inputs.push_str("A4").unwrap();
        cfg.outputs.push_str("D5").unwrap();
    });
    let mut plat = MockPlatform::new();
    plat.push_reply(r#"{"rc":1,"vs":12345}"#);
    plat.push_reply(r#"{"ip":"A4","op":"D5,D6","mp":30,"ap":30,"rc":0}"#);
    plat.push_reply(r#"{"id":1,"vs":12345}"#);

    let mut node = NetSender::init(&mut plat, &nvs);
    let ok = node.run(&mut plat, &nvs);

    assert!(ok);
    assert!(node.context().configured);
    let cfg = &node.context().config;
    assert_eq!(cfg.mon_period, 30);
    assert_eq!(cfg.act_period, 30);
    assert_eq!(cfg.inputs.as_str(), "A4");
    assert_eq!(cfg.outputs.as_str(), "D5,D6");

    // New image reached the store.
    assert_eq!(config::load(&nvs).outputs.as_str(), "D5,D6");
    // Config-update burst (4) followed by the cycle's OK flash.
    assert_eq!(plat.nav_flashes(), 5);

    let paths = plat.request_paths();
    assert!(paths.iter().any(|p| p.starts_with("/config")));
    let config_req = paths.iter().find(|p| p.starts_with("/config")).unwrap();
    assert!(config_req.contains("md=Normal"));
    assert!(config_req.contains("er=None"));
}

#[test]
fn voltage_alarm_raises_holds_and_recovers() {
    let nvs = seeded_nvs(|cfg| {
        cfg.inputs.push_str("A4").unwrap();
        cfg.set_var(Var::AlarmVoltage, 600);
        cfg.set_var(Var::AlarmRecoveryVoltage, 650);
    });
    let mut plat = MockPlatform::new();
    let mut node = NetSender::init(&mut plat, &nvs);

    // 580 < 600: alarm asserted, relays off, cycle fails early.
    plat.analog.insert(BAT_PIN, 580);
    assert!(!node.run(&mut plat, &nvs));
    assert!(node.context().alarms.alarmed());
    assert_eq!(node.context().error, DeviceError::LowVoltage);
    assert_eq!(plat.relays(), vec![0, 0, 0, 0]);
    assert_eq!(plat.nav_flashes(), 5, "voltage alarm flash code");
    assert_eq!(node.context().vpins.get(X_BAT), Some(580));

    // 620 is above the alarm level but below recovery: still held.
    plat.analog.insert(BAT_PIN, 620);
    assert!(!node.run(&mut plat, &nvs));
    assert!(node.context().alarms.alarmed());
    assert_eq!(plat.relays(), vec![0, 0, 0, 0]);

    // 660 ≥ 650: alarm clears, relays restored, error cleared.
    plat.analog.insert(BAT_PIN, 660);
    assert!(node.run(&mut plat, &nvs));
    assert!(!node.context().alarms.alarmed());
    assert_eq!(node.context().error, DeviceError::None);
    assert_eq!(plat.relays(), vec![1, 0, 0, 0]);
}

#[test]
fn network_failures_trip_temporary_alarm_on_threshold() {
    let nvs = seeded_nvs(|cfg| {
        cfg.inputs.push_str("A4").unwrap();
        cfg.set_var(Var::AlarmNetwork, 3);
        cfg.set_var(Var::AlarmPeriod, 2);
    });
    let mut plat = MockPlatform::new();
    plat.http_fail = true;

    let mut node = NetSender::init(&mut plat, &nvs);
    assert!(!node.run(&mut plat, &nvs));
    assert!(!node.run(&mut plat, &nvs));
    assert_eq!(node.context().alarms.raised_count(), 0);

    assert!(!node.run(&mut plat, &nvs));
    assert_eq!(node.context().alarms.raised_count(), 1);
    assert_eq!(node.context().alarms.network_failures(), 0);
    // Temporary alarm: relays went off and were restored in the same call.
    assert!(!node.context().alarms.alarmed());
    assert_eq!(plat.relays(), vec![1, 0, 0, 0]);
}

#[test]
fn continuous_alarm_auto_restarts_after_timeout() {
    let nvs = seeded_nvs(|cfg| {
        cfg.inputs.push_str("A4").unwrap();
        cfg.set_var(Var::AlarmVoltage, 600);
        cfg.set_var(Var::AlarmRecoveryVoltage, 650);
    });
    let mut plat = MockPlatform::new();
    plat.analog.insert(BAT_PIN, 580);

    let mut node = NetSender::init(&mut plat, &nvs);
    assert!(!node.run(&mut plat, &nvs));
    assert!(node.context().alarms.alarmed());

    // AutoRestart (600 s) later the next cycle restarts the node.
    plat.now = plat.now.wrapping_add(600_000);
    assert!(!node.run(&mut plat, &nvs));
    assert_eq!(plat.restarts, 1);
    assert_eq!(config::load(&nvs).boot_reason, BootReason::Alarm);

    // The next boot sees the reason on the virtual pin bank.
    let reborn = NetSender::init(&mut plat, &nvs);
    assert_eq!(
        reborn.context().vpins.get(X_BOOT_REASON),
        Some(BootReason::Alarm as i32)
    );
}

#[test]
fn simulated_battery_is_one_shot() {
    let mut plat = MockPlatform::new();
    plat.analog.insert(BAT_PIN, 712);
    let mut ctx = Context::new(Config::default());

    // Write the override through the virtual pin.
    let mut x10 = Pin::new("X10").unwrap();
    x10.value = 700;
    ctx.write_pin(&mut plat, &x10);

    let mut bat = Pin::new("A35").unwrap();
    ctx.read_pin(&mut plat, &mut bat);
    assert_eq!(bat.value, 700, "override consumed");
    assert_eq!(ctx.vpins.get(X_BAT), Some(700));

    ctx.read_pin(&mut plat, &mut bat);
    assert_eq!(bat.value, 712, "subsequent reads hit hardware");
}

#[test]
fn deep_sleep_fills_the_monitor_window() {
    let nvs = seeded_nvs(|cfg| {
        cfg.mon_period = 60;
        cfg.act_period = 10;
        cfg.inputs.push_str("A4").unwrap();
    });
    let mut plat = MockPlatform::new();
    let mut node = NetSender::init(&mut plat, &nvs);
    assert!(node.run(&mut plat, &nvs));
    assert_eq!(plat.deep_sleeps, vec![50_000]);
}
