//! Offline handler tests: data file layout, rollover re-anchoring, act
//! no-ops, and storage failure reporting.

use crate::mock_hw::MockPlatform;
use netsender::adapters::nvs::NvsAdapter;
use netsender::app::context::DeviceError;
use netsender::app::ports::NvsPort as _;
use netsender::app::service::NetSender;
use netsender::config::{self, Config, VERSION, Var};
use netsender::handlers::offline::{FORMAT_VERSION, TIME_MARKER, VERSION_MARKER};
use netsender::timing::ROLLOVER_SECS;

fn offline_nvs(customize: impl FnOnce(&mut Config)) -> NvsAdapter {
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
    nvs.write_str("mode", "Offline").unwrap();
    nvs
}

fn records(bytes: &[u8]) -> Vec<(i64, u64)> {
    bytes
        .chunks_exact(16)
        .map(|chunk| {
            (
                i64::from_le_bytes(chunk[..8].try_into().unwrap()),
                u64::from_le_bytes(chunk[8..].try_into().unwrap()),
            )
        })
        .collect()
}

#[test]
fn poll_creates_header_and_reanchors_after_rollover() {
    let nvs = offline_nvs(|cfg| {
        cfg.inputs.push_str("A4").unwrap();
    });
    let mut plat = MockPlatform::new();
    plat.analog.insert(4, 42);
    // Start close enough to the counter wrap that one 60 s cycle crosses it.
    plat.now = u32::MAX - 50_000;
    // First-cycle heartbeat fetches vars; the reply carries the epoch.
    plat.push_reply(r#"{"id":1,"ts":1722500000,"vs":7}"#);

    let mut node = NetSender::init(&mut plat, &nvs);
    assert!(node.run(&mut plat, &nvs));

    let recs = records(&plat.files["/NSD/A4"]);
    assert_eq!(recs.len(), 3);
    assert_eq!(recs[0], (VERSION_MARKER, FORMAT_VERSION));
    assert_eq!(recs[1].0, TIME_MARKER);
    let anchor = recs[1].1;
    assert!(anchor > 0, "heartbeat established the time reference");
    assert_eq!(recs[2].0, 42);
    // reference + uptime lands on the epoch the service reported.
    assert!(recs[2].1 >= 1_722_500_000 && recs[2].1 < 1_722_500_100);

    // The pause crossed the 32-bit wrap; the next batch re-anchors.
    assert!(plat.now < 1_000_000, "counter wrapped during the pause");
    assert!(node.run(&mut plat, &nvs));

    let recs = records(&plat.files["/NSD/A4"]);
    assert_eq!(recs.len(), 5);
    assert_eq!(recs[3].0, TIME_MARKER);
    assert_eq!(recs[3].1, anchor + ROLLOVER_SECS);
    assert_eq!(recs[4].0, 42);
    assert!(
        recs[4].1 >= recs[2].1,
        "timestamps stay monotonic across the wrap"
    );
}

#[test]
fn negative_inputs_are_not_persisted() {
    let nvs = offline_nvs(|cfg| {
        cfg.inputs.push_str("A4,D3").unwrap();
    });
    let mut plat = MockPlatform::new();
    plat.analog.insert(4, -1);
    plat.digital_in.insert(3, 1);

    let mut node = NetSender::init(&mut plat, &nvs);
    assert!(node.run(&mut plat, &nvs));

    assert!(!plat.files.contains_key("/NSD/A4"));
    assert!(plat.files.contains_key("/NSD/D3"));
}

#[test]
fn act_requests_are_noops_offline() {
    let nvs = offline_nvs(|cfg| {
        cfg.outputs.push_str("D5").unwrap();
    });
    let mut plat = MockPlatform::new();

    let mut node = NetSender::init(&mut plat, &nvs);
    assert!(node.run(&mut plat, &nvs));

    // Only the heartbeat vars fetch touched the network.
    assert!(plat.request_paths().iter().all(|p| p.starts_with("/vars")));
    assert_eq!(plat.levels.get(&5), None, "no output was commanded");
}

#[test]
fn append_failure_reports_sd_card_error() {
    let nvs = offline_nvs(|cfg| {
        cfg.inputs.push_str("A4").unwrap();
    });
    let mut plat = MockPlatform::new();
    plat.analog.insert(4, 7);
    plat.fail_appends = true;

    let mut node = NetSender::init(&mut plat, &nvs);
    assert!(!node.run(&mut plat, &nvs), "storage failure fails the cycle");
    assert_eq!(node.context().error, DeviceError::SdCardFailure);
}
