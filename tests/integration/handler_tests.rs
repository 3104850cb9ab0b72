//! Online handler behavior against the mock platform: URL assembly,
//! redirects, body concatenation, response codes, and mode switching.

use crate::mock_hw::MockPlatform;
use netsender::adapters::nvs::NvsAdapter;
use netsender::app::context::Context;
use netsender::app::ports::NvsPort as _;
use netsender::app::service::NetSender;
use netsender::config::{self, Config, VERSION, Var};
use netsender::handlers::{OnlineHandler, RequestHandler, RequestKind};
use netsender::pins::Pin;

fn context() -> Context {
    let mut cfg = Config {
        version: VERSION,
        mon_period: 60,
        act_period: 60,
        ..Config::default()
    };
    cfg.dkey.push_str("DK1").unwrap();
    Context::new(cfg)
}

fn poll(
    handler: &mut OnlineHandler,
    ctx: &mut Context,
    plat: &mut MockPlatform,
    nvs: &NvsAdapter,
    inputs: &mut [Pin],
) -> netsender::Result<String> {
    let mut outputs: [Pin; 0] = [];
    let mut reconfig = false;
    handler.request(
        ctx,
        plat,
        nvs,
        RequestKind::Poll,
        inputs,
        &mut outputs,
        &mut reconfig,
    )
}

#[test]
fn follows_redirects_to_new_host() {
    let nvs = NvsAdapter::new();
    let mut ctx = context();
    let mut plat = MockPlatform::new();
    plat.push_status(302, Some("http://other.host/poll2?vn=214"));
    plat.push_reply(r#"{"rc":0}"#);

    let mut handler = OnlineHandler::new();
    poll(&mut handler, &mut ctx, &mut plat, &nvs, &mut []).unwrap();

    assert_eq!(plat.requests.len(), 2);
    assert_eq!(plat.requests[1].0, "other.host");
    assert_eq!(plat.requests[1].1, "/poll2?vn=214");
}

#[test]
fn redirect_without_location_is_a_network_error() {
    let nvs = NvsAdapter::new();
    let mut ctx = context();
    let mut plat = MockPlatform::new();
    plat.push_status(301, None);

    let mut handler = OnlineHandler::new();
    let result = poll(&mut handler, &mut ctx, &mut plat, &nvs, &mut []);
    assert!(result.is_err());
}

#[test]
fn negative_inputs_are_skipped_except_the_battery_pin() {
    let nvs = NvsAdapter::new();
    let mut ctx = context();
    let mut plat = MockPlatform::new();
    plat.push_reply(r#"{"rc":0}"#);

    let mut inputs = [
        Pin::new("A4").unwrap(),  // stays -1: omitted
        Pin::new("X10").unwrap(), // stays -1: still sent
        Pin::new("D3").unwrap(),
    ];
    inputs[2].value = 5;

    let mut handler = OnlineHandler::new();
    poll(&mut handler, &mut ctx, &mut plat, &nvs, &mut inputs).unwrap();

    let path = &plat.requests[0].1;
    assert!(!path.contains("A4="));
    assert!(path.contains("&X10=-1"));
    assert!(path.contains("&D3=5"));
}

#[test]
fn binary_payloads_concatenate_into_the_post_body() {
    let nvs = NvsAdapter::new();
    let mut ctx = context();
    let mut plat = MockPlatform::new();
    plat.push_reply(r#"{"rc":0}"#);

    let mut inputs = [Pin::new("B1").unwrap(), Pin::new("T2").unwrap()];
    inputs[0].value = 1;
    inputs[0].data = Some(b"abc".to_vec());
    inputs[1].value = 2;
    inputs[1].data = Some(b"de".to_vec());

    let mut handler = OnlineHandler::new();
    poll(&mut handler, &mut ctx, &mut plat, &nvs, &mut inputs).unwrap();

    let (_, path, body) = &plat.requests[0];
    assert!(path.contains("&B1=1&T2=2"));
    assert_eq!(body, b"abcde");
}

#[test]
fn absent_output_values_reset_local_pins() {
    let nvs = NvsAdapter::new();
    let mut ctx = context();
    let mut plat = MockPlatform::new();
    plat.push_reply(r#"{"D5":1,"rc":0}"#);

    let mut outputs = [Pin::new("D5").unwrap(), Pin::new("D6").unwrap()];
    let mut reconfig = false;
    let mut handler = OnlineHandler::new();
    handler
        .request(
            &mut ctx,
            &mut plat,
            &nvs,
            RequestKind::Act,
            &mut [],
            &mut outputs,
            &mut reconfig,
        )
        .unwrap();

    assert_eq!(outputs[0].value, 1);
    assert_eq!(plat.levels.get(&5), Some(&1));
    assert_eq!(outputs[1].value, -1, "absent output resets to -1");
    assert_eq!(plat.levels.get(&6), None);
}

#[test]
fn reboot_code_restarts_only_when_configured() {
    let nvs = NvsAdapter::new();
    let mut plat = MockPlatform::new();
    let mut handler = OnlineHandler::new();

    let mut ctx = context();
    plat.push_reply(r#"{"rc":2}"#);
    poll(&mut handler, &mut ctx, &mut plat, &nvs, &mut []).unwrap();
    assert_eq!(plat.restarts, 0, "unconfigured node ignores reboot");

    ctx.configured = true;
    plat.push_reply(r#"{"rc":2}"#);
    poll(&mut handler, &mut ctx, &mut plat, &nvs, &mut []).unwrap();
    assert_eq!(plat.restarts, 1);
}

#[test]
fn alarm_code_raises_temporary_alarm_when_armed() {
    let nvs = NvsAdapter::new();
    let mut plat = MockPlatform::new();
    let mut handler = OnlineHandler::new();

    let mut ctx = context();
    ctx.configured = true;
    ctx.config.set_var(Var::AlarmNetwork, 3);
    ctx.config.set_var(Var::AlarmPeriod, 1);
    plat.push_reply(r#"{"rc":5}"#);

    let mut reconfig = false;
    handler
        .request(
            &mut ctx,
            &mut plat,
            &nvs,
            RequestKind::Poll,
            &mut [],
            &mut [],
            &mut reconfig,
        )
        .unwrap();

    assert!(reconfig);
    assert_eq!(ctx.alarms.raised_count(), 1);
    assert_eq!(plat.relays(), vec![1, 0, 0, 0], "restored after the hold");
}

#[test]
fn vars_reply_can_switch_the_node_offline() {
    let nvs = NvsAdapter::new();
    let mut cfg = Config {
        version: VERSION,
        mon_period: 60,
        act_period: 60,
        ..Config::default()
    };
    cfg.dkey.push_str("DK1").unwrap();
    cfg.inputs.push_str("A4").unwrap();
    cfg.set_var(Var::AutoRestart, 600);
    cfg.set_var(Var::PeakVoltage, 845);
    config::save(&nvs, &cfg).unwrap();

    let mut plat = MockPlatform::new();
    plat.push_reply(r#"{"rc":0,"vs":5}"#);
    plat.push_reply(r#"{"id":1,"mode":"Offline","vs":5}"#);

    let mut node = NetSender::init(&mut plat, &nvs);
    assert_eq!(node.handlers().active_name(), "Normal");
    assert!(node.run(&mut plat, &nvs));

    assert_eq!(node.handlers().active_name(), "Offline");
    assert_eq!(node.context().mode.as_str(), "Offline");
    assert_eq!(nvs.read_str("mode").as_deref(), Some("Offline"));
}
