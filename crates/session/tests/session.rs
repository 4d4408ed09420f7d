//! End-to-end session tests against the in-process adapter emulator

use obd_protocol::mock::{MockAdapter, MockReply};
use obd_protocol::{Parameter, TransportConfig};
use safety_monitor::{AlarmLevel, ProtectiveAction};
use session::{SessionConfig, SessionError, VehicleSession};
use std::time::Duration;
use telemetry_pipeline::{ConnectionStatus, PipelineState};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);
const FAST: Duration = Duration::from_millis(10);

async fn open(adapter: MockAdapter) -> VehicleSession {
    VehicleSession::open(SessionConfig::default(), Box::new(adapter.spawn()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_samples_flow_and_stop_is_final() {
    let adapter = MockAdapter::new().with_simulator();
    let log = adapter.command_log();
    let mut session = open(adapter).await;
    assert_eq!(session.connection_status(), ConnectionStatus::Connected);
    assert_eq!(session.status_message(), "Connected");

    let mut samples = session.subscribe_samples();
    session
        .start_polling_with(&[Parameter::Rpm, Parameter::Speed], FAST)
        .unwrap();

    let sample = timeout(WAIT, samples.recv()).await.unwrap().unwrap();
    assert!(sample.get(Parameter::Rpm).is_some());
    assert!(sample.get(Parameter::Speed).is_some());
    assert!(matches!(
        session.start_polling(),
        Err(SessionError::Pipeline(_))
    ));

    session.stop_polling().await;
    let writes = log.len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.stop_polling().await;

    assert_eq!(log.len(), writes);
    assert_eq!(session.polling_state(), PipelineState::Stopped);
    assert!(!session.recent_samples().is_empty());
}

#[tokio::test]
async fn test_init_commands_reach_the_adapter() {
    let adapter = MockAdapter::new();
    let log = adapter.command_log();
    let session = open(adapter).await;

    assert_eq!(log.commands(), vec!["ATZ", "ATE0", "ATL0", "ATH1", "ATSP0"]);
    assert!(session.is_open().await);
}

#[tokio::test]
async fn test_rejected_init_closes_the_link() {
    let adapter = MockAdapter::new().reply("ATH1", "?");
    let log = adapter.command_log();
    let result = VehicleSession::open(SessionConfig::default(), Box::new(adapter.spawn())).await;
    assert!(matches!(
        result,
        Err(SessionError::Obd(obd_protocol::ObdError::InitializationFailed { .. }))
    ));

    timeout(WAIT, log.closed()).await.unwrap();
    assert_eq!(log.commands(), vec!["ATZ", "ATE0", "ATL0", "ATH1"]);
}

#[tokio::test]
async fn test_connect_uses_configured_transport() {
    let config = SessionConfig {
        transport: TransportConfig::Mock,
        ..SessionConfig::default()
    };
    let mut session = VehicleSession::connect(config).await.unwrap();
    assert_eq!(session.connection_status(), ConnectionStatus::Connected);
    session.disconnect().await;
}

#[tokio::test]
async fn test_health_report_covers_recent_samples() {
    // Long-term fuel trim of +12.5 %
    let adapter = MockAdapter::new().reply("0107", "41 07 90");
    let mut session = open(adapter).await;
    assert_eq!(session.health_report().samples, 0);

    let mut samples = session.subscribe_samples();
    session
        .start_polling_with(&[Parameter::LongFuelTrim], FAST)
        .unwrap();
    for _ in 0..3 {
        timeout(WAIT, samples.recv()).await.unwrap().unwrap();
    }
    session.stop_polling().await;

    let report = session.health_report();
    assert!(report.samples >= 3);
    assert_eq!(report.fuel_system.score, 85);
    assert_eq!(report.fuel_system.metrics["long_fuel_trim_pct"], 12.5);
    assert!(report.turbo.is_healthy());
}

#[tokio::test]
async fn test_dtcs_read_while_polling() {
    let adapter = MockAdapter::new().with_simulator().with_dtcs(&["0234", "0123"]);
    let mut session = open(adapter).await;
    let mut trace = session.subscribe_raw_trace();
    session.start_polling_with(&[Parameter::Rpm], FAST).unwrap();

    let report = session.read_dtcs().await.unwrap();
    let critical: Vec<String> = report.critical.iter().map(|c| c.to_string()).collect();
    let other: Vec<String> = report.other.iter().map(|c| c.to_string()).collect();
    assert_eq!(critical, vec!["P0234"]);
    assert_eq!(other, vec!["P0123"]);

    session.clear_dtcs().await.unwrap();
    let report = session.read_dtcs().await.unwrap();
    assert!(report.critical.is_empty() && report.other.is_empty());

    session.stop_polling().await;

    let mut saw_dtc_read = false;
    loop {
        match trace.try_recv() {
            Ok(line) => saw_dtc_read |= line.command == "03",
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    assert!(saw_dtc_read);
}

#[tokio::test]
async fn test_unacknowledged_clear() {
    let adapter = MockAdapter::new().reply("04", "NO DATA");
    let session = open(adapter).await;
    assert!(matches!(
        session.clear_dtcs().await,
        Err(SessionError::ClearRejected(_))
    ));
}

#[tokio::test]
async fn test_overboost_is_reported_once() {
    // 255 kPa absolute is about 22.3 PSI of boost
    let adapter = MockAdapter::new().reply("010B", "41 0B FF");
    let mut session = open(adapter).await;
    let mut samples = session.subscribe_samples();
    let mut events = session.subscribe_safety_events();
    let mut actions = session.subscribe_protective_actions();

    session
        .start_polling_with(&[Parameter::IntakePressure], FAST)
        .unwrap();
    for _ in 0..5 {
        timeout(WAIT, samples.recv()).await.unwrap().unwrap();
    }
    session.stop_polling().await;

    let event = events.try_recv().unwrap();
    assert_eq!(event.parameter, Parameter::BoostPressure);
    assert_eq!(event.level, AlarmLevel::Critical);
    assert_eq!(event.previous_level, AlarmLevel::Normal);
    assert_eq!(event.event, "overboost");
    assert!(events.try_recv().is_err());

    let action = actions.try_recv().unwrap();
    assert_eq!(action.action, ProtectiveAction::ReduceBoost);
    assert!(actions.try_recv().is_err());

    session.report_action_outcome(&action, true, "boost target lowered");
}

#[tokio::test]
async fn test_hangup_fails_the_session() {
    let adapter = MockAdapter::new().behave("010C", MockReply::Hangup);
    let mut session = open(adapter).await;
    let mut status = session.subscribe_status();
    session.start_polling_with(&[Parameter::Rpm], FAST).unwrap();

    timeout(WAIT, status.wait_for(|s| matches!(s, ConnectionStatus::Failed(_))))
        .await
        .unwrap()
        .unwrap();
    assert!(session.status_message().starts_with("Connection failed"));

    session.stop_polling().await;
    assert_eq!(session.polling_state(), PipelineState::Stopped);
}

#[tokio::test]
async fn test_disconnect_closes_the_channel() {
    let mut session = open(MockAdapter::new().with_simulator()).await;
    session.start_polling_with(&[Parameter::Rpm], FAST).unwrap();
    session.disconnect().await;

    assert_eq!(session.connection_status(), ConnectionStatus::Disconnected);
    assert!(!session.is_open().await);
    assert!(matches!(
        session.read_dtcs().await,
        Err(SessionError::Obd(obd_protocol::ObdError::NotConnected))
    ));
}
