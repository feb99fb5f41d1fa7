//! End-to-end tests of the receiver system against mockito receivers

use std::sync::Arc;
use std::time::Duration;

use avr_api::{
    ApiConfig, CommandCategory, CommandOptions, DeviceConfig, ProtocolMode, RequestPlan,
    StaticProbe, Zone,
};
use avr_daemon::{DaemonError, DaemonRequest, DaemonTransport, DeviceAction, RecordingTransport};
use avr_sdk::{
    AvrSystem, CommandDispatcher, DeviceId, DispatchOutcome, PollScheduler, SchedulerConfig,
    SdkError, SendResult, SystemConfig,
};
use avr_state::{DeviceStateCache, RefreshOutcome, Refresher, StateField};
use mockito::{Matcher, Server, ServerGuard};

const STATUS: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<item>
  <ZonePower><value>ON</value></ZonePower>
  <InputFuncSelect><value>TUNER</value></InputFuncSelect>
  <MasterVolume><value>-42.5</value></MasterVolume>
  <Mute><value>off</value></Mute>
  <selectSurround><value>STEREO</value></selectSurround>
  <ModelId><value>3</value></ModelId>
</item>"#;

const HEOS_LIGHT: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<item>
  <Power><value>ON</value></Power>
  <InputFuncSelect><value>TUNER</value></InputFuncSelect>
  <MasterVolume><value>-40.0</value></MasterVolume>
  <Mute><value>off</value></Mute>
</item>"#;

/// Daemon socket that takes registrations but drops every command
#[derive(Default)]
struct RegistrationsOnly {
    sent: std::sync::Mutex<Vec<DaemonRequest>>,
}

impl DaemonTransport for RegistrationsOnly {
    fn send(&self, request: &DaemonRequest) -> avr_daemon::Result<()> {
        match request {
            DaemonRequest::Register { .. } => {
                self.sent.lock().unwrap().push(request.clone());
                Ok(())
            }
            _ => Err(DaemonError::Unreachable {
                addr: "127.0.0.1:55010".into(),
                reason: "connection refused".into(),
            }),
        }
    }
}

fn daemon_heos(zone: Zone) -> DeviceConfig {
    DeviceConfig::new("127.0.0.1")
        .with_mode(ProtocolMode::Heos)
        .with_zone(zone)
        .with_serial("BBW123")
        .with_daemon(true)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn port_of(server: &ServerGuard) -> u16 {
    server
        .host_with_port()
        .rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap()
}

fn config_for(server: &ServerGuard) -> SystemConfig {
    SystemConfig {
        api: ApiConfig {
            standard_port: port_of(server),
            heos_port: port_of(server),
            ..Default::default()
        },
        scheduler: SchedulerConfig {
            poll_interval_secs: 3600,
            settle_delay_ms: 10,
        },
        ..Default::default()
    }
}

async fn status_mock(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("GET", "/goform/formMainZone_MainZoneXml.xml")
        .with_body(STATUS)
        .expect_at_least(1)
        .create_async()
        .await
}

async fn standard_system(server: &ServerGuard, live: bool) -> (AvrSystem, DeviceId) {
    init_tracing();
    let system = AvrSystem::with_parts(config_for(server), Arc::new(StaticProbe(live)), None);
    let id = DeviceId::from("living-room");
    system
        .add_device(id.clone(), DeviceConfig::new("127.0.0.1"))
        .await
        .unwrap();
    (system, id)
}

#[tokio::test]
async fn test_command_is_sent_then_refreshed() {
    let mut server = Server::new_async().await;
    let status = status_mock(&mut server).await;
    let command = server
        .mock("GET", "/MainZone/index.put.asp")
        .match_query(Matcher::UrlEncoded("cmd0".into(), "PutZone_OnOff/ON".into()))
        .expect(1)
        .create_async()
        .await;

    let (system, id) = standard_system(&server, true).await;
    let outcome = system
        .execute(&id, "on", CommandCategory::Power, &CommandOptions::default())
        .await
        .unwrap();

    command.assert_async().await;
    status.assert_async().await;
    match outcome {
        DispatchOutcome::Direct {
            send: SendResult::Sent(RequestPlan::Get(_)),
            refresh: RefreshOutcome::Updated(fields),
        } => assert!(fields.contains(&StateField::Power)),
        other => panic!("unexpected outcome {:?}", other),
    }

    let state = system.state(&id).unwrap();
    assert_eq!(state.power, Some(true));
    assert_eq!(state.volume, Some(-42.5));
    assert_eq!(state.input.as_deref(), Some("Tuner"));
}

#[tokio::test]
async fn test_refresh_sends_no_command() {
    let mut server = Server::new_async().await;
    let _status = status_mock(&mut server).await;
    let command = server
        .mock("GET", "/MainZone/index.put.asp")
        .expect(0)
        .create_async()
        .await;

    let (system, id) = standard_system(&server, true).await;
    let outcome = system
        .execute(&id, "refresh", CommandCategory::Other, &CommandOptions::default())
        .await
        .unwrap();

    command.assert_async().await;
    assert!(matches!(outcome, DispatchOutcome::Refreshed(RefreshOutcome::Updated(_))));
}

#[tokio::test]
async fn test_offline_device_gets_sentinel() {
    let mut server = Server::new_async().await;
    let _status = server
        .mock("GET", "/goform/formMainZone_MainZoneXml.xml")
        .with_body(STATUS)
        .create_async()
        .await;
    let command = server
        .mock("GET", "/MainZone/index.put.asp")
        .expect(0)
        .create_async()
        .await;

    let (system, id) = standard_system(&server, false).await;
    let outcome = system
        .execute(&id, "volume_set", CommandCategory::Volume, &CommandOptions::slider(-20.0))
        .await
        .unwrap();

    command.assert_async().await;
    assert_eq!(
        outcome,
        DispatchOutcome::Direct {
            send: SendResult::DeviceOffline,
            refresh: RefreshOutcome::Offline,
        }
    );
    let state = system.state(&id).unwrap();
    assert_eq!(state.power, Some(false));
    assert_eq!(state.volume, Some(-99.0));
    assert_eq!(state.input.as_deref(), Some(""));
    assert_eq!(state.sound_mode.as_deref(), Some(""));
}

#[tokio::test]
async fn test_descriptors_include_catalog_inputs() {
    let mut server = Server::new_async().await;
    let _status = status_mock(&mut server).await;

    let (system, id) = standard_system(&server, true).await;
    let descriptors = system.descriptors(&id).unwrap();

    assert!(descriptors.iter().any(|d| d.logical_id == "volume_set"));
    assert!(descriptors
        .iter()
        .any(|d| d.category == CommandCategory::Input && d.logical_id == "TUNER"));
}

#[tokio::test]
async fn test_errors_surface() {
    let mut server = Server::new_async().await;
    let _status = status_mock(&mut server).await;
    let (system, id) = standard_system(&server, true).await;

    let missing = system
        .execute(&DeviceId::from("ghost"), "on", CommandCategory::Power, &CommandOptions::default())
        .await;
    assert!(matches!(missing, Err(SdkError::DeviceNotFound(_))));

    let invalid = system
        .execute(&id, "volume_set", CommandCategory::Volume, &CommandOptions::default())
        .await;
    assert!(matches!(invalid, Err(SdkError::ApiError(_))));

    let duplicate = system.add_device(id.clone(), DeviceConfig::new("127.0.0.1")).await;
    assert!(matches!(duplicate, Err(SdkError::DuplicateDevice(_))));
}

#[tokio::test]
async fn test_daemon_served_device() {
    let mut server = Server::new_async().await;
    let _any = server
        .mock("POST", Matcher::Any)
        .with_body("Error 403: Forbidden")
        .create_async()
        .await;

    init_tracing();
    let transport = Arc::new(RecordingTransport::new());
    let system = AvrSystem::with_parts(
        config_for(&server),
        Arc::new(StaticProbe(true)),
        Some(transport.clone()),
    );
    let id = DeviceId::from("cinema");
    let config = DeviceConfig::new("127.0.0.1")
        .with_mode(ProtocolMode::Heos)
        .with_serial("BBW123")
        .with_daemon(true);
    system.add_device(id.clone(), config).await.unwrap();

    assert_eq!(
        transport.sent().first(),
        Some(&DaemonRequest::Register {
            serial: "bbw123".into(),
            ip: "127.0.0.1".into(),
            name: "Device #bbw123".into(),
        })
    );

    let outcome = system
        .execute(&id, "mute_on", CommandCategory::Volume, &CommandOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Forwarded(DeviceAction::MuteVolume));

    let summary = system.poll_now().await;
    assert_eq!(summary.skipped, 1);

    system
        .handle_callback(r#"{"devices":{"bbw123":{"1":{"MV":{"value":55,"cmdLabel":"Volume"}}}}}"#)
        .unwrap();
    assert_eq!(system.state(&id).unwrap().volume, Some(-25.0));
}

#[tokio::test]
async fn test_scheduler_polls_and_stops() {
    let mut server = Server::new_async().await;
    let status = status_mock(&mut server).await;
    let (system, id) = standard_system(&server, true).await;

    let summary = system.poll_now().await;
    assert_eq!(summary.updated, 1);
    assert_eq!(system.state(&id).unwrap().sound_mode.as_deref(), Some("STEREO"));

    let cache = DeviceStateCache::new();
    cache.insert_device(id.clone());
    let dispatcher = CommandDispatcher::new(
        Arc::clone(system.registry()),
        Refresher::new(cache.clone(), Arc::new(StaticProbe(true))),
        Duration::from_millis(10),
    );
    let scheduler = Arc::new(PollScheduler::new(
        Arc::clone(system.registry()),
        Arc::new(dispatcher),
        Duration::from_secs(3600),
    ));
    let handle = scheduler.start();
    assert!(scheduler.is_running());

    tokio::time::timeout(Duration::from_secs(5), async {
        while cache.get(&id).and_then(|state| state.power).is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first poll round did not run");

    scheduler.stop();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
    assert!(!scheduler.is_running());
    status.assert_async().await;
}

#[tokio::test]
async fn test_unmapped_daemon_command_goes_direct() {
    let mut server = Server::new_async().await;
    let _app = server
        .mock("POST", Matcher::Any)
        .with_body("Error 403: Forbidden")
        .create_async()
        .await;
    let light = server
        .mock("GET", "/goform/formZone2_Zone2XmlStatusLite.xml")
        .with_body(HEOS_LIGHT)
        .expect(1)
        .create_async()
        .await;
    let preset = server
        .mock("GET", "/goform/formiPhoneAppDirect.xml")
        .match_query(Matcher::Exact("TPAN05".into()))
        .expect(1)
        .create_async()
        .await;

    init_tracing();
    let transport = Arc::new(RecordingTransport::new());
    let system = AvrSystem::with_parts(
        config_for(&server),
        Arc::new(StaticProbe(true)),
        Some(transport.clone()),
    );
    let id = DeviceId::from("zone2");
    system.add_device(id.clone(), daemon_heos(Zone::Zone2)).await.unwrap();

    let outcome = system
        .execute(&id, "tuner_preset", CommandCategory::Tuner, &CommandOptions::slider(5.0))
        .await
        .unwrap();

    preset.assert_async().await;
    light.assert_async().await;
    match outcome {
        DispatchOutcome::Direct {
            send: SendResult::Sent(RequestPlan::Get(path)),
            refresh: RefreshOutcome::Updated(_),
        } => assert!(path.ends_with("?TPAN05")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(transport.sent().len(), 1, "only the registration reaches the daemon");
    assert_eq!(system.state(&id).unwrap().power, Some(true));
}

#[tokio::test]
async fn test_unreachable_daemon_falls_back_to_direct_send() {
    let mut server = Server::new_async().await;
    let _app = server
        .mock("POST", Matcher::Any)
        .with_body("Error 403: Forbidden")
        .create_async()
        .await;
    let light = server
        .mock("GET", "/goform/formMainZone_MainZoneXmlStatusLite.xml")
        .with_body(HEOS_LIGHT)
        .expect(1)
        .create_async()
        .await;
    let power = server
        .mock("GET", "/goform/formiPhoneAppDirect.xml")
        .match_query(Matcher::Exact("ZMON".into()))
        .expect(1)
        .create_async()
        .await;

    init_tracing();
    let transport = Arc::new(RegistrationsOnly::default());
    let system = AvrSystem::with_parts(
        config_for(&server),
        Arc::new(StaticProbe(true)),
        Some(transport.clone()),
    );
    let id = DeviceId::from("cinema");
    system.add_device(id.clone(), daemon_heos(Zone::Main)).await.unwrap();
    assert_eq!(transport.sent.lock().unwrap().len(), 1);

    let outcome = system
        .execute(&id, "on", CommandCategory::Power, &CommandOptions::default())
        .await
        .unwrap();

    power.assert_async().await;
    light.assert_async().await;
    assert!(matches!(
        outcome,
        DispatchOutcome::Direct {
            send: SendResult::Sent(RequestPlan::Get(_)),
            refresh: RefreshOutcome::Updated(_),
        }
    ));
    assert_eq!(system.state(&id).unwrap().power, Some(true));
}
