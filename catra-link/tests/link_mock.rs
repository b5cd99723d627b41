//! Integration tests driving a real link worker over mock transports.

use catra_link::config::Config;
use catra_link::core::types::{
    ChannelId, ConnectionState, ControlEvent, Endpoint, SampleValue, Target,
};
use catra_link::link::{Link, LinkEvent, Transition};
use catra_link::store::SampleStore;
use catra_link::transport::{MockConnector, MockTransport, PortInfo, StaticScanner};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DEADLINE: Duration = Duration::from_secs(5);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.timing.poll_interval_ms = 10;
    config.timing.stale_timeout_ms = 150;
    config.timing.reconnect_backoff_ms = 20;
    config.timing.connect_timeout_ms = 100;
    config
}

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + DEADLINE;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

fn wait_state(link: &Link, state: ConnectionState) {
    wait_for(&format!("state {}", state), || link.state() == state);
}

/// Collect state transitions until `to` is reached
fn transitions_until(events: &Receiver<LinkEvent>, to: ConnectionState) -> Vec<Transition> {
    let deadline = Instant::now() + DEADLINE;
    let mut seen = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(LinkEvent::StateChanged(t)) => {
                seen.push(t);
                if t.to == to {
                    return seen;
                }
            }
            Ok(_) => {}
            Err(_) => panic!("never reached {} (saw {:?})", to, seen),
        }
    }
}

fn tcp_target() -> Target {
    Target::Endpoint(Endpoint::Tcp {
        addr: "192.168.137.97:8888".to_string(),
    })
}

fn streaming_link(config: &Config) -> (Link, MockTransport, MockConnector) {
    init_logging();
    let store = Arc::new(SampleStore::new(&config.buffers));
    let transport = MockTransport::new();
    let connector = MockConnector::new();
    connector.accept(&transport);

    let link = Link::spawn(config, store, connector.clone(), StaticScanner::default()).unwrap();
    link.request_connect(tcp_target()).unwrap();
    wait_state(&link, ConnectionState::Streaming);
    (link, transport, connector)
}

#[test]
fn test_lidar_frame_reaches_store() {
    let (link, transport, _) = streaming_link(&fast_config());

    transport.inject_read(b"LIDAR_DATA_TCP:X:12.5,Y:-3.0\n");
    wait_for("position", || !link.positions().is_empty());

    assert_eq!(link.positions(), vec![(12.5, -3.0)]);
    let snapshot = link.snapshot(ChannelId::Position);
    assert_eq!(snapshot[0].value, SampleValue::Point { x: 12.5, y: -3.0 });
}

#[test]
fn test_records_split_across_reads() {
    let (link, transport, _) = streaming_link(&fast_config());

    let chunks: [&[u8]; 5] = [
        b"LIDAR COORD: X=1",
        b"20.0 Y=-4",
        b".5 Temp: 2",
        b"2.1\nHum:",
        b"48\n",
    ];
    for chunk in chunks {
        transport.inject_read(chunk);
        thread::sleep(Duration::from_millis(15));
    }
    wait_for("humidity", || !link.snapshot(ChannelId::Humidity).is_empty());

    assert_eq!(link.positions(), vec![(120.0, -4.5)]);
    assert_eq!(link.store().values(ChannelId::Temperature), vec![22.1]);
    assert_eq!(link.store().values(ChannelId::Humidity), vec![48.0]);
}

#[test]
fn test_map_complete_forwarded_without_store_mutation() {
    let (link, transport, _) = streaming_link(&fast_config());
    let controls = link.controls();

    transport.inject_read(b"MAP_COMPLETE room_a\n");

    let event = controls.recv_timeout(DEADLINE).expect("no control event");
    assert_eq!(event, ControlEvent::MapComplete("room_a".to_string()));

    for channel in ChannelId::ALL {
        assert!(link.store().is_empty(channel), "{} was mutated", channel);
    }
    assert_eq!(link.stats().records, 1);
}

#[test]
fn test_staleness_flips_and_recovers() {
    let (link, transport, _) = streaming_link(&fast_config());

    transport.inject_read(b"Temp: 20\n");
    wait_for("first sample", || !link.snapshot(ChannelId::Temperature).is_empty());

    wait_state(&link, ConnectionState::Stale);
    assert!(link.is_stale());
    // Staleness keeps buffered data
    assert_eq!(link.store().values(ChannelId::Temperature), vec![20.0]);

    transport.inject_read(b"Temp: 21\n");
    wait_state(&link, ConnectionState::Streaming);
    assert!(!link.is_stale());
    assert_eq!(link.store().values(ChannelId::Temperature), vec![20.0, 21.0]);
}

#[test]
fn test_unrecognized_record_still_counts_as_alive() {
    let (link, transport, _) = streaming_link(&fast_config());
    wait_state(&link, ConnectionState::Stale);

    transport.inject_read(b"BOOT v1.2 ready\n");
    wait_state(&link, ConnectionState::Streaming);
    assert_eq!(link.stats().unrecognized, 1);
    for channel in ChannelId::ALL {
        assert!(link.store().is_empty(channel));
    }
}

#[test]
fn test_partial_bytes_do_not_count_as_alive() {
    let (link, transport, _) = streaming_link(&fast_config());
    wait_state(&link, ConnectionState::Stale);

    transport.inject_read(b"Temp: 2");
    thread::sleep(Duration::from_millis(60));
    assert_eq!(link.state(), ConnectionState::Stale);

    transport.inject_read(b"3\n");
    wait_state(&link, ConnectionState::Streaming);
    assert_eq!(link.store().values(ChannelId::Temperature), vec![23.0]);
}

#[test]
fn test_reconnects_after_transport_loss() {
    init_logging();
    let config = fast_config();
    let store = Arc::new(SampleStore::new(&config.buffers));
    let first = MockTransport::new();
    let second = MockTransport::new();
    let connector = MockConnector::new();
    connector.accept(&first).accept(&second);

    let link = Link::spawn(&config, store, connector.clone(), StaticScanner::default()).unwrap();
    let events = link.events();
    link.request_connect(tcp_target()).unwrap();
    transitions_until(&events, ConnectionState::Streaming);

    first.inject_read(b"RAW: 1\n");
    wait_for("first raw", || link.store().len(ChannelId::Raw) == 1);
    first.close();

    let seen = transitions_until(&events, ConnectionState::Streaming);
    let states: Vec<_> = seen.iter().map(|t| t.to).collect();
    assert_eq!(
        states,
        vec![
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Streaming,
        ]
    );

    second.inject_read(b"RAW: 2\n");
    wait_for("second raw", || link.store().len(ChannelId::Raw) == 2);
    assert_eq!(link.store().values(ChannelId::Raw), vec![1.0, 2.0]);
    assert_eq!(connector.attempts().len(), 2);
}

#[test]
fn test_reconnect_attempts_are_bounded() {
    init_logging();
    let mut config = fast_config();
    config.timing.max_reconnect_attempts = 2;
    let store = Arc::new(SampleStore::new(&config.buffers));
    let transport = MockTransport::new();
    let connector = MockConnector::new();
    connector.accept(&transport).refuse().refuse();

    let link = Link::spawn(&config, store, connector.clone(), StaticScanner::default()).unwrap();
    let events = link.events();
    link.request_connect(tcp_target()).unwrap();
    transitions_until(&events, ConnectionState::Streaming);

    transport.close();
    let seen = transitions_until(&events, ConnectionState::Failed);
    let states: Vec<_> = seen.iter().map(|t| t.to).collect();
    assert_eq!(
        states,
        vec![
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Failed,
        ]
    );
    assert_eq!(connector.attempts().len(), 3);
}

#[test]
fn test_first_connect_failure_is_terminal() {
    init_logging();
    let config = fast_config();
    let store = Arc::new(SampleStore::new(&config.buffers));
    let connector = MockConnector::new();
    connector.refuse();

    let link = Link::spawn(&config, store, connector.clone(), StaticScanner::default()).unwrap();
    link.request_connect(tcp_target()).unwrap();
    wait_state(&link, ConnectionState::Failed);

    thread::sleep(Duration::from_millis(100));
    assert_eq!(link.state(), ConnectionState::Failed);
    assert_eq!(connector.attempts().len(), 1);
}

#[test]
fn test_discovery_picks_keyword_port() {
    init_logging();
    let config = fast_config();
    let store = Arc::new(SampleStore::new(&config.buffers));
    let transport = MockTransport::new();
    let connector = MockConnector::new();
    connector.accept(&transport);
    let scanner = StaticScanner(vec![
        PortInfo {
            name: "/dev/ttyS0".to_string(),
            description: String::new(),
            hwid: String::new(),
        },
        PortInfo {
            name: "/dev/ttyUSB0".to_string(),
            description: "QinHeng Electronics USB Serial CH340".to_string(),
            hwid: "USB VID:PID=1A86:7523".to_string(),
        },
    ]);

    let link = Link::spawn(&config, store, connector.clone(), scanner).unwrap();
    link.request_connect(Target::Auto).unwrap();
    wait_state(&link, ConnectionState::Streaming);

    assert_eq!(
        connector.attempts(),
        vec![Endpoint::Serial {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
        }]
    );
}

#[test]
fn test_discovery_uses_fallback() {
    init_logging();
    let config = fast_config();
    let store = Arc::new(SampleStore::new(&config.buffers));
    let connector = MockConnector::new();
    connector.refuse();

    let link = Link::spawn(&config, store, connector.clone(), StaticScanner::default()).unwrap();
    link.request_connect(Target::Auto).unwrap();
    wait_state(&link, ConnectionState::Failed);

    assert_eq!(
        connector.attempts(),
        vec![Endpoint::Serial {
            path: "COM3".to_string(),
            baud_rate: 9600,
        }]
    );
}

#[test]
fn test_discovery_without_fallback_fails() {
    init_logging();
    let mut config = fast_config();
    config.link.fallback_endpoint = Some(String::new());
    let store = Arc::new(SampleStore::new(&config.buffers));
    let connector = MockConnector::new();

    let link = Link::spawn(&config, store, connector.clone(), StaticScanner::default()).unwrap();
    let events = link.events();
    link.request_connect(Target::Auto).unwrap();

    let seen = transitions_until(&events, ConnectionState::Failed);
    assert_eq!(
        seen.last(),
        Some(&Transition {
            from: ConnectionState::Discovering,
            to: ConnectionState::Failed,
        })
    );
    assert!(connector.attempts().is_empty());
}

#[test]
fn test_request_disconnect_goes_idle_and_stops_reading() {
    let (link, transport, _) = streaming_link(&fast_config());

    link.request_disconnect().unwrap();
    wait_state(&link, ConnectionState::Idle);

    transport.inject_read(b"Temp: 30\n");
    thread::sleep(Duration::from_millis(60));
    assert!(link.store().is_empty(ChannelId::Temperature));
    assert_eq!(transport.pending(), 9);
}

#[test]
fn test_reconnect_request_from_failed() {
    init_logging();
    let config = fast_config();
    let store = Arc::new(SampleStore::new(&config.buffers));
    let transport = MockTransport::new();
    let connector = MockConnector::new();
    connector.refuse().accept(&transport);

    let link = Link::spawn(&config, store, connector, StaticScanner::default()).unwrap();
    link.request_connect(tcp_target()).unwrap();
    wait_state(&link, ConnectionState::Failed);

    link.request_connect(tcp_target()).unwrap();
    wait_state(&link, ConnectionState::Streaming);
}

#[test]
fn test_shutdown_keeps_committed_samples() {
    let (mut link, transport, _) = streaming_link(&fast_config());
    transport.inject_read(b"Pres: 1013.25\n");
    wait_for("pressure", || !link.snapshot(ChannelId::Pressure).is_empty());

    let store = Arc::clone(link.store());
    link.shutdown().unwrap();

    assert_eq!(link.state(), ConnectionState::Idle);
    assert_eq!(store.values(ChannelId::Pressure), vec![1013.25]);
}

#[test]
fn test_clear_then_append() {
    let (link, transport, _) = streaming_link(&fast_config());
    transport.inject_read(b"LIDAR_DATA_TCP:X:5,Y:6\n");
    wait_for("first point", || link.positions().len() == 1);

    link.clear(ChannelId::Position);
    assert!(link.positions().is_empty());

    transport.inject_read(b"LIDAR_DATA_TCP:X:1.0,Y:1.0\n");
    wait_for("second point", || link.positions().len() == 1);
    assert_eq!(link.positions(), vec![(1.0, 1.0)]);
}
