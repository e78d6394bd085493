//! End-to-end scenarios S1–S6, exercised against [`MockPowerSource`], an
//! in-memory [`SqliteRunStore`], and a [`BroadcastTelemetrySink`] nobody
//! subscribes to (the authoritative record is always the returned/
//! `last_result` `TestResult`).
//!
//! Phase durations are expressed in multiples of `interval` and kept short
//! to keep the suite fast, while preserving the expected point counts and
//! ramp-step counts.

use std::sync::Arc;
use std::time::Duration;

use loadbench_engine::{
    DataPoint, EventType, InterfaceConfig, LoadConfig, MockPowerSource, Phase, Protocol, Runner,
    SqliteRunStore, TestConfig,
};
use loadbench_engine::telemetry::BroadcastTelemetrySink;

fn new_runner() -> Arc<Runner> {
    Arc::new(Runner::new(
        Arc::new(MockPowerSource::default()),
        Arc::new(BroadcastTelemetrySink::new()),
        Arc::new(SqliteRunStore::in_memory().unwrap()),
    ))
}

fn base_config(interval: Duration) -> TestConfig {
    TestConfig {
        duration: Duration::ZERO,
        interval,
        pre_duration: Duration::ZERO,
        post_duration: Duration::ZERO,
        description: String::new(),
        test_name: "integration".into(),
        device_name: "dut".into(),
        load_enabled: false,
        load_config: None,
    }
}

fn phase_events(points: &[DataPoint]) -> Vec<String> {
    points
        .iter()
        .flat_map(|dp| dp.events.iter())
        .filter(|e| e.event_type == EventType::Phase)
        .map(|e| e.message.clone())
        .collect()
}

/// S1: pre=2, load=4, post=2 (in interval units), load disabled.
#[tokio::test]
async fn s1_smoke_phase_sequence_and_baseline_throughput() {
    let runner = new_runner();
    let interval = Duration::from_millis(150);
    let mut config = base_config(interval);
    config.pre_duration = interval * 2;
    config.duration = interval * 4;
    config.post_duration = interval * 2;

    runner.start_test(config).await.unwrap();
    let result = runner.last_result().expect("run recorded a result");

    assert!(
        result.data_points.len() >= 6 && result.data_points.len() <= 9,
        "got {} points",
        result.data_points.len()
    );

    let phases = phase_events(&result.data_points);
    assert_eq!(phases.len(), 3, "expected exactly one phase event per phase: {phases:?}");
    assert!(phases[0].contains("pre"));
    assert!(phases[1].contains("load"));
    assert!(phases[2].contains("post"));

    for dp in &result.data_points {
        assert_eq!(dp.throughput_total_mbps, 0.0);
        assert!(dp.throughput_by_interface.is_empty());
    }

    // Timestamps are monotonic non-decreasing.
    for pair in result.data_points.windows(2) {
        assert!(pair[1].timestamp >= pair[0].timestamp);
    }
}

/// S2: a single unlimited UDP interface produces nonzero throughput for
/// several consecutive ticks, with its published target pinned at 0.
#[tokio::test]
async fn s2_udp_unlimited_single_interface_measures_throughput() {
    let runner = new_runner();
    let interval = Duration::from_secs(1);
    let mut config = base_config(interval);
    config.duration = interval * 5;
    config.load_enabled = true;
    config.load_config = Some(LoadConfig {
        protocol: Protocol::Udp,
        target_ip: "127.0.0.1".into(),
        target_port: 9,
        target_mac: String::new(),
        packet_size: 1400,
        interface_configs: vec![InterfaceConfig {
            workers: 4,
            ..Default::default()
        }],
    });

    runner.start_test(config).await.unwrap();
    let result = runner.last_result().expect("run recorded a result");

    let load_points: Vec<&DataPoint> = result
        .data_points
        .iter()
        .filter(|dp| dp.phase == Phase::Load)
        .collect();

    let nonzero_runs = load_points
        .iter()
        .filter(|dp| dp.throughput_by_interface.get("default").copied().unwrap_or(0.0) > 0.0)
        .count();
    assert!(nonzero_runs >= 3, "expected >=3 nonzero ticks, got {nonzero_runs}");

    for dp in &load_points {
        assert_eq!(dp.target_by_interface.get("default").copied(), Some(0.0));
    }

    let ramp_events = load_points
        .iter()
        .flat_map(|dp| dp.events.iter())
        .filter(|e| e.event_type == EventType::Ramp)
        .count();
    assert_eq!(ramp_events, 0);
}

/// S3: four ramp steps toward a 400 Mbps target produce events mentioning
/// 100, 200, 300, 400 in that order.
#[tokio::test]
async fn s3_ramp_emits_steps_in_order() {
    let runner = new_runner();
    let interval = Duration::from_secs(1);
    let mut config = base_config(interval);
    config.duration = interval * 6;
    config.load_enabled = true;
    config.load_config = Some(LoadConfig {
        protocol: Protocol::Udp,
        target_ip: "127.0.0.1".into(),
        target_port: 9,
        target_mac: String::new(),
        packet_size: 512,
        interface_configs: vec![InterfaceConfig {
            workers: 2,
            target_throughput_mbps: 400.0,
            ramp_steps: 4,
            ramp_duration: interval * 4,
            ..Default::default()
        }],
    });

    runner.start_test(config).await.unwrap();
    let result = runner.last_result().expect("run recorded a result");

    let all_events: Vec<_> = result.data_points.iter().flat_map(|dp| dp.events.iter()).collect();

    let ramp_events: Vec<_> = all_events
        .iter()
        .filter(|e| e.event_type == EventType::Ramp)
        .collect();
    let ramp_messages: Vec<String> = ramp_events.iter().map(|e| e.message.clone()).collect();

    assert_eq!(ramp_messages.len(), 4, "{ramp_messages:?}");
    for (msg, expected) in ramp_messages.iter().zip(["100", "200", "300", "400"]) {
        assert!(msg.contains(expected), "{msg} did not mention {expected}");
    }
    assert!(ramp_messages.last().unwrap().contains("complete"));

    // The ramp's own pre-delay is zero here, so Load entry and ramp start
    // coincide: the first ramp step must land within one step_duration
    // (its own sleep) plus up to one sampling interval of jitter before the
    // event is observed, never immediately at Load entry.
    let load_entered = all_events
        .iter()
        .find(|e| e.event_type == EventType::Phase && e.message.contains("load"))
        .expect("a phase event marks load entry")
        .timestamp;
    let step_duration = interval; // ramp_duration (4*interval) / ramp_steps (4)
    let first_step_gap = ramp_events[0]
        .timestamp
        .duration_since(load_entered)
        .expect("ramp event follows load entry");
    assert!(
        first_step_gap >= step_duration,
        "first ramp step fired after {first_step_gap:?}, expected >= {step_duration:?}"
    );
    assert!(
        first_step_gap <= step_duration + interval,
        "first ramp step fired after {first_step_gap:?}, expected <= {:?}",
        step_duration + interval
    );
}

/// S4: two interfaces with staggered pre-delays start in the order and
/// relative timing their `preDelay`s dictate.
#[tokio::test]
async fn s4_staggered_interfaces_start_in_order() {
    let runner = new_runner();
    let interval = Duration::from_millis(400);
    let mut config = base_config(interval);
    config.duration = interval * 8;
    config.load_enabled = true;
    config.load_config = Some(LoadConfig {
        protocol: Protocol::Udp,
        target_ip: "127.0.0.1".into(),
        target_port: 9,
        target_mac: String::new(),
        packet_size: 512,
        interface_configs: vec![
            InterfaceConfig {
                name: "lo".into(),
                workers: 1,
                ..Default::default()
            },
            InterfaceConfig {
                name: "s4-staggered-iface".into(),
                workers: 1,
                pre_delay: interval * 3,
                ..Default::default()
            },
        ],
    });

    runner.start_test(config).await.unwrap();
    let result = runner.last_result().expect("run recorded a result");

    let starts: Vec<_> = result
        .data_points
        .iter()
        .flat_map(|dp| dp.events.iter())
        .filter(|e| e.event_type == EventType::IfaceStart)
        .collect();
    assert_eq!(starts.len(), 2, "{:?}", starts.iter().map(|e| &e.message).collect::<Vec<_>>());

    let lo_start = starts.iter().find(|e| e.message.contains("lo")).unwrap();
    let staggered_start = starts
        .iter()
        .find(|e| e.message.contains("s4-staggered-iface"))
        .unwrap();
    assert!(staggered_start.timestamp > lo_start.timestamp);
    let gap = staggered_start
        .timestamp
        .duration_since(lo_start.timestamp)
        .unwrap();
    assert!(gap >= interval * 2, "gap was {gap:?}, expected >= {:?}", interval * 2);
}

/// S5: a marker injected mid-run surfaces on the next emitted `DataPoint`.
#[tokio::test]
async fn s5_marker_appears_in_next_data_point() {
    let runner = new_runner();
    let interval = Duration::from_millis(200);
    let mut config = base_config(interval);
    config.duration = interval * 8;

    let run_handle = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.start_test(config).await })
    };

    tokio::time::sleep(interval * 2).await;
    runner
        .add_marker("checkpoint-7")
        .expect("marker should be accepted while active");

    run_handle.await.unwrap().unwrap();
    let result = runner.last_result().expect("run recorded a result");

    let found = result.data_points.iter().any(|dp| {
        dp.events
            .iter()
            .any(|e| e.event_type == EventType::Custom && e.message == "checkpoint-7")
    });
    assert!(found, "checkpoint-7 marker did not appear in any data point");
}

/// S6: stopping mid-ramp yields a prompt, clean termination with no Post
/// data points and no ramp step past the one active at cancellation.
#[tokio::test]
async fn s6_cancellation_is_prompt_and_skips_post() {
    let runner = new_runner();
    let interval = Duration::from_millis(250);
    let mut config = base_config(interval);
    config.duration = interval * 20;
    config.post_duration = interval * 4;
    config.load_enabled = true;
    config.load_config = Some(LoadConfig {
        protocol: Protocol::Udp,
        target_ip: "127.0.0.1".into(),
        target_port: 9,
        target_mac: String::new(),
        packet_size: 512,
        interface_configs: vec![InterfaceConfig {
            workers: 2,
            target_throughput_mbps: 400.0,
            ramp_steps: 4,
            ramp_duration: interval * 8,
            ..Default::default()
        }],
    });

    let run_handle = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.start_test(config).await })
    };

    tokio::time::sleep(interval * 3).await;
    runner.stop_test();

    let outcome = tokio::time::timeout(Duration::from_secs(5), run_handle).await;
    assert!(outcome.is_ok(), "start_test did not return promptly after stop_test");
    outcome.unwrap().unwrap().unwrap();

    assert!(!runner.is_active());
    let result = runner.last_result().expect("run recorded a partial result");
    assert!(result.data_points.iter().all(|dp| dp.phase != Phase::Post));
}

/// Testable property: a second `start_test` is rejected while one is active,
/// and accepted again once the first has finished.
#[tokio::test]
async fn single_active_run_enforced_across_sequential_starts() {
    let runner = new_runner();
    let interval = Duration::from_millis(100);

    let mut first = base_config(interval);
    first.pre_duration = interval * 2;

    let runner_for_first = runner.clone();
    let first_handle = tokio::spawn(async move { runner_for_first.start_test(first).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(runner.is_active());
    let rejected = runner.start_test(base_config(interval)).await;
    assert!(rejected.is_err());

    first_handle.await.unwrap().unwrap();
    assert!(!runner.is_active());

    let accepted = runner.start_test(base_config(interval)).await;
    assert!(accepted.is_ok());
}
