//! Binary entry point: wires environment-style configuration to a
//! [`loadbench_engine::Runner`] and dispatches to either the `run-mock`
//! smoke harness or the `serve` control surface.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use loadbench_engine::cli::{Cli, Command};
use loadbench_engine::config::{InterfaceConfig, LoadConfig, Protocol, TestConfig};
use loadbench_engine::power::MockPowerSource;
use loadbench_engine::runner::Runner;
use loadbench_engine::server;
use loadbench_engine::store::SqliteRunStore;
use loadbench_engine::telemetry::BroadcastTelemetrySink;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Storage path and listen address are the recognized environment-style
    // inputs. Only `MockPowerSource` ships in this crate; a real hardware
    // adapter is wired in by whoever embeds this engine.
    let store_path = env::var("RUN_STORE_PATH").unwrap_or_else(|_| ":memory:".to_string());
    let store = match SqliteRunStore::open(&store_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("failed to open run store at {store_path:?}: {e}");
            std::process::exit(1);
        }
    };
    let power = Arc::new(MockPowerSource::default());

    match cli.command {
        Command::RunMock {
            pre_secs,
            load_secs,
            post_secs,
            interval_secs,
            load,
            target_ip,
            target_port,
        } => run_mock(
            power,
            store,
            pre_secs,
            load_secs,
            post_secs,
            interval_secs,
            load,
            target_ip,
            target_port,
        )
        .await,
        Command::Serve { listen } => {
            let listen = env::var("LISTEN_ADDR").unwrap_or(listen);
            let telemetry = Arc::new(BroadcastTelemetrySink::new());
            let runner = Arc::new(Runner::new(power, telemetry.clone(), store));
            info!(%listen, "control surface starting");
            if let Err(e) = server::serve(&listen, runner, telemetry).await {
                eprintln!("server error: {e}");
                std::process::exit(1);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_mock(
    power: Arc<MockPowerSource>,
    store: Arc<SqliteRunStore>,
    pre_secs: u64,
    load_secs: u64,
    post_secs: u64,
    interval_secs: u64,
    load: bool,
    target_ip: String,
    target_port: u16,
) {
    let telemetry = Arc::new(BroadcastTelemetrySink::new());
    let runner = Arc::new(Runner::new(power, telemetry, store));

    let config = TestConfig {
        duration: Duration::from_secs(load_secs),
        interval: Duration::from_secs(interval_secs),
        pre_duration: Duration::from_secs(pre_secs),
        post_duration: Duration::from_secs(post_secs),
        description: "local run-mock smoke test".into(),
        test_name: "run-mock".into(),
        device_name: "mock-dut".into(),
        load_enabled: load,
        load_config: if load {
            Some(LoadConfig {
                protocol: Protocol::Udp,
                target_ip,
                target_port,
                target_mac: String::new(),
                packet_size: 1400,
                interface_configs: vec![InterfaceConfig::default()],
            })
        } else {
            None
        },
    };

    info!("starting run-mock");
    if let Err(e) = runner.start_test(config).await {
        eprintln!("run rejected: {e}");
        std::process::exit(1);
    }

    match runner.last_result() {
        Some(result) => {
            let summary = loadbench_engine::store::summarize(&result);
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
            );
        }
        None => println!("run-mock finished with no recorded result"),
    }
}
