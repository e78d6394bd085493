//! Three-phase network-load / power-telemetry test-execution engine.
//!
//! The crate is organized leaf-first: [`sleep`] and [`rate`] are
//! pure/near-pure primitives; [`meter`], [`transport`], and [`worker`] build
//! the per-interface send path; [`load_generator`] and [`ramp`] compose
//! workers into one load session; [`runner`] drives the Pre → Load → Post
//! phase state machine over all of it; [`events`], [`power`], [`telemetry`],
//! and [`store`] are the boundaries the Runner talks to. [`server`] and
//! [`cli`] are the two external entry points.

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod load_generator;
pub mod meter;
pub mod model;
pub mod power;
pub mod ramp;
pub mod rate;
pub mod runner;
pub mod server;
pub mod sleep;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod worker;

pub use config::{InterfaceConfig, LoadConfig, Protocol, TestConfig};
pub use error::{LoadBenchError, Result};
pub use model::{DataPoint, Event, EventType, Phase, TestResult};
pub use power::{MockPowerSource, PowerSource};
pub use runner::Runner;
pub use store::{RunStore, RunSummary, SqliteRunStore};
pub use telemetry::{BroadcastTelemetrySink, TelemetrySink};
