//! Telemetry agent for the Kron Mult-K power meter
//!
//! Polls the meter's register catalog over Modbus RTU, uploads each
//! cycle's samples to the collector as JSON, and serves the local
//! provisioning/diagnostics API used for first-time network setup.

pub mod acquisition;
pub mod api;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod uploader;

pub use acquisition::{AcquisitionEngine, Sample, SampleSet};
pub use clock::DeviceClock;
pub use config::AgentConfig;
pub use connectivity::{
    AccessPointProfile, ConnectivityManager, Credentials, LinkDriver, LinkState,
    NetworkManagerLink, StationPolicy,
};
pub use context::AgentContext;
pub use error::{AgentError, Result};
pub use scheduler::{CycleAttempt, CycleOutcome, CycleRunner, CycleService, UploadScheduler};
pub use store::CredentialStore;
pub use telemetry::build_payload;
pub use uploader::{HttpUploader, Uploader};
