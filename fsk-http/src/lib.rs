mod admission;
mod artifact;
mod config;
mod error;
mod logging;
mod metrics;
mod parser;
mod process;
mod reaper;
mod server;
mod system;

pub use admission::{AdmissionController, AdmissionPermit, Overloaded, RETRY_AFTER_SECONDS};
pub use artifact::{ARTIFACT_PREFIX, ARTIFACT_SUFFIX, TempArtifact, is_artifact_name};
pub use config::{ConfigError, ServiceConfig};
pub use error::GatewayError;
pub use logging::init as init_logging;
pub use metrics::{InFlight, MetricsRegistry, MetricsSnapshot, Operation, SharedMetrics};
pub use parser::{AudioInfo, COMPLETION_MARKER, DecodeResult, parse_decode_output};
pub use process::{ProcessError, ProcessOutput, ProcessRunner};
pub use reaper::{
    ARTIFACT_MAX_AGE, ReapReport, ReaperConfig, reap_once, run_temp_reaper, spawn_temp_reaper,
};
pub use server::{SharedState, build_app};
pub use system::{RESOURCE_LIMIT_PERCENT, SystemSample, is_executable, sample_system};
