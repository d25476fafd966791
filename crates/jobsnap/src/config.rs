//! Static configuration for a watch session.

use std::path::PathBuf;
use std::time::Duration;

/// In-container directories harvested from a job's first init container.
pub const DEFAULT_TARGET_DIRS: &[&str] = &["/tmp/trivy-vex", "/tmp/trivy-1"];

/// Suffix inserted before the file extension of every init-container
/// artifact, so harvested files cannot collide with same-named captures.
pub const INIT_ARTIFACT_SUFFIX: &str = "_init";

/// Sub-interval between pod lookups during the bounded pod wait.
pub const POD_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Runtime parameters for one watch session. Fixed for the process
/// lifetime; nothing here is discovered at runtime.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Namespace watched for new batch jobs.
    pub namespace: String,
    /// Root directory under which per-job bundles are written.
    pub output_root: PathBuf,
    /// Sleep between discovery cycles.
    pub poll_interval: Duration,
    /// Stop once no new job has appeared for this long.
    pub idle_timeout: Duration,
    /// Bounded wait for a job's pod to become discoverable.
    pub pod_wait_timeout: Duration,
    /// Sub-interval between pod lookups while waiting.
    pub pod_poll_interval: Duration,
    /// Absolute in-container paths to harvest from the init container.
    pub target_dirs: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            output_root: PathBuf::from("job-diagnostics"),
            poll_interval: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
            pod_wait_timeout: Duration::from_secs(120),
            pod_poll_interval: POD_POLL_INTERVAL,
            target_dirs: DEFAULT_TARGET_DIRS
                .iter()
                .map(|d| (*d).to_string())
                .collect(),
        }
    }
}
