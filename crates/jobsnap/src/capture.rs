//! Diagnostics capture pipeline for one newly discovered job.
//!
//! Runs an ordered sequence of best-effort steps: per-job directory
//! setup, static job captures, a bounded wait for the job's pod, pod
//! captures, a file harvest from the first init container, and finally
//! the aggregated job logs. No step failure aborts the run; every step
//! records an explicit outcome instead.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cluster::{ClusterQuery, INIT_CONTAINER_NAME_PATH};
use crate::config::{WatchConfig, INIT_ARTIFACT_SUFFIX};
use crate::sink::ArtifactSink;

/// Outcome of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Skipped(String),
    Failed(String),
}

/// Pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureStep {
    Directories,
    DescribeJob,
    Events,
    JobManifest,
    PodDiscovery,
    InitContainer,
    DescribePod,
    PodManifest,
    FileHarvest,
    Logs,
}

/// One recorded step outcome.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: CaptureStep,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Record of a completed capture run.
#[derive(Debug, Serialize)]
pub struct CaptureReport {
    pub job: String,
    pub completed_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
}

impl CaptureReport {
    fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            completed_at: Utc::now(),
            steps: Vec::new(),
        }
    }

    fn record(&mut self, step: CaptureStep, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Completed => debug!("job {}: {step:?} completed", self.job),
            StepOutcome::Skipped(reason) => info!("job {}: {step:?} skipped: {reason}", self.job),
            StepOutcome::Failed(reason) => warn!("job {}: {step:?} failed: {reason}", self.job),
        }
        self.steps.push(StepReport { step, outcome });
    }

    /// Outcome recorded for a step, if the step was reached.
    #[allow(dead_code)] // exercised by the pipeline tests
    pub fn outcome(&self, step: CaptureStep) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|s| s.step == step)
            .map(|s| &s.outcome)
    }

    fn finish(&mut self) {
        self.completed_at = Utc::now();
        let failed = self
            .steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
            .count();
        info!(
            "capture for job {} finished ({} steps, {failed} failed)",
            self.job,
            self.steps.len()
        );
    }
}

/// Working state for one job's capture. Created on detection, discarded
/// once the run finishes; never reused.
#[derive(Debug)]
struct DiagnosticsRun {
    dir: PathBuf,
    pod: Option<String>,
    init_container: Option<String>,
}

/// Result of the bounded pod wait.
#[derive(Debug, PartialEq, Eq)]
pub enum PodWait {
    Resolved(String),
    TimedOut,
}

/// Poll for the job's pod until it appears or the timeout elapses.
///
/// Terminal on first success or on expiry; waits at least `timeout` and
/// at most one extra sub-interval before giving up. Lookup errors count
/// as "not yet available".
pub async fn wait_for_pod<C: ClusterQuery>(
    cluster: &C,
    namespace: &str,
    job: &str,
    timeout: Duration,
    interval: Duration,
) -> PodWait {
    let start = Instant::now();
    loop {
        match cluster.find_pod_for_job(namespace, job) {
            Ok(Some(pod)) => return PodWait::Resolved(pod),
            Ok(None) => debug!("no pod yet for job {job}"),
            Err(e) => debug!("pod lookup for job {job} failed: {e:#}"),
        }
        if start.elapsed() >= timeout {
            return PodWait::TimedOut;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Run the full capture sequence for one job.
pub async fn run_capture<C: ClusterQuery, S: ArtifactSink>(
    cluster: &C,
    sink: &S,
    config: &WatchConfig,
    job: &str,
) -> CaptureReport {
    let mut report = CaptureReport::new(job);
    let mut run = DiagnosticsRun {
        dir: config.output_root.join(job),
        pod: None,
        init_container: None,
    };

    info!("capturing diagnostics for job {job} into {}", run.dir.display());

    report.record(
        CaptureStep::Directories,
        setup_directories(sink, config, &run.dir),
    );

    // Static captures are independent of each other and of pod state.
    report.record(
        CaptureStep::DescribeJob,
        write_artifact(
            sink,
            &run.dir.join("describe-job.yaml"),
            cluster.describe_job(job, &config.namespace),
        ),
    );
    report.record(
        CaptureStep::Events,
        write_artifact(
            sink,
            &run.dir.join("events.yaml"),
            cluster.list_events(&config.namespace, job, "Job"),
        ),
    );
    report.record(
        CaptureStep::JobManifest,
        write_artifact(
            sink,
            &run.dir.join("job.yaml"),
            cluster.job_manifest(job, &config.namespace),
        ),
    );

    match wait_for_pod(
        cluster,
        &config.namespace,
        job,
        config.pod_wait_timeout,
        config.pod_poll_interval,
    )
    .await
    {
        PodWait::Resolved(pod) => {
            info!("job {job}: pod {pod} resolved");
            report.record(CaptureStep::PodDiscovery, StepOutcome::Completed);
            run.pod = Some(pod);
        }
        PodWait::TimedOut => {
            warn!(
                "job {job}: no pod within {}s, skipping pod capture and file harvest",
                config.pod_wait_timeout.as_secs()
            );
            report.record(
                CaptureStep::PodDiscovery,
                StepOutcome::Skipped("pod wait timed out".to_string()),
            );
        }
    }

    if let Some(pod) = run.pod.clone() {
        // The init-container name is resolved once and reused for the harvest.
        match cluster.pod_field(&pod, &config.namespace, INIT_CONTAINER_NAME_PATH) {
            Ok(name) if !name.is_empty() => {
                report.record(CaptureStep::InitContainer, StepOutcome::Completed);
                run.init_container = Some(name);
            }
            Ok(_) => report.record(
                CaptureStep::InitContainer,
                StepOutcome::Skipped("pod has no init container".to_string()),
            ),
            Err(e) => report.record(CaptureStep::InitContainer, StepOutcome::Failed(format!("{e:#}"))),
        }

        report.record(
            CaptureStep::DescribePod,
            write_artifact(
                sink,
                &run.dir.join(suffixed_name("describe-pod.yaml")),
                cluster.describe_pod(&pod, &config.namespace),
            ),
        );
        report.record(
            CaptureStep::PodManifest,
            write_artifact(
                sink,
                &run.dir.join(suffixed_name("pod-manifest.yaml")),
                cluster.pod_manifest(&pod, &config.namespace),
            ),
        );

        if let Some(container) = run.init_container.clone() {
            report.record(
                CaptureStep::FileHarvest,
                harvest_files(cluster, config, &run.dir, &pod, &container),
            );
        } else {
            report.record(
                CaptureStep::FileHarvest,
                StepOutcome::Skipped("no init container".to_string()),
            );
        }
    } else {
        let reason = "pod not resolved".to_string();
        report.record(CaptureStep::InitContainer, StepOutcome::Skipped(reason.clone()));
        report.record(CaptureStep::DescribePod, StepOutcome::Skipped(reason.clone()));
        report.record(CaptureStep::PodManifest, StepOutcome::Skipped(reason.clone()));
        report.record(CaptureStep::FileHarvest, StepOutcome::Skipped(reason));
    }

    // Logs go last so the stream is as complete as it can be.
    report.record(
        CaptureStep::Logs,
        write_artifact(
            sink,
            &run.dir.join("logs.log"),
            cluster.job_logs(job, &config.namespace),
        ),
    );

    report.finish();
    report
}

/// Create the per-job directory plus one subdirectory per target
/// directory, named after the target's last path segment.
fn setup_directories<S: ArtifactSink>(
    sink: &S,
    config: &WatchConfig,
    job_dir: &Path,
) -> StepOutcome {
    if let Err(e) = sink.create_dir(job_dir) {
        return StepOutcome::Failed(format!("{e:#}"));
    }
    for target in &config.target_dirs {
        let local = job_dir.join(dir_segment(target));
        if let Err(e) = sink.create_dir(&local) {
            return StepOutcome::Failed(format!("{e:#}"));
        }
    }
    StepOutcome::Completed
}

/// Fetch an artifact and persist it, mapping either failure to a step
/// outcome.
fn write_artifact<S: ArtifactSink>(
    sink: &S,
    path: &Path,
    fetched: Result<String>,
) -> StepOutcome {
    match fetched {
        Ok(contents) => match sink.write_file(path, &contents) {
            Ok(()) => {
                debug!("wrote {}", path.display());
                StepOutcome::Completed
            }
            Err(e) => StepOutcome::Failed(format!("{e:#}")),
        },
        Err(e) => StepOutcome::Failed(format!("{e:#}")),
    }
}

/// Copy every listed file out of each target directory.
///
/// Listing and copying are fully independent per directory and per file:
/// an absent or unlistable directory is a logged skip, a failed copy
/// only loses that one file.
fn harvest_files<C: ClusterQuery>(
    cluster: &C,
    config: &WatchConfig,
    job_dir: &Path,
    pod: &str,
    container: &str,
) -> StepOutcome {
    let mut copied = 0usize;
    let mut failures = 0usize;

    for target in &config.target_dirs {
        let names = match cluster.list_container_files(pod, &config.namespace, container, target)
        {
            Ok(names) => names,
            Err(e) => {
                info!("listing {target} in {pod}/{container} failed (absent or empty): {e:#}");
                continue;
            }
        };
        if names.is_empty() {
            debug!("{target} is empty in {pod}/{container}");
            continue;
        }

        let local_dir = job_dir.join(dir_segment(target));
        for name in &names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if name.contains('/') {
                warn!("skipping nested listing entry {name:?} from {target}");
                continue;
            }
            let remote = format!("{}/{name}", target.trim_end_matches('/'));
            let local = local_dir.join(suffixed_name(name));
            match cluster.copy_file(&config.namespace, pod, container, &remote, &local) {
                Ok(()) => {
                    info!("harvested {remote} -> {}", local.display());
                    copied += 1;
                }
                Err(e) => {
                    warn!("copy of {remote} failed: {e:#}");
                    failures += 1;
                }
            }
        }
    }

    if failures > 0 {
        StepOutcome::Failed(format!("{failures} of {} copies failed", copied + failures))
    } else if copied == 0 {
        StepOutcome::Skipped("no files to harvest".to_string())
    } else {
        StepOutcome::Completed
    }
}

/// Insert the init-artifact suffix before the file extension:
/// `report.json` becomes `report_init.json`, `data` becomes `data_init`.
fn suffixed_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}{INIT_ARTIFACT_SUFFIX}.{ext}"),
        _ => format!("{name}{INIT_ARTIFACT_SUFFIX}"),
    }
}

/// Last path segment of a target directory, used as the local
/// subdirectory name.
fn dir_segment(dir: &str) -> &str {
    dir.rsplit('/').find(|s| !s.is_empty()).unwrap_or(dir)
}
