//! Job discovery loop and idle-timeout governor.

use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::capture;
use crate::cluster::ClusterQuery;
use crate::config::WatchConfig;
use crate::events::{EventEmitter, WatchEvent};
use crate::sink::ArtifactSink;

/// Monotonic elapsed-time tracker for the idle-termination policy.
#[derive(Debug)]
pub struct IdleTimer {
    last_reset: Instant,
}

impl IdleTimer {
    pub fn new() -> Self {
        Self {
            last_reset: Instant::now(),
        }
    }

    /// Restart the idle clock. Called only on first detection of a job.
    pub fn reset(&mut self) {
        self.last_reset = Instant::now();
    }

    /// True once the elapsed time since the last reset (or construction)
    /// reaches the threshold.
    pub fn expired(&self, threshold: Duration) -> bool {
        self.last_reset.elapsed() >= threshold
    }
}

impl Default for IdleTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable state threaded through discovery cycles: the append-only set
/// of jobs already processed and the idle clock.
#[derive(Debug, Default)]
pub struct DiscoveryLoopState {
    pub seen: HashSet<String>,
    pub idle: IdleTimer,
}

impl DiscoveryLoopState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Watches one namespace and captures diagnostics for each new job,
/// one job at a time.
pub struct JobWatcher<C, S> {
    cluster: C,
    sink: S,
    config: WatchConfig,
    emitter: EventEmitter,
}

impl<C: ClusterQuery, S: ArtifactSink> JobWatcher<C, S> {
    pub fn new(cluster: C, sink: S, config: WatchConfig, emitter: EventEmitter) -> Self {
        Self {
            cluster,
            sink,
            config,
            emitter,
        }
    }

    /// Run discovery cycles until no new job has appeared for the idle
    /// timeout.
    pub async fn run(&self) {
        let mut state = DiscoveryLoopState::new();
        loop {
            let new_jobs = self.poll_once(&mut state).await;
            if new_jobs == 0 && state.idle.expired(self.config.idle_timeout) {
                info!(
                    "no new jobs for {}s, stopping watch ({} jobs processed)",
                    self.config.idle_timeout.as_secs(),
                    state.seen.len()
                );
                self.emitter
                    .emit(&WatchEvent::idle_timeout(self.config.idle_timeout));
                return;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// One discovery cycle: list jobs, run the capture pipeline for each
    /// name not yet seen, in listing order. Returns the number of jobs
    /// newly processed. A failed listing is an empty cycle, not an error.
    pub async fn poll_once(&self, state: &mut DiscoveryLoopState) -> usize {
        let names = match self.cluster.list_jobs(&self.config.namespace) {
            Ok(names) => names,
            Err(e) => {
                warn!("job listing failed, treating as empty cycle: {e:#}");
                Vec::new()
            }
        };
        debug!("poll cycle: {} jobs listed", names.len());

        let mut new_jobs = 0usize;
        for name in names {
            // Marked seen before any capture work, so a job is processed
            // at most once per run.
            if !state.seen.insert(name.clone()) {
                continue;
            }
            new_jobs += 1;
            state.idle.reset();
            info!("new job detected: {name}");
            self.emitter.emit(&WatchEvent::job_discovered(&name));

            let report =
                capture::run_capture(&self.cluster, &self.sink, &self.config, &name).await;
            self.emitter.emit(&WatchEvent::capture_completed(report));
        }
        new_jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeCluster, MemSink};
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn test_watcher(cluster: FakeCluster) -> JobWatcher<FakeCluster, MemSink> {
        let config = WatchConfig {
            namespace: "scans".to_string(),
            output_root: PathBuf::from("out"),
            poll_interval: Duration::from_millis(5),
            idle_timeout: Duration::from_millis(50),
            pod_wait_timeout: Duration::from_millis(10),
            pod_poll_interval: Duration::from_millis(2),
            ..WatchConfig::default()
        };
        JobWatcher::new(cluster, MemSink::default(), config, EventEmitter::new(None))
    }

    #[test]
    fn test_idle_timer() {
        let mut timer = IdleTimer::new();
        assert!(!timer.expired(Duration::from_secs(3600)));
        assert!(timer.expired(Duration::ZERO));

        std::thread::sleep(Duration::from_millis(20));
        assert!(timer.expired(Duration::from_millis(10)));
        timer.reset();
        assert!(!timer.expired(Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn test_each_job_captured_exactly_once() {
        let cluster = FakeCluster {
            listings: Mutex::new(vec![
                vec!["scan-1".to_string()],
                vec!["scan-1".to_string(), "scan-2".to_string()],
                vec!["scan-1".to_string(), "scan-2".to_string()],
            ]),
            ..FakeCluster::default()
        };
        let watcher = test_watcher(cluster);
        let mut state = DiscoveryLoopState::new();

        assert_eq!(watcher.poll_once(&mut state).await, 1);
        assert_eq!(watcher.poll_once(&mut state).await, 1);
        assert_eq!(watcher.poll_once(&mut state).await, 0);

        // Capture ran once per job, in listing order.
        let captured = watcher.cluster.captured_jobs.lock().unwrap().clone();
        assert_eq!(captured, vec!["scan-1", "scan-2"]);
        assert_eq!(*watcher.cluster.log_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_idle_clock_resets_only_on_new_jobs() {
        let cluster = FakeCluster {
            listings: Mutex::new(vec![vec!["scan-1".to_string()]]),
            ..FakeCluster::default()
        };
        let watcher = test_watcher(cluster);
        let mut state = DiscoveryLoopState::new();

        watcher.poll_once(&mut state).await;
        assert!(!state.idle.expired(Duration::from_millis(40)));

        // Re-listing the same job must not touch the clock.
        tokio::time::sleep(Duration::from_millis(50)).await;
        watcher.poll_once(&mut state).await;
        assert!(state.idle.expired(Duration::from_millis(40)));
    }

    #[tokio::test]
    async fn test_run_terminates_after_idle_timeout() {
        let cluster = FakeCluster {
            listings: Mutex::new(vec![vec!["scan-1".to_string()]]),
            ..FakeCluster::default()
        };
        let watcher = test_watcher(cluster);

        tokio::time::timeout(Duration::from_secs(5), watcher.run())
            .await
            .expect("watch loop did not terminate");

        assert_eq!(*watcher.cluster.log_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_listing_failure_is_an_empty_cycle() {
        let cluster = FakeCluster {
            fail_listing: true,
            ..FakeCluster::default()
        };
        let watcher = test_watcher(cluster);
        let mut state = DiscoveryLoopState::new();

        assert_eq!(watcher.poll_once(&mut state).await, 0);
        assert!(state.seen.is_empty());

        // The loop still winds down through the normal idle path.
        tokio::time::timeout(Duration::from_secs(5), watcher.run())
            .await
            .expect("watch loop did not terminate");
    }
}
