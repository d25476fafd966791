//! Scripted test doubles for the cluster interface and artifact sink.

use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::cluster::{ClusterQuery, INIT_CONTAINER_NAME_PATH};
use crate::sink::ArtifactSink;

/// Cluster double that replays scripted listings and pod state.
///
/// Job listings are consumed one per discovery cycle; the final entry
/// repeats forever. Pod resolution succeeds on the lookup after
/// `pod_ready_after` misses, provided `pod_name` is set.
#[derive(Default)]
pub struct FakeCluster {
    pub listings: Mutex<Vec<Vec<String>>>,
    pub fail_listing: bool,
    pub pod_name: Option<String>,
    pub pod_ready_after: usize,
    pub init_container: Option<String>,
    pub dir_files: BTreeMap<String, Vec<String>>,
    pub failing_dirs: BTreeSet<String>,
    pub failing_copies: BTreeSet<String>,
    pub copies: Mutex<Vec<(String, PathBuf)>>,
    pub log_calls: Mutex<usize>,
    pub captured_jobs: Mutex<Vec<String>>,
    pub pod_lookups: Mutex<usize>,
}

impl ClusterQuery for FakeCluster {
    fn list_jobs(&self, _namespace: &str) -> Result<Vec<String>> {
        if self.fail_listing {
            return Err(anyhow!("connection refused"));
        }
        let mut listings = self.listings.lock().unwrap();
        if listings.len() > 1 {
            Ok(listings.remove(0))
        } else {
            Ok(listings.first().cloned().unwrap_or_default())
        }
    }

    fn describe_job(&self, name: &str, _namespace: &str) -> Result<String> {
        self.captured_jobs.lock().unwrap().push(name.to_string());
        Ok(format!("describe {name}"))
    }

    fn job_manifest(&self, name: &str, _namespace: &str) -> Result<String> {
        Ok(format!("manifest {name}"))
    }

    fn list_events(
        &self,
        _namespace: &str,
        object_name: &str,
        object_kind: &str,
    ) -> Result<String> {
        Ok(format!("events {object_name} {object_kind}"))
    }

    fn find_pod_for_job(&self, _namespace: &str, _job: &str) -> Result<Option<String>> {
        let mut lookups = self.pod_lookups.lock().unwrap();
        *lookups += 1;
        if *lookups > self.pod_ready_after {
            Ok(self.pod_name.clone())
        } else {
            Ok(None)
        }
    }

    fn pod_field(&self, _pod: &str, _namespace: &str, jsonpath: &str) -> Result<String> {
        if jsonpath == INIT_CONTAINER_NAME_PATH {
            Ok(self.init_container.clone().unwrap_or_default())
        } else {
            Ok(String::new())
        }
    }

    fn describe_pod(&self, pod: &str, _namespace: &str) -> Result<String> {
        Ok(format!("describe pod {pod}"))
    }

    fn pod_manifest(&self, pod: &str, _namespace: &str) -> Result<String> {
        Ok(format!("manifest pod {pod}"))
    }

    fn list_container_files(
        &self,
        _pod: &str,
        _namespace: &str,
        _container: &str,
        dir: &str,
    ) -> Result<Vec<String>> {
        if self.failing_dirs.contains(dir) {
            return Err(anyhow!("ls: cannot access '{dir}'"));
        }
        Ok(self.dir_files.get(dir).cloned().unwrap_or_default())
    }

    fn copy_file(
        &self,
        _namespace: &str,
        _pod: &str,
        _container: &str,
        remote: &str,
        local: &Path,
    ) -> Result<()> {
        if self.failing_copies.contains(remote) {
            return Err(anyhow!("cp failed for {remote}"));
        }
        self.copies
            .lock()
            .unwrap()
            .push((remote.to_string(), local.to_path_buf()));
        Ok(())
    }

    fn job_logs(&self, job: &str, _namespace: &str) -> Result<String> {
        *self.log_calls.lock().unwrap() += 1;
        Ok(format!("logs for {job}"))
    }
}

/// In-memory sink recording the produced output tree.
#[derive(Default)]
pub struct MemSink {
    pub dirs: Mutex<BTreeSet<PathBuf>>,
    pub files: Mutex<BTreeMap<PathBuf, String>>,
}

impl ArtifactSink for MemSink {
    fn create_dir(&self, path: &Path) -> Result<()> {
        self.dirs.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }
}
