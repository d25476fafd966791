//! Read-only cluster access through kubectl subprocesses.
//!
//! Each operation is a one-shot blocking `kubectl` call with its output
//! captured. Absence of a result (empty listing, empty jsonpath field) is
//! a legitimate value, not an error; `Err` means the query itself failed.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Jsonpath for the name of a pod's first init container.
pub const INIT_CONTAINER_NAME_PATH: &str = "{.spec.initContainers[0].name}";

/// Read and copy operations against the cluster.
///
/// One method per operation the capture pipeline needs, so tests can
/// substitute a scripted double without any real cluster.
pub trait ClusterQuery {
    /// Names of all jobs in the namespace, in listing order.
    fn list_jobs(&self, namespace: &str) -> Result<Vec<String>>;

    /// `kubectl describe` text for a job.
    fn describe_job(&self, name: &str, namespace: &str) -> Result<String>;

    /// Full YAML manifest of a job.
    fn job_manifest(&self, name: &str, namespace: &str) -> Result<String>;

    /// Events whose involved object matches the given name and kind.
    fn list_events(&self, namespace: &str, object_name: &str, object_kind: &str)
        -> Result<String>;

    /// First pod carrying the `job-name` label for this job, if any.
    fn find_pod_for_job(&self, namespace: &str, job: &str) -> Result<Option<String>>;

    /// A single scalar field from a pod spec, empty string when absent.
    fn pod_field(&self, pod: &str, namespace: &str, jsonpath: &str) -> Result<String>;

    /// `kubectl describe` text for a pod.
    fn describe_pod(&self, pod: &str, namespace: &str) -> Result<String>;

    /// Full YAML manifest of a pod.
    fn pod_manifest(&self, pod: &str, namespace: &str) -> Result<String>;

    /// Filenames inside a directory of a running container, one per line.
    fn list_container_files(
        &self,
        pod: &str,
        namespace: &str,
        container: &str,
        dir: &str,
    ) -> Result<Vec<String>>;

    /// Copy one file out of a running container to a local path.
    fn copy_file(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        remote: &str,
        local: &Path,
    ) -> Result<()>;

    /// Aggregated logs across all of the job's containers, full history.
    fn job_logs(&self, job: &str, namespace: &str) -> Result<String>;
}

/// Production implementation backed by the `kubectl` binary.
pub struct Kubectl;

impl ClusterQuery for Kubectl {
    fn list_jobs(&self, namespace: &str) -> Result<Vec<String>> {
        let out = kubectl_stdout(&[
            "get",
            "jobs",
            "-n",
            namespace,
            "-o",
            "jsonpath={.items[*].metadata.name}",
        ])?;
        Ok(parse_name_list(&out))
    }

    fn describe_job(&self, name: &str, namespace: &str) -> Result<String> {
        kubectl_stdout(&["describe", "job", name, "-n", namespace])
    }

    fn job_manifest(&self, name: &str, namespace: &str) -> Result<String> {
        kubectl_stdout(&["get", "job", name, "-n", namespace, "-o", "yaml"])
    }

    fn list_events(
        &self,
        namespace: &str,
        object_name: &str,
        object_kind: &str,
    ) -> Result<String> {
        let selector = events_field_selector(object_name, object_kind);
        kubectl_stdout(&[
            "get",
            "events",
            "-n",
            namespace,
            "--field-selector",
            &selector,
            "-o",
            "yaml",
        ])
    }

    fn find_pod_for_job(&self, namespace: &str, job: &str) -> Result<Option<String>> {
        let selector = job_label_selector(job);
        let out = kubectl_stdout(&[
            "get",
            "pods",
            "-n",
            namespace,
            "-l",
            &selector,
            "-o",
            "jsonpath={.items[*].metadata.name}",
        ])?;
        Ok(parse_name_list(&out).into_iter().next())
    }

    fn pod_field(&self, pod: &str, namespace: &str, jsonpath: &str) -> Result<String> {
        let query = format!("jsonpath={jsonpath}");
        let out = kubectl_stdout(&["get", "pod", pod, "-n", namespace, "-o", &query])?;
        Ok(out.trim().to_string())
    }

    fn describe_pod(&self, pod: &str, namespace: &str) -> Result<String> {
        kubectl_stdout(&["describe", "pod", pod, "-n", namespace])
    }

    fn pod_manifest(&self, pod: &str, namespace: &str) -> Result<String> {
        kubectl_stdout(&["get", "pod", pod, "-n", namespace, "-o", "yaml"])
    }

    fn list_container_files(
        &self,
        pod: &str,
        namespace: &str,
        container: &str,
        dir: &str,
    ) -> Result<Vec<String>> {
        let out = kubectl_stdout(&[
            "exec", pod, "-n", namespace, "-c", container, "--", "ls", "-1", dir,
        ])?;
        Ok(parse_listing(&out))
    }

    fn copy_file(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        remote: &str,
        local: &Path,
    ) -> Result<()> {
        let source = format!("{namespace}/{pod}:{remote}");
        let dest = local.display().to_string();
        kubectl_stdout(&["cp", &source, &dest, "-c", container])?;
        Ok(())
    }

    fn job_logs(&self, job: &str, namespace: &str) -> Result<String> {
        let target = log_target(job);
        kubectl_stdout(&[
            "logs",
            &target,
            "-n",
            namespace,
            "--all-containers=true",
            "--tail=-1",
        ])
    }
}

/// Run kubectl with the given args and return its stdout.
fn kubectl_stdout(args: &[&str]) -> Result<String> {
    debug!("kubectl {}", args.join(" "));
    let output = Command::new("kubectl")
        .args(args)
        .output()
        .context("Failed to run kubectl")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "kubectl {} failed: {}",
            args.first().unwrap_or(&""),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Field selector matching events for one involved object.
fn events_field_selector(object_name: &str, object_kind: &str) -> String {
    format!("involvedObject.name={object_name},involvedObject.kind={object_kind}")
}

/// Label selector tying a pod back to the job that created it.
fn job_label_selector(job: &str) -> String {
    format!("job-name={job}")
}

/// Log target addressing all pods of a job.
fn log_target(job: &str) -> String {
    format!("job/{job}")
}

/// Split a whitespace-separated jsonpath name list into owned names.
fn parse_name_list(out: &str) -> Vec<String> {
    out.split_whitespace().map(ToString::to_string).collect()
}

/// Split newline-delimited `ls -1` output, dropping blank lines.
fn parse_listing(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}
