//! Helm-backed deployment driver
//!
//! Installs and removes store releases by shelling out to the helm CLI, and
//! reads live state straight from the API server with kube-rs. Every helm
//! invocation is bounded by [`HelmConfig::command_timeout`].

use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use kube::Client;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use storefront_common::{Error, Result};

use crate::status::query_namespace;
use crate::{DeploymentDriver, LiveStatus, Release};

/// Default bound on a single helm invocation
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// How to invoke helm
#[derive(Debug, Clone)]
pub struct HelmConfig {
    /// helm executable
    pub binary: PathBuf,
    /// Chart reference (path, repo/chart, or OCI reference)
    pub chart: String,
    /// Namespace helm stores release metadata in
    pub release_namespace: String,
    /// Kubeconfig passed to helm, so it talks to the same cluster as the client
    pub kubeconfig: Option<PathBuf>,
    /// Upper bound on each helm command
    pub command_timeout: Duration,
}

impl HelmConfig {
    /// Config for `chart` with default binary, namespace and timeout
    pub fn new(chart: impl Into<String>) -> Self {
        Self {
            binary: PathBuf::from("helm"),
            chart: chart.into(),
            release_namespace: "default".to_string(),
            kubeconfig: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// [`DeploymentDriver`] using the helm CLI and a kube client
#[derive(Clone)]
pub struct HelmDriver {
    client: Client,
    config: HelmConfig,
}

impl HelmDriver {
    /// Create a driver from a kube client and helm settings
    pub fn new(client: Client, config: HelmConfig) -> Self {
        Self { client, config }
    }

    /// Arguments for `helm install`
    pub(crate) fn install_args(
        &self,
        release: &str,
        namespace: &str,
        display_name: &str,
    ) -> Vec<String> {
        let mut args = vec![
            "install".to_string(),
            release.to_string(),
            self.config.chart.clone(),
            "--namespace".to_string(),
            self.config.release_namespace.clone(),
            "--set".to_string(),
            format!("namespace={}", namespace),
            "--set-string".to_string(),
            format!("storeName={}", escape_set_value(display_name)),
        ];
        self.push_common_args(&mut args);
        args
    }

    /// Arguments for `helm uninstall`
    pub(crate) fn uninstall_args(&self, release: &str) -> Vec<String> {
        let mut args = vec![
            "uninstall".to_string(),
            release.to_string(),
            "--namespace".to_string(),
            self.config.release_namespace.clone(),
        ];
        self.push_common_args(&mut args);
        args
    }

    /// Arguments for `helm list`
    pub(crate) fn list_args(&self) -> Vec<String> {
        let mut args = vec![
            "list".to_string(),
            "--output".to_string(),
            "json".to_string(),
            "--namespace".to_string(),
            self.config.release_namespace.clone(),
        ];
        self.push_common_args(&mut args);
        args
    }

    fn push_common_args(&self, args: &mut Vec<String>) {
        if let Some(kubeconfig) = &self.config.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.display().to_string());
        }
    }

    /// Run helm with `args`, returning its output regardless of exit status
    async fn run_helm(&self, release: &str, args: &[String]) -> Result<Output> {
        debug!(binary = %self.config.binary.display(), args = ?args, "running helm");
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(args).kill_on_drop(true);

        let subcommand = args.first().map(String::as_str).unwrap_or("command");
        tokio::time::timeout(self.config.command_timeout, cmd.output())
            .await
            .map_err(|_| {
                Error::driver_for(
                    release,
                    format!(
                        "helm {} timed out after {:?}",
                        subcommand, self.config.command_timeout
                    ),
                )
            })?
            .map_err(|e| Error::driver_for(release, format!("failed to execute helm: {}", e)))
    }
}

#[async_trait]
impl DeploymentDriver for HelmDriver {
    #[instrument(skip(self), fields(chart = %self.config.chart))]
    async fn install(&self, release: &str, namespace: &str, display_name: &str) -> Result<()> {
        let args = self.install_args(release, namespace, display_name);
        let output = self.run_helm(release, &args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(release = %release, stderr = %stderr, "helm install failed");
            return Err(Error::driver_for(release, format!("helm install failed: {}", stderr)));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() && !stderr.contains("WARNING") {
            warn!(release = %release, stderr = %stderr.trim(), "helm install reported errors");
        }
        info!(release = %release, namespace = %namespace, "helm install succeeded");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn uninstall(&self, release: &str) -> Result<()> {
        let args = self.uninstall_args(release);
        let output = self.run_helm(release, &args).await?;

        if output.status.success() {
            info!(release = %release, "helm uninstall succeeded");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_release_not_found(&stderr) {
            info!(release = %release, "release already gone");
            return Ok(());
        }

        warn!(release = %release, stderr = %stderr, "helm uninstall failed");
        Err(Error::driver_for(release, format!("helm uninstall failed: {}", stderr)))
    }

    async fn query_status(&self, namespace: &str) -> LiveStatus {
        query_namespace(&self.client, namespace).await
    }

    async fn list(&self) -> Vec<Release> {
        let args = self.list_args();
        let output = match self.run_helm("*", &args).await {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                warn!(
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "helm list failed"
                );
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "helm list failed");
                return Vec::new();
            }
        };

        parse_release_list(&output.stdout)
    }
}

/// Parse `helm list --output json`; empty on malformed output
fn parse_release_list(stdout: &[u8]) -> Vec<Release> {
    if stdout.iter().all(|b| b.is_ascii_whitespace()) {
        return Vec::new();
    }
    serde_json::from_slice(stdout).unwrap_or_else(|e| {
        warn!(error = %e, "could not parse helm list output");
        Vec::new()
    })
}

/// helm reports a missing release as `...: release: not found`
fn is_release_not_found(stderr: &str) -> bool {
    stderr.to_lowercase().contains("release: not found")
}

/// Escape characters helm's `--set` parser treats specially
fn escape_set_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ',') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_common::StoreStatus;

    /// A client pointed at a port nothing listens on
    fn offline_client() -> Client {
        let mut config = kube::Config::new("http://127.0.0.1:1".parse().unwrap());
        config.connect_timeout = Some(Duration::from_millis(200));
        Client::try_from(config).unwrap()
    }

    fn driver_with(config: HelmConfig) -> HelmDriver {
        HelmDriver::new(offline_client(), config)
    }

    mod arguments {
        use super::*;

        #[tokio::test]
        async fn install_passes_namespace_and_name_as_values() {
            let driver = driver_with(HelmConfig::new("./charts/store"));
            let args = driver.install_args("store-1a2b3c4d", "store-acme-deadbeef", "Acme");
            assert_eq!(
                args,
                vec![
                    "install",
                    "store-1a2b3c4d",
                    "./charts/store",
                    "--namespace",
                    "default",
                    "--set",
                    "namespace=store-acme-deadbeef",
                    "--set-string",
                    "storeName=Acme",
                ]
            );
        }

        #[tokio::test]
        async fn kubeconfig_is_forwarded_to_helm() {
            let mut config = HelmConfig::new("chart");
            config.kubeconfig = Some(PathBuf::from("/etc/kube/config"));
            let driver = driver_with(config);
            let args = driver.uninstall_args("store-1");
            assert_eq!(&args[args.len() - 2..], ["--kubeconfig", "/etc/kube/config"]);
        }

        #[tokio::test]
        async fn list_requests_json() {
            let driver = driver_with(HelmConfig::new("chart"));
            let args = driver.list_args();
            assert!(args.windows(2).any(|w| w == ["--output", "json"]));
        }

        #[test]
        fn set_values_are_escaped() {
            assert_eq!(escape_set_value("Bob's Shop"), "Bob's Shop");
            assert_eq!(escape_set_value("Tea, Cakes"), "Tea\\, Cakes");
            assert_eq!(escape_set_value("a\\b"), "a\\\\b");
        }
    }

    mod output_parsing {
        use super::*;

        #[test]
        fn missing_release_is_recognised() {
            assert!(is_release_not_found(
                "Error: uninstall: Release not loaded: store-1a2b3c4d: release: not found"
            ));
            assert!(!is_release_not_found("Error: Kubernetes cluster unreachable"));
        }

        #[test]
        fn empty_and_malformed_lists_are_empty() {
            assert!(parse_release_list(b"").is_empty());
            assert!(parse_release_list(b"  \n").is_empty());
            assert!(parse_release_list(b"not json").is_empty());
        }
    }

    /// Exercise the real process path against a stand-in helm script
    #[cfg(unix)]
    mod fake_helm {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("helm");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn driver_for_script(path: PathBuf) -> HelmDriver {
            let mut config = HelmConfig::new("chart");
            config.binary = path;
            config.command_timeout = Duration::from_secs(5);
            driver_with(config)
        }

        #[tokio::test]
        async fn install_success() {
            let dir = tempfile::tempdir().unwrap();
            let driver = driver_for_script(script(&dir, "echo deployed; exit 0"));
            driver.install("store-1", "store-a-1", "A").await.unwrap();
        }

        #[tokio::test]
        async fn install_failure_carries_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let driver = driver_for_script(script(
                &dir,
                "echo 'Error: INSTALLATION FAILED: chart not found' >&2; exit 1",
            ));
            let err = driver.install("store-1", "store-a-1", "A").await.unwrap_err();
            assert!(err.to_string().contains("chart not found"));
            assert!(err.to_string().contains("store-1"));
        }

        #[tokio::test]
        async fn uninstall_of_missing_release_succeeds() {
            let dir = tempfile::tempdir().unwrap();
            let driver = driver_for_script(script(
                &dir,
                "echo 'Error: uninstall: Release not loaded: store-1: release: not found' >&2; exit 1",
            ));
            driver.uninstall("store-1").await.unwrap();
        }

        #[tokio::test]
        async fn uninstall_failure_is_reported() {
            let dir = tempfile::tempdir().unwrap();
            let driver = driver_for_script(script(
                &dir,
                "echo 'Error: Kubernetes cluster unreachable' >&2; exit 1",
            ));
            assert!(driver.uninstall("store-1").await.is_err());
        }

        #[tokio::test]
        async fn slow_helm_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let mut config = HelmConfig::new("chart");
            config.binary = script(&dir, "sleep 5");
            config.command_timeout = Duration::from_millis(100);
            let driver = driver_with(config);

            let err = driver.install("store-1", "ns", "A").await.unwrap_err();
            assert!(err.to_string().contains("timed out"));
        }

        #[tokio::test]
        async fn list_parses_releases() {
            let dir = tempfile::tempdir().unwrap();
            let driver = driver_for_script(script(
                &dir,
                r#"echo '[{"name":"store-1","namespace":"default","status":"deployed"}]'"#,
            ));
            let releases = driver.list().await;
            assert_eq!(releases.len(), 1);
            assert_eq!(releases[0].name, "store-1");
        }

        #[tokio::test]
        async fn missing_helm_binary_lists_nothing() {
            let mut config = HelmConfig::new("chart");
            config.binary = PathBuf::from("/nonexistent/helm");
            let driver = driver_with(config);
            assert!(driver.list().await.is_empty());
            assert!(driver.install("store-1", "ns", "A").await.is_err());
        }
    }

    /// Story: an unreachable API server is ambiguous, never "not found"
    #[tokio::test]
    async fn unreachable_cluster_reports_error_status() {
        let driver = driver_with(HelmConfig::new("chart"));
        let live = driver.query_status("store-acme-12345678").await;
        assert!(!live.exists);
        assert_eq!(live.status, StoreStatus::Error);
    }

    #[tokio::test]
    async fn empty_namespace_reports_error_status() {
        let driver = driver_with(HelmConfig::new("chart"));
        assert_eq!(driver.query_status("").await, LiveStatus::error());
    }
}
