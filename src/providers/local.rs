//! Local target: write the PEM pair to disk, optionally wrapped in shell
//! commands (stop the service before, reload it after).

use crate::certificate::{parse_certificate, validate_private_key};
use crate::config::LocalConfig;
use crate::deployer::{single_target_result, Deployer};
use crate::error::DeployError;
use crate::logger::{AuditTrail, DeployLogger, LastRun};
use crate::types::{DeploymentResult, LogEntry};
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_SHELL: &str = "sh";

pub struct LocalDeployer {
    id: String,
    cert_path: PathBuf,
    key_path: PathBuf,
    pre_command: Option<String>,
    command: Option<String>,
    shell: String,
    logger: Arc<dyn DeployLogger>,
    last_run: LastRun,
}

impl LocalDeployer {
    pub fn new(
        id: impl Into<String>,
        config: &LocalConfig,
        logger: Arc<dyn DeployLogger>,
    ) -> Result<Self, DeployError> {
        let path = |key: &str, value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| DeployError::Configuration(format!("config `{}` is required", key)))
        };
        let command = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            id: id.into(),
            cert_path: path("certPath", &config.cert_path)?,
            key_path: path("keyPath", &config.key_path)?,
            pre_command: command(&config.pre_command),
            command: command(&config.command),
            shell: config
                .shell
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SHELL.to_string()),
            logger,
            last_run: LastRun::default(),
        })
    }

    fn target(&self) -> String {
        self.cert_path.display().to_string()
    }

    /// Run `script` through the configured shell; non-zero exit is an error.
    async fn run_command(
        &self,
        operation: &str,
        script: &str,
        trail: &mut AuditTrail<'_>,
    ) -> Result<(), DeployError> {
        debug!(deployer = %self.id, operation, "running command");
        let output = Command::new(&self.shell)
            .arg(shell_flag(&self.shell))
            .arg(script)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DeployError::provider(operation, format!("failed to spawn `{}`: {}", self.shell, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        trail.record(
            "command executed",
            Some(json!({
                "operation": operation,
                "status": output.status.code(),
                "stdout": stdout,
                "stderr": stderr,
            })),
        );

        if output.status.success() {
            Ok(())
        } else {
            Err(DeployError::provider(
                operation,
                format!("exited with {}: {}", output.status, stderr),
            ))
        }
    }

    async fn install(
        &self,
        cancel: &CancellationToken,
        cert_pem: &str,
        key_pem: &str,
        trail: &mut AuditTrail<'_>,
    ) -> Result<(), DeployError> {
        if let Some(script) = &self.pre_command {
            self.run_command("local.PreCommand", script, trail).await?;
        }
        if cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }

        write_file(&self.cert_path, cert_pem).await?;
        write_file(&self.key_path, key_pem).await?;
        trail.record(
            "files written",
            Some(json!({
                "certPath": self.cert_path.display().to_string(),
                "keyPath": self.key_path.display().to_string(),
            })),
        );

        if let Some(script) = &self.command {
            self.run_command("local.Command", script, trail).await?;
        }
        Ok(())
    }
}

fn shell_flag(shell: &str) -> &'static str {
    let name = Path::new(shell)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(shell)
        .to_ascii_lowercase();
    match name.as_str() {
        "cmd" => "/C",
        "powershell" | "pwsh" => "-Command",
        _ => "-c",
    }
}

async fn write_file(path: &Path, contents: &str) -> Result<(), DeployError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| DeployError::Io(format!("{}: {}", path.display(), e)))
}

#[async_trait]
impl Deployer for LocalDeployer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deploy(
        &self,
        cancel: &CancellationToken,
        cert_pem: &str,
        key_pem: &str,
    ) -> Result<DeploymentResult, DeployError> {
        parse_certificate(cert_pem)?;
        validate_private_key(key_pem)?;
        if cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }

        let mut trail = AuditTrail::new(self.logger.as_ref());
        let target = self.target();
        let attempt = self.install(cancel, cert_pem, key_pem, &mut trail).await;
        match &attempt {
            Ok(()) => {
                info!(deployer = %self.id, path = %target, "certificate installed");
                trail.record("certificate installed", Some(json!({ "certPath": target })));
            }
            Err(e) => {
                warn!(deployer = %self.id, error = %e, "local install failed");
                trail.record(
                    "local install failed",
                    Some(json!({ "certPath": target, "error": e.to_string() })),
                );
            }
        }

        let log_entries = trail.into_entries();
        self.last_run.replace(log_entries.clone());
        Ok(single_target_result(&target, attempt, log_entries))
    }

    fn log_entries(&self) -> Vec<LogEntry> {
        self.last_run.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::test_support::self_signed;
    use crate::logger::NilLogger;
    use crate::types::Outcome;

    fn config(dir: &Path) -> LocalConfig {
        LocalConfig {
            cert_path: Some(dir.join("live/cert.pem").display().to_string()),
            key_path: Some(dir.join("live/key.pem").display().to_string()),
            pre_command: None,
            command: None,
            shell: None,
        }
    }

    #[test]
    fn test_shell_flag() {
        assert_eq!(shell_flag("sh"), "-c");
        assert_eq!(shell_flag("/bin/bash"), "-c");
        assert_eq!(shell_flag("cmd.exe"), "/C");
        assert_eq!(shell_flag("pwsh"), "-Command");
    }

    #[tokio::test]
    async fn test_writes_files_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let deployer = LocalDeployer::new("local-1", &config(dir.path()), Arc::new(NilLogger)).unwrap();
        let (cert, key) = self_signed(Some("example.com"), &["example.com"]);

        let result = deployer
            .deploy(&CancellationToken::new(), &cert, &key)
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Success);
        let written = std::fs::read_to_string(dir.path().join("live/cert.pem")).unwrap();
        assert_eq!(written, cert);
        let tags: Vec<_> = deployer.log_entries().into_iter().map(|e| e.tag).collect();
        assert_eq!(tags, vec!["files written", "certificate installed"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_pre_command_skips_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.pre_command = Some("echo nope >&2; exit 3".into());
        let deployer = LocalDeployer::new("local-1", &cfg, Arc::new(NilLogger)).unwrap();
        let (cert, key) = self_signed(Some("example.com"), &["example.com"]);

        let result = deployer
            .deploy(&CancellationToken::new(), &cert, &key)
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Failure);
        assert!(result.overall_error.is_some());
        assert!(!dir.path().join("live/cert.pem").exists());
    }

    #[test]
    fn test_missing_paths_rejected() {
        let cfg = LocalConfig {
            cert_path: Some("  ".into()),
            key_path: None,
            pre_command: None,
            command: None,
            shell: None,
        };
        let err = LocalDeployer::new("local-1", &cfg, Arc::new(NilLogger)).err().unwrap();
        assert!(err.is_configuration());
    }
}
