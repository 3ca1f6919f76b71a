use crate::configuration::DeploySettings;
use crate::helpers::compressor;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Build command exited with {code}: {stderr}")]
    BuildFailed { code: String, stderr: String },
    #[error("Packaging failed: {0}")]
    Packaging(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Deployment archive on local disk.
#[derive(Debug, Clone)]
pub struct Package {
    pub path: PathBuf,
    pub size: u64,
}

/// The local side of a deployment: build the project and pack its output.
#[async_trait]
pub trait Workspace: Send + Sync {
    async fn build(&self) -> Result<BuildOutput, WorkspaceError>;

    /// Pack the build output for run `run_id`. Runs never share an archive file.
    async fn package(&self, run_id: u64) -> Result<Package, WorkspaceError>;

    /// Remove the local archive. Never fails the run.
    async fn cleanup(&self, package: &Package);
}

/// Runs the configured build command through `sh -c` inside the project directory.
#[derive(Debug, Clone)]
pub struct ShellWorkspace {
    project_dir: PathBuf,
    build_command: String,
    package_paths: Vec<String>,
    archive_dir: PathBuf,
}

impl ShellWorkspace {
    pub fn from_settings(settings: &DeploySettings) -> Self {
        Self {
            project_dir: settings.project_dir.clone(),
            build_command: settings.build_command.clone(),
            package_paths: settings.package_paths.clone(),
            archive_dir: settings.archive_dir.clone(),
        }
    }

    fn archive_path(&self, run_id: u64) -> PathBuf {
        self.archive_dir
            .join(format!("deployment-{}-{}.tar.gz", std::process::id(), run_id))
    }
}

#[async_trait]
impl Workspace for ShellWorkspace {
    #[tracing::instrument(name = "Local build", skip(self), fields(command = %self.build_command))]
    async fn build(&self) -> Result<BuildOutput, WorkspaceError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.build_command)
            .current_dir(&self.project_dir)
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            tracing::error!("Build failed with {}", code);
            return Err(WorkspaceError::BuildFailed {
                code,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(BuildOutput { stdout, stderr })
    }

    async fn package(&self, run_id: u64) -> Result<Package, WorkspaceError> {
        let root = self.project_dir.clone();
        let entries = self.package_paths.clone();
        let path = self.archive_path(run_id);

        let packed = tokio::task::spawn_blocking({
            let path = path.clone();
            move || compressor::create_tar_gz(&root, &entries, &path)
        })
        .await
        .map_err(|err| WorkspaceError::Packaging(err.to_string()))
        .and_then(|result| result.map_err(WorkspaceError::from));

        let size = match packed {
            Ok(size) => size,
            Err(err) => {
                self.cleanup(&Package { path, size: 0 }).await;
                return Err(err);
            }
        };

        tracing::info!(size, path = %path.display(), "Deployment archive created");
        Ok(Package { path, size })
    }

    async fn cleanup(&self, package: &Package) {
        match tokio::fs::remove_file(&package.path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                "Failed to remove local archive {}: {}",
                package.path.display(),
                err
            ),
        }
    }
}
