//! Deployment runs.
//!
//! `Deployer::acquire` takes the guard before the request body is validated;
//! `Deployer::launch` then records a pending history entry and spawns the run. The run walks its plan, reporting through the emitter, and
//! always ends the same way: remote session closed, local archive removed,
//! history updated, guard released, stream closed. Dropping the response does
//! not cancel the run.

use crate::configuration::DeploySettings;
use crate::db::HistoryStore;
use crate::deploy::error::DeployError;
use crate::deploy::events::{self, EventStream, ProgressEmitter};
use crate::deploy::fsm::{FailurePolicy, Phase, Plan, RunMachine, Step};
use crate::deploy::guard::{DeploymentGuard, GuardPermit};
use crate::deploy::templates::{self, Templates};
use crate::deploy::workspace::{Package, Workspace, WorkspaceError};
use crate::helpers::ssh_client::{
    CommandOutput, RemoteConnector, RemoteSession, SshCredentials, SshError, SshTarget,
};
use crate::models::{
    DeploymentConfig, DeploymentHistoryEntry, DeploymentHistoryUpdate, DeploymentKind,
    DeploymentStatus, RemoteLogin,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

const OUTPUT_EXCERPT: usize = 2000;

/// Why a step failed, as shown to the operator.
#[derive(Debug)]
struct StepFailure(String);

impl From<SshError> for StepFailure {
    fn from(err: SshError) -> Self {
        Self(err.to_string())
    }
}

impl From<WorkspaceError> for StepFailure {
    fn from(err: WorkspaceError) -> Self {
        Self(err.to_string())
    }
}

impl From<tera::Error> for StepFailure {
    fn from(err: tera::Error) -> Self {
        Self(format!("template rendering failed: {}", err))
    }
}

#[derive(Clone)]
pub struct Deployer {
    guard: DeploymentGuard,
    history: Arc<dyn HistoryStore>,
    connector: Arc<dyn RemoteConnector>,
    workspace: Arc<dyn Workspace>,
    settings: Arc<DeploySettings>,
    templates: Arc<Templates>,
    /// Fixed credentials; `None` reads the process environment per connection.
    credentials: Option<SshCredentials>,
}

impl Deployer {
    pub fn new(
        settings: DeploySettings,
        history: Arc<dyn HistoryStore>,
        connector: Arc<dyn RemoteConnector>,
        workspace: Arc<dyn Workspace>,
    ) -> Result<Self, tera::Error> {
        Ok(Self {
            guard: DeploymentGuard::new(),
            history,
            connector,
            workspace,
            settings: Arc::new(settings),
            templates: Arc::new(Templates::new()?),
            credentials: None,
        })
    }

    pub fn with_credentials(mut self, credentials: SshCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    pub fn in_progress(&self) -> bool {
        self.guard.in_progress()
    }

    /// Force-clear the guard. A run still going keeps its remote session.
    pub fn reset(&self) {
        self.guard.force_reset();
    }

    fn credentials(&self) -> Result<SshCredentials, SshError> {
        match &self.credentials {
            Some(credentials) => Ok(credentials.clone()),
            None => SshCredentials::from_env(),
        }
    }

    /// Take the guard for a run of `kind`. Dropping the permit without
    /// launching releases it again.
    pub fn acquire(&self, kind: DeploymentKind) -> Result<GuardPermit, DeployError> {
        self.guard.try_acquire().ok_or(DeployError::Conflict(kind))
    }

    /// Start an accepted run and return its event stream.
    ///
    /// If the history entry can't be created the permit is dropped, which
    /// releases the guard.
    pub async fn launch(
        &self,
        permit: GuardPermit,
        kind: DeploymentKind,
        config: DeploymentConfig,
    ) -> Result<EventStream, DeployError> {
        let entry = self.history.create(DeploymentHistoryEntry::new(kind)).await?;

        let (emitter, stream) = events::channel();
        let span = tracing::info_span!(
            "deployment_run",
            kind = %kind,
            run_id = permit.run_id(),
            history_id = %entry.id,
            host = %config.login.host,
            domain = %config.domain,
        );

        let run = Run {
            deployer: self.clone(),
            plan: Plan::for_kind(kind),
            config,
            run_id: permit.run_id(),
            history_id: entry.id,
            started: Instant::now(),
            session: None,
            package: None,
            proxy_tooling_ready: false,
        };
        tokio::spawn(run.execute(emitter, permit).instrument(span));

        Ok(stream)
    }

    /// Open a session, run `whoami`, close it. Returns the remote user name.
    #[tracing::instrument(name = "SSH connection test", skip(self))]
    pub async fn test_connection(&self, login: &RemoteLogin) -> Result<String, DeployError> {
        let credentials = self.credentials()?;
        let target = SshTarget::new(&login.host, &login.username)
            .connect_timeout(self.settings.test_timeout())
            .command_timeout(self.settings.test_timeout());

        let session = self.connector.connect(&target, &credentials).await?;
        let result = session.exec(&templates::whoami()).await;
        if let Err(err) = session.disconnect().await {
            tracing::warn!("Failed to close test session: {}", err);
        }

        let output = result?;
        if !output.success() {
            return Err(DeployError::Step {
                phase: Phase::Connecting,
                message: format!("SSH test failed: {}", output.stderr.trim()),
            });
        }
        Ok(output.stdout.trim().to_string())
    }
}

struct Run {
    deployer: Deployer,
    plan: &'static Plan,
    config: DeploymentConfig,
    run_id: u64,
    history_id: Uuid,
    started: Instant,
    session: Option<Box<dyn RemoteSession>>,
    package: Option<Package>,
    proxy_tooling_ready: bool,
}

impl Run {
    async fn execute(mut self, mut emitter: ProgressEmitter, permit: GuardPermit) {
        let mut machine = RunMachine::new(self.plan);

        match self.plan.kind {
            DeploymentKind::Deployment => emitter.log("Starting deployment process..."),
            DeploymentKind::NginxConfig => {}
        }
        emitter.progress(self.plan.opening.message, self.plan.opening.percentage);

        let mut outcome = self.drive(&mut machine, &mut emitter).await;
        if outcome.is_ok() {
            self.finalize_remote(&mut emitter).await;
        }

        if let Some(session) = self.session.take() {
            if let Err(err) = session.disconnect().await {
                tracing::warn!("Failed to close SSH session: {}", err);
            }
        }
        if let Some(package) = self.package.take() {
            self.deployer.workspace.cleanup(&package).await;
        }

        if outcome.is_ok() && !machine.complete() {
            outcome = Err(DeployError::Step {
                phase: machine.phase(),
                message: "run ended before its last step".to_string(),
            });
        }

        let status = match &outcome {
            Ok(()) => {
                self.announce_success(&mut emitter);
                emitter.progress(self.plan.closing.message, self.plan.closing.percentage);
                tracing::info!(phase = %machine.phase(), "Run completed");
                DeploymentStatus::Success
            }
            Err(err) => {
                emitter.error(format!("{}: {}", self.plan.failure_prefix, err));
                tracing::error!(phase = %machine.phase(), "Run failed: {}", err);
                DeploymentStatus::Failed
            }
        };

        let duration = self.started.elapsed().as_secs() as i64;
        if let Err(err) = self
            .deployer
            .history
            .update(
                self.history_id,
                DeploymentHistoryUpdate::finished(status, duration),
            )
            .await
        {
            tracing::error!("{}", DeployError::History(err));
        }

        if emitter.is_detached() {
            tracing::warn!(
                "{}",
                DeployError::Transport(format!("run finished with status {}", status))
            );
        }

        permit.release();
        // dropping the emitter ends the response stream
    }

    async fn drive(
        &mut self,
        machine: &mut RunMachine,
        emitter: &mut ProgressEmitter,
    ) -> Result<(), DeployError> {
        while let Some(step) = machine.advance() {
            tracing::info!(
                phase = %step.phase,
                percentage = step.start.percentage,
                "Entering phase"
            );
            emitter.progress(step.start.message, step.start.percentage);

            match self.perform(step, emitter).await {
                Ok(()) => {
                    if let Some(finish) = step.finish {
                        emitter.progress(finish.message, finish.percentage);
                    }
                }
                Err(StepFailure(message)) => match step.policy {
                    FailurePolicy::Fatal => {
                        machine.fail();
                        return Err(DeployError::Step {
                            phase: step.phase,
                            message,
                        });
                    }
                    FailurePolicy::Advisory { warning, hint } => {
                        let advisory = DeployError::Advisory {
                            phase: step.phase,
                            message: format!("{}: {}", warning, message),
                        };
                        tracing::warn!(phase = %step.phase, "{}", advisory);
                        emitter.warning(advisory.to_string());
                        emitter.log(hint);
                    }
                },
            }
        }
        Ok(())
    }

    async fn perform(&mut self, step: &Step, emitter: &mut ProgressEmitter) -> Result<(), StepFailure> {
        match step.phase {
            Phase::Building => self.build(emitter).await,
            Phase::Packaging => self.package(emitter).await,
            Phase::Connecting => self.connect(emitter).await,
            Phase::Transferring => self.transfer(emitter).await,
            Phase::Installing => self.install(emitter).await,
            Phase::StartingService => self.start_service(emitter).await,
            Phase::InstallingProxy => self.install_proxy_tooling(emitter).await,
            Phase::ConfiguringProxy => self.configure_proxy(emitter).await,
            Phase::ProvisioningTls => self.provision_tls(emitter).await,
            Phase::Idle | Phase::Completed | Phase::Failed => Err(StepFailure(format!(
                "phase {} has no action",
                step.phase
            ))),
        }
    }

    fn session(&self) -> Result<&dyn RemoteSession, StepFailure> {
        self.session
            .as_deref()
            .ok_or_else(|| StepFailure("no SSH session open".to_string()))
    }

    /// Run a command whose non-zero exit fails the step.
    async fn checked(&self, command: &str, what: &str) -> Result<CommandOutput, StepFailure> {
        let output = self.session()?.exec(command).await?;
        if !output.success() {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim()
            } else {
                output.stderr.trim()
            };
            return Err(StepFailure(format!(
                "{} failed (exit code {}): {}",
                what,
                output.exit_code,
                excerpt(detail)
            )));
        }
        Ok(output)
    }

    async fn build(&mut self, emitter: &mut ProgressEmitter) -> Result<(), StepFailure> {
        emitter.log("Building project...");
        let output = self.deployer.workspace.build().await?;
        emitter.log(format!("Build completed: {}", excerpt(output.stdout.trim())));
        if !output.stderr.trim().is_empty() {
            emitter.log(format!("Build warnings: {}", excerpt(output.stderr.trim())));
        }
        Ok(())
    }

    async fn package(&mut self, emitter: &mut ProgressEmitter) -> Result<(), StepFailure> {
        emitter.log("Preparing deployment package...");
        let package = self.deployer.workspace.package(self.run_id).await?;
        emitter.log(format!("Archive created: {} bytes", package.size));
        self.package = Some(package);
        Ok(())
    }

    async fn connect(&mut self, emitter: &mut ProgressEmitter) -> Result<(), StepFailure> {
        let settings = &self.deployer.settings;
        emitter.log(format!("Connecting to VPS at {}...", self.config.login.host));

        let credentials = self.deployer.credentials()?;
        emitter.log(format!("Using SSH {} authentication", credentials.method()));

        let target = SshTarget::new(&self.config.login.host, &self.config.login.username)
            .connect_timeout(settings.connect_timeout())
            .command_timeout(settings.command_timeout());
        let session = self.deployer.connector.connect(&target, &credentials).await?;
        self.session = Some(session);

        emitter.log("SSH connection established");
        Ok(())
    }

    async fn transfer(&mut self, emitter: &mut ProgressEmitter) -> Result<(), StepFailure> {
        let deploy_path = self.config.deploy_path.clone();
        self.checked(&templates::make_dir(&deploy_path), "Creating deployment directory")
            .await?;
        emitter.log(format!("Created deployment directory: {}", deploy_path));

        let package = self
            .package
            .as_ref()
            .ok_or_else(|| StepFailure("no deployment archive to transfer".to_string()))?;
        let remote = templates::remote_join(&deploy_path, &self.deployer.settings.remote_archive_name);
        let sent = self.session()?.upload(&package.path, &remote).await?;
        emitter.log(format!("Archive transferred to VPS ({} bytes)", sent));
        Ok(())
    }

    async fn install(&mut self, emitter: &mut ProgressEmitter) -> Result<(), StepFailure> {
        let deploy_path = self.config.deploy_path.clone();
        let settings = Arc::clone(&self.deployer.settings);

        emitter.log("Extracting files on VPS...");
        self.checked(
            &templates::extract_archive(&deploy_path, &settings.remote_archive_name),
            "Extracting archive",
        )
        .await?;
        emitter.log("Files extracted successfully");

        emitter.log("Installing dependencies on VPS...");
        self.checked(
            &templates::install_dependencies(&deploy_path),
            "Dependency installation",
        )
        .await?;
        emitter.log("Dependencies installed successfully");

        emitter.log("Setting up environment configuration...");
        let env_file = self
            .deployer
            .templates
            .env_file(&settings, |name| std::env::var(name).ok())?;
        self.session()?
            .write_file(
                env_file.contents.as_bytes(),
                &templates::remote_join(&deploy_path, ".env"),
            )
            .await?;
        if !env_file.skipped.is_empty() {
            emitter.log(format!(
                "Not set locally, left out of .env: {}",
                env_file.skipped.join(", ")
            ));
        }
        emitter.log("Environment configuration created");
        Ok(())
    }

    async fn start_service(&mut self, emitter: &mut ProgressEmitter) -> Result<(), StepFailure> {
        let settings = Arc::clone(&self.deployer.settings);
        emitter.log("Setting up application service...");
        self.checked(&templates::ensure_process_manager(), "Installing PM2")
            .await?;
        self.checked(
            &templates::restart_service(
                &self.config.deploy_path,
                &settings.app_name,
                &settings.entrypoint,
            ),
            "Starting application",
        )
        .await?;
        emitter.log("Application service started with PM2");
        Ok(())
    }

    async fn install_proxy_tooling(&mut self, emitter: &mut ProgressEmitter) -> Result<(), StepFailure> {
        emitter.log("Installing nginx and certbot packages...");
        self.checked(&templates::install_proxy_tooling(), "Installing nginx and certbot")
            .await?;
        self.proxy_tooling_ready = true;
        emitter.log("Nginx and certbot installed");
        Ok(())
    }

    async fn configure_proxy(&mut self, emitter: &mut ProgressEmitter) -> Result<(), StepFailure> {
        if !self.proxy_tooling_ready {
            emitter.log("Setting up nginx reverse proxy...");
            self.install_proxy_tooling(emitter).await?;
        }

        let settings = Arc::clone(&self.deployer.settings);
        let vhost = self
            .deployer
            .templates
            .nginx_vhost(&self.config.domain, settings.app_port)?;
        self.session()?
            .write_file(vhost.as_bytes(), &templates::vhost_path(&settings.app_name))
            .await?;
        emitter.log("Nginx setup script uploaded");

        self.checked(&templates::enable_site(&settings.app_name), "Enabling nginx site")
            .await?;
        self.checked(&templates::test_proxy_config(), "Nginx configuration test")
            .await?;
        self.checked(&templates::reload_proxy(), "Reloading nginx")
            .await?;
        emitter.log("Nginx configuration created and tested");
        Ok(())
    }

    async fn provision_tls(&mut self, emitter: &mut ProgressEmitter) -> Result<(), StepFailure> {
        let domain = self.config.domain.clone();
        let email = self.deployer.settings.acme_email_for(&domain);
        emitter.log("Setting up SSL certificate...");

        let output = self
            .session()?
            .exec(&templates::request_certificate(&domain, &email))
            .await?;
        if !output.success() {
            let detail = match output.stderr.trim() {
                "" => format!("certbot exited with code {}", output.exit_code),
                stderr => excerpt(stderr).to_string(),
            };
            return Err(StepFailure(detail));
        }

        match self.plan.kind {
            DeploymentKind::NginxConfig => emitter.success("SSL certificate installed successfully!"),
            DeploymentKind::Deployment => emitter.log("SSL certificate installed successfully"),
        }
        emitter.log(format!("Website now available at: {}", self.config.live_url()));
        Ok(())
    }

    /// Post-plan housekeeping on the remote side. Failures only show up as log lines.
    async fn finalize_remote(&mut self, emitter: &mut ProgressEmitter) {
        let Ok(session) = self.session() else {
            return;
        };

        match session.exec(&templates::enable_renewal_timer()).await {
            Ok(output) if output.success() => emitter.log("Automatic SSL renewal configured"),
            Ok(output) => emitter.log(format!(
                "Could not enable automatic SSL renewal: {}",
                excerpt(output.stderr.trim())
            )),
            Err(err) => emitter.log(format!("Could not enable automatic SSL renewal: {}", err)),
        }

        if self.plan.includes(Phase::Transferring) {
            let archive = templates::remote_join(
                &self.config.deploy_path,
                &self.deployer.settings.remote_archive_name,
            );
            match session.exec(&templates::remove_file(&archive)).await {
                Ok(output) if output.success() => emitter.log("Cleaned up deployment archive"),
                Ok(output) => tracing::warn!(
                    "Failed to remove remote archive {}: {}",
                    archive,
                    output.stderr.trim()
                ),
                Err(err) => tracing::warn!("Failed to remove remote archive {}: {}", archive, err),
            }
        }
    }

    fn announce_success(&self, emitter: &mut ProgressEmitter) {
        match self.plan.kind {
            DeploymentKind::Deployment => {
                emitter.success(format!(
                    "Deployment completed! Application is now live at {}",
                    self.config.live_url()
                ));
                emitter.log(format!(
                    "Application running on VPS at {}",
                    self.config.deploy_path
                ));
            }
            DeploymentKind::NginxConfig => emitter.success("Nginx and SSL setup completed!"),
        }
    }
}

/// Tail of a command's output, cut on a char boundary.
fn excerpt(text: &str) -> &str {
    if text.len() <= OUTPUT_EXCERPT {
        return text;
    }
    let mut start = text.len() - OUTPUT_EXCERPT;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
