#![allow(dead_code)]

use async_trait::async_trait;
use deployer::configuration::{AuthSettings, DeploySettings, Settings};
use deployer::db::{HistoryStore, MemoryHistoryStore};
use deployer::deploy::{BuildOutput, Deployer, Package, ProgressEvent, Workspace, WorkspaceError};
use deployer::helpers::ssh_client::{
    CommandOutput, RemoteConnector, RemoteSession, SshCredentials, SshError, SshTarget,
};
use deployer::startup::{run, AppServices};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const ADMIN_TOKEN: &str = "test-admin-token";

pub struct TestApp {
    pub address: String,
    pub remote: FakeRemote,
    pub history: Arc<dyn HistoryStore>,
    pub build_gate: Arc<Notify>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        reqwest::Client::new()
            .post(self.url(path))
            .bearer_auth(ADMIN_TOKEN)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        reqwest::Client::new()
            .get(self.url(path))
            .bearer_auth(ADMIN_TOKEN)
    }

    pub async fn in_progress(&self) -> bool {
        let body: serde_json::Value = self
            .get("/api/deploy/status")
            .send()
            .await
            .expect("Failed to execute request.")
            .json()
            .await
            .expect("status body is json");
        body["inProgress"].as_bool().expect("inProgress is a bool")
    }
}

pub fn deploy_body() -> serde_json::Value {
    serde_json::json!({
        "host": "203.0.113.7",
        "username": "root",
        "domain": "example.com"
    })
}

/// Read a streamed response to the end and parse every line.
pub async fn read_events(response: reqwest::Response) -> Vec<ProgressEvent> {
    let body = response.text().await.expect("stream body");
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("each line is an event"))
        .collect()
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(false).await
}

/// `gated` holds every build until `build_gate` is notified.
pub async fn spawn_app_with(gated: bool) -> TestApp {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let settings = Settings {
        app_port: port,
        app_host: "127.0.0.1".to_string(),
        auth: AuthSettings {
            admin_token: ADMIN_TOKEN.to_string(),
        },
        database: None,
        deploy: DeploySettings {
            forwarded_env: vec![],
            ..DeploySettings::default()
        },
    };

    let remote = FakeRemote::default();
    let build_gate = Arc::new(Notify::new());
    let workspace = FakeWorkspace::new(gated.then(|| Arc::clone(&build_gate)));
    let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::new());

    let deployer = Deployer::new(
        settings.deploy.clone(),
        Arc::clone(&history),
        Arc::new(remote.clone()),
        Arc::new(workspace),
    )
    .expect("templates load")
    .with_credentials(SshCredentials::Password("hunter2".to_string()));

    let server = run(
        listener,
        settings,
        AppServices {
            deployer,
            history: Arc::clone(&history),
        },
    )
    .await
    .expect("Failed to bind address.");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        remote,
        history,
        build_gate,
    }
}

#[derive(Debug, Default)]
pub struct RemoteLog {
    pub commands: Vec<String>,
    pub uploads: Vec<String>,
    pub writes: Vec<(String, String)>,
    pub connects: usize,
    pub disconnects: usize,
}

/// Scripted SSH side: every command succeeds unless it matches a failure rule.
#[derive(Clone, Default)]
pub struct FakeRemote {
    log: Arc<Mutex<RemoteLog>>,
    failures: Arc<Mutex<Vec<(String, u32, String)>>>,
    refuse_connections: Arc<Mutex<Option<String>>>,
    connect_gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl FakeRemote {
    pub fn fail_on(&self, needle: &str, exit_code: u32, stderr: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((needle.to_string(), exit_code, stderr.to_string()));
    }

    pub fn refuse_connections(&self, reason: &str) {
        *self.refuse_connections.lock().unwrap() = Some(reason.to_string());
    }

    /// Hold every `connect` until the returned gate is notified.
    pub fn hold_connections(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.connect_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().commands.clone()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.log.lock().unwrap().uploads.clone()
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().writes.clone()
    }

    pub fn connects(&self) -> usize {
        self.log.lock().unwrap().connects
    }

    pub fn disconnects(&self) -> usize {
        self.log.lock().unwrap().disconnects
    }
}

#[async_trait]
impl RemoteConnector for FakeRemote {
    async fn connect(
        &self,
        _target: &SshTarget,
        _credentials: &SshCredentials,
    ) -> Result<Box<dyn RemoteSession>, SshError> {
        let gate = self.connect_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let refused = self.refuse_connections.lock().unwrap().clone();
        if let Some(reason) = refused {
            return Err(SshError::Connection(reason));
        }
        self.log.lock().unwrap().connects += 1;
        Ok(Box::new(FakeSession {
            remote: self.clone(),
        }))
    }
}

struct FakeSession {
    remote: FakeRemote,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn exec(&self, command: &str) -> Result<CommandOutput, SshError> {
        self.remote
            .log
            .lock()
            .unwrap()
            .commands
            .push(command.to_string());

        let failures = self.remote.failures.lock().unwrap().clone();
        if let Some((_, exit_code, stderr)) = failures
            .into_iter()
            .find(|(needle, _, _)| command.contains(needle.as_str()))
        {
            return Ok(CommandOutput {
                exit_code,
                stdout: String::new(),
                stderr,
            });
        }

        let stdout = if command == "whoami" {
            "root\n".to_string()
        } else {
            String::new()
        };
        Ok(CommandOutput {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        })
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<u64, SshError> {
        let size = tokio::fs::metadata(local_path).await?.len();
        self.remote
            .log
            .lock()
            .unwrap()
            .uploads
            .push(remote_path.to_string());
        Ok(size)
    }

    async fn write_file(&self, contents: &[u8], remote_path: &str) -> Result<(), SshError> {
        self.remote.log.lock().unwrap().writes.push((
            remote_path.to_string(),
            String::from_utf8_lossy(contents).into_owned(),
        ));
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), SshError> {
        self.remote.log.lock().unwrap().disconnects += 1;
        Ok(())
    }
}

/// Local side without npm: the build is instant (or gated) and the package is a small file.
pub struct FakeWorkspace {
    dir: tempfile::TempDir,
    gate: Option<Arc<Notify>>,
}

impl FakeWorkspace {
    pub fn new(gate: Option<Arc<Notify>>) -> Self {
        Self {
            dir: tempfile::tempdir().expect("temp dir"),
            gate,
        }
    }
}

#[async_trait]
impl Workspace for FakeWorkspace {
    async fn build(&self) -> Result<BuildOutput, WorkspaceError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(BuildOutput {
            stdout: "built".to_string(),
            stderr: String::new(),
        })
    }

    async fn package(&self, run_id: u64) -> Result<Package, WorkspaceError> {
        let path = self.dir.path().join(format!("deployment-{}.tar.gz", run_id));
        tokio::fs::write(&path, b"archive").await?;
        Ok(Package { path, size: 7 })
    }

    async fn cleanup(&self, package: &Package) {
        let _ = tokio::fs::remove_file(&package.path).await;
    }
}
