//! SSH client for deployment targets
//!
//! Uses russh to open one authenticated session per run, execute commands
//! (exit code, stdout and stderr are all collected) and stream files to the
//! remote host over an exec channel.

use async_trait::async_trait;
use russh::client::{Config, Handle};
use russh::keys::{decode_secret_key, ssh_key, PrivateKeyWithHashAlg};
use russh::{ChannelMsg, Disconnect};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::time::timeout;

pub const SSH_PORT: u16 = 22;

#[derive(Debug, thiserror::Error)]
pub enum SshError {
    #[error("No SSH credentials provided. Please set SSH_PASSWORD or SSH_PRIVATE_KEY")]
    MissingCredentials,
    #[error("Invalid SSH key: {0}")]
    InvalidKey(String),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Connection timed out after {} seconds", .0.as_secs())]
    ConnectTimeout(Duration),
    #[error("Authentication failed for user {0}")]
    AuthenticationFailed(String),
    #[error("Command '{command}' timed out after {} seconds", .after.as_secs())]
    CommandTimeout { command: String, after: Duration },
    #[error("Channel closed before '{0}' reported an exit status")]
    ChannelClosed(String),
    #[error("Transfer to {path} failed: {reason}")]
    Transfer { path: String, reason: String },
    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Secrets used to authenticate the remote session.
#[derive(Clone, PartialEq, Eq)]
pub enum SshCredentials {
    Password(String),
    PrivateKey(String),
}

impl fmt::Debug for SshCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Password(_) => "SshCredentials::Password(<redacted>)",
            Self::PrivateKey(_) => "SshCredentials::PrivateKey(<redacted>)",
        })
    }
}

impl SshCredentials {
    /// `SSH_PASSWORD` wins over `SSH_PRIVATE_KEY` when both are set.
    pub fn from_env() -> Result<Self, SshError> {
        Self::resolve(
            std::env::var("SSH_PASSWORD").ok(),
            std::env::var("SSH_PRIVATE_KEY").ok(),
        )
    }

    pub fn resolve(password: Option<String>, private_key: Option<String>) -> Result<Self, SshError> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        if let Some(password) = non_empty(password) {
            return Ok(Self::Password(password));
        }
        non_empty(private_key)
            .map(Self::PrivateKey)
            .ok_or(SshError::MissingCredentials)
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::Password(_) => "password",
            Self::PrivateKey(_) => "private key",
        }
    }
}

/// Where and how long to talk to the remote host.
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: SSH_PORT,
            username: username.into(),
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(600),
        }
    }

    pub fn connect_timeout(mut self, after: Duration) -> Self {
        self.connect_timeout = after;
        self
    }

    pub fn command_timeout(mut self, after: Duration) -> Self {
        self.command_timeout = after;
        self
    }
}

/// Result of a remote command. Non-zero exit is not an error at this level.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Opens remote sessions.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(
        &self,
        target: &SshTarget,
        credentials: &SshCredentials,
    ) -> Result<Box<dyn RemoteSession>, SshError>;
}

/// One authenticated session. `disconnect` consumes it, so it runs at most once.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn exec(&self, command: &str) -> Result<CommandOutput, SshError>;

    /// Stream a local file to `remote_path`, returning the number of bytes sent.
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<u64, SshError>;

    /// Create or replace `remote_path` with `contents`.
    async fn write_file(&self, contents: &[u8], remote_path: &str) -> Result<(), SshError>;

    async fn disconnect(self: Box<Self>) -> Result<(), SshError>;
}

/// SSH client handler for russh
struct ClientHandler;

impl russh::client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Target hosts are operator supplied and not pinned
        Ok(true)
    }
}

/// Production connector backed by russh.
#[derive(Debug, Default, Clone)]
pub struct RusshConnector;

#[async_trait]
impl RemoteConnector for RusshConnector {
    async fn connect(
        &self,
        target: &SshTarget,
        credentials: &SshCredentials,
    ) -> Result<Box<dyn RemoteSession>, SshError> {
        let config = Arc::new(Config {
            inactivity_timeout: Some(target.command_timeout),
            ..Default::default()
        });

        tracing::info!(
            host = %target.host,
            port = target.port,
            username = %target.username,
            method = credentials.method(),
            "Connecting over SSH"
        );

        let handle = timeout(
            target.connect_timeout,
            connect_and_auth(config, target, credentials),
        )
        .await
        .map_err(|_| SshError::ConnectTimeout(target.connect_timeout))??;

        tracing::info!("SSH connection established");
        Ok(Box::new(RusshSession {
            handle,
            command_timeout: target.command_timeout,
        }))
    }
}

async fn connect_and_auth(
    config: Arc<Config>,
    target: &SshTarget,
    credentials: &SshCredentials,
) -> Result<Handle<ClientHandler>, SshError> {
    let mut handle = russh::client::connect(
        config,
        (target.host.as_str(), target.port),
        ClientHandler,
    )
    .await
    .map_err(|e| SshError::Connection(e.to_string()))?;

    let result = match credentials {
        SshCredentials::Password(password) => {
            handle
                .authenticate_password(target.username.as_str(), password.as_str())
                .await?
        }
        SshCredentials::PrivateKey(pem) => {
            let key = decode_secret_key(pem, None)
                .map_err(|e| SshError::InvalidKey(e.to_string()))?;
            let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
            handle
                .authenticate_publickey(
                    target.username.as_str(),
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await?
        }
    };

    if !result.success() {
        return Err(SshError::AuthenticationFailed(target.username.clone()));
    }

    Ok(handle)
}

struct RusshSession {
    handle: Handle<ClientHandler>,
    command_timeout: Duration,
}

impl RusshSession {
    async fn run(&self, command: &str, input: Option<&mut (dyn AsyncRead + Unpin + Send)>) -> Result<CommandOutput, SshError> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        if let Some(input) = input {
            channel.data(input).await?;
            channel.eof().await?;
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut got_eof = false;

        let read = timeout(self.command_timeout, async {
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
                    // ext 1 is stderr
                    Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                        stderr.extend_from_slice(&data)
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        exit_code = Some(exit_status);
                        if got_eof {
                            break;
                        }
                    }
                    Some(ChannelMsg::Eof) => {
                        got_eof = true;
                        if exit_code.is_some() {
                            break;
                        }
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                }
            }
        })
        .await;

        let _ = channel.close().await;

        if read.is_err() {
            tracing::warn!("Command '{}' timed out", command);
            return Err(SshError::CommandTimeout {
                command: command.to_string(),
                after: self.command_timeout,
            });
        }

        let exit_code = exit_code.ok_or_else(|| SshError::ChannelClosed(command.to_string()))?;

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }

    async fn pipe_to(
        &self,
        input: &mut (dyn AsyncRead + Unpin + Send),
        remote_path: &str,
    ) -> Result<(), SshError> {
        let command = format!("cat > {}", shell_words::quote(remote_path));
        let output = self.run(&command, Some(input)).await?;
        if !output.success() {
            return Err(SshError::Transfer {
                path: remote_path.to_string(),
                reason: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for RusshSession {
    async fn exec(&self, command: &str) -> Result<CommandOutput, SshError> {
        tracing::debug!("Executing remote command: {}", command);
        self.run(command, None).await
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<u64, SshError> {
        let mut file = tokio::fs::File::open(local_path).await?;
        let size = file.metadata().await?.len();
        self.pipe_to(&mut file, remote_path).await?;
        tracing::info!(size, remote_path, "Uploaded {}", local_path.display());
        Ok(size)
    }

    async fn write_file(&self, contents: &[u8], remote_path: &str) -> Result<(), SshError> {
        let mut reader = contents;
        self.pipe_to(&mut reader, remote_path).await
    }

    async fn disconnect(self: Box<Self>) -> Result<(), SshError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        tracing::info!("SSH session closed");
        Ok(())
    }
}
