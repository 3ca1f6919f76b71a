use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which orchestration produced a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentKind {
    Deployment,
    NginxConfig,
}

impl DeploymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::NginxConfig => "nginx-config",
        }
    }
}

impl fmt::Display for DeploymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deployment" => Ok(Self::Deployment),
            "nginx-config" => Ok(Self::NginxConfig),
            other => Err(format!("unknown deployment type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown deployment status: {}", other)),
        }
    }
}

// One past deployment attempt, kept for the admin history list
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentHistoryEntry {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: DeploymentKind,
    pub status: DeploymentStatus,
    pub start_time: DateTime<Utc>,
    /// Wall-clock seconds, set once the run reaches a terminal status.
    pub duration: Option<i64>,
}

impl DeploymentHistoryEntry {
    pub fn new(kind: DeploymentKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: DeploymentStatus::Pending,
            start_time: Utc::now(),
            duration: None,
        }
    }

    pub fn apply(&mut self, update: &DeploymentHistoryUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(duration) = update.duration {
            self.duration = Some(duration);
        }
    }
}

/// Partial update of a history entry; absent fields stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentHistoryUpdate {
    pub status: Option<DeploymentStatus>,
    pub duration: Option<i64>,
}

impl DeploymentHistoryUpdate {
    pub fn finished(status: DeploymentStatus, duration: i64) -> Self {
        Self {
            status: Some(status),
            duration: Some(duration),
        }
    }
}
