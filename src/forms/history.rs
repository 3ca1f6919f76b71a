use crate::models::{
    DeploymentHistoryEntry, DeploymentHistoryUpdate, DeploymentKind, DeploymentStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_valid::Validate;

/// Body of `POST /api/deployment-history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryForm {
    #[serde(rename = "type")]
    pub kind: DeploymentKind,
    pub status: Option<DeploymentStatus>,
    pub start_time: Option<DateTime<Utc>>,
    #[validate(minimum = 0)]
    pub duration: Option<i64>,
}

impl From<HistoryEntryForm> for DeploymentHistoryEntry {
    fn from(form: HistoryEntryForm) -> Self {
        let mut entry = DeploymentHistoryEntry::new(form.kind);
        entry.status = form.status.unwrap_or_default();
        if let Some(start_time) = form.start_time {
            entry.start_time = start_time;
        }
        entry.duration = form.duration;
        entry
    }
}

/// Body of `PATCH /api/deployment-history/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct HistoryUpdateForm {
    pub status: Option<DeploymentStatus>,
    #[validate(minimum = 0)]
    pub duration: Option<i64>,
}

impl From<HistoryUpdateForm> for DeploymentHistoryUpdate {
    fn from(form: HistoryUpdateForm) -> Self {
        Self {
            status: form.status,
            duration: form.duration,
        }
    }
}
