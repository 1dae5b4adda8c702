use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ExportError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestOutput {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub url: String,
    pub count: usize,
}

/// Bulk Data completion manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportManifest {
    pub transaction_time: DateTime<Utc>,
    pub request: String,
    pub requires_access_token: bool,
    pub output: Vec<ManifestOutput>,
    pub error: Vec<ManifestOutput>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportStatus {
    InProgress { progress: String },
    Completed(ExportManifest),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportJob {
    pub id: Uuid,
    pub application_id: i64,
    pub request: String,
    pub started_at: DateTime<Utc>,
    /// Set once the job completes or fails.
    pub finished_at: Option<DateTime<Utc>>,
    pub status: ExportStatus,
}

/// Export jobs known to this process.
#[derive(Debug, Default)]
pub struct ExportRegistry {
    jobs: Mutex<HashMap<Uuid, ExportJob>>,
}

impl ExportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_jobs<R>(&self, f: impl FnOnce(&mut HashMap<Uuid, ExportJob>) -> R) -> R {
        let mut jobs = match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut jobs)
    }

    /// Registers a new job unless the application already has one running.
    pub fn start(&self, application_id: i64, request: String) -> Result<Uuid, ExportError> {
        self.with_jobs(|jobs| {
            let running = jobs.values().any(|job| {
                job.application_id == application_id
                    && matches!(job.status, ExportStatus::InProgress { .. })
            });
            if running {
                return Err(ExportError::AlreadyRunning);
            }
            let id = Uuid::new_v4();
            jobs.insert(
                id,
                ExportJob {
                    id,
                    application_id,
                    request,
                    started_at: Utc::now(),
                    finished_at: None,
                    status: ExportStatus::InProgress {
                        progress: "Queued".to_string(),
                    },
                },
            );
            Ok(id)
        })
    }

    pub fn get(&self, id: Uuid) -> Option<ExportJob> {
        self.with_jobs(|jobs| jobs.get(&id).cloned())
    }

    fn set_status(&self, id: Uuid, status: ExportStatus) {
        self.with_jobs(|jobs| {
            if let Some(job) = jobs.get_mut(&id) {
                if !matches!(status, ExportStatus::InProgress { .. }) {
                    job.finished_at = Some(Utc::now());
                }
                job.status = status;
            }
        })
    }

    pub fn set_progress(&self, id: Uuid, progress: impl Into<String>) {
        self.set_status(
            id,
            ExportStatus::InProgress {
                progress: progress.into(),
            },
        );
    }

    pub fn complete(&self, id: Uuid, manifest: ExportManifest) {
        self.set_status(id, ExportStatus::Completed(manifest));
    }

    pub fn fail(&self, id: Uuid, message: impl Into<String>) {
        self.set_status(id, ExportStatus::Failed(message.into()));
    }

    /// Drops jobs that finished before `cutoff` and returns their ids.
    /// Running jobs are never evicted.
    pub fn evict_finished(&self, cutoff: DateTime<Utc>) -> Vec<Uuid> {
        self.with_jobs(|jobs| {
            let expired: Vec<Uuid> = jobs
                .values()
                .filter(|job| job.finished_at.is_some_and(|at| at <= cutoff))
                .map(|job| job.id)
                .collect();
            for id in &expired {
                jobs.remove(id);
            }
            expired
        })
    }
}
