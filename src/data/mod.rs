//! Core data models for the pixelflow client
//!
//! This module contains the types returned by the photo-processing API:
//! processing jobs, their output images, style categories, and the user's
//! credit balance.

pub mod api;

pub use api::ApiClient;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A photo-processing job submitted by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for the job
    pub id: String,
    /// Category/style the photos were processed with
    pub category: String,
    /// Current processing status
    pub status: JobStatus,
    /// When the job was submitted
    pub created_at: DateTime<Utc>,
    /// When the job last changed status
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Credits charged for the job
    #[serde(default)]
    pub credits_used: u32,
    /// Processed output images (empty until completed)
    #[serde(default)]
    pub images: Vec<ProcessedImage>,
    /// Failure reason reported by the backend
    #[serde(default)]
    pub error: Option<String>,
}

impl Job {
    /// Whether the job will not change status any more
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Processing status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be dispatched to the workflow engine
    Pending,
    /// Being processed by the workflow engine
    Processing,
    /// Finished; images are available
    Completed,
    /// Processing failed
    Failed,
}

impl JobStatus {
    /// Whether the status is final
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Short label for display
    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// A processed image produced by a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedImage {
    /// Download URL
    pub url: String,
    /// Original file name, if the backend kept it
    #[serde(default)]
    pub filename: Option<String>,
}

impl ProcessedImage {
    /// File name to save the image under
    ///
    /// Falls back to the last URL path segment, then to `image-<index>.jpg`.
    pub fn file_name(&self, index: usize) -> String {
        self.filename
            .clone()
            .or_else(|| {
                self.url
                    .split('?')
                    .next()
                    .and_then(|path| path.rsplit('/').next())
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("image-{}.jpg", index + 1))
    }
}

/// A processing style users can choose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Longer description of the style
    #[serde(default)]
    pub description: Option<String>,
    /// Credits charged per photo
    #[serde(default)]
    pub credit_cost: u32,
}

/// The user's remaining credits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    /// Credits available
    pub balance: i64,
    /// Currency or unit label, if the backend reports one
    #[serde(default)]
    pub currency: Option<String>,
}
