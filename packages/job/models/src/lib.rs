#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Extraction job wire models.
//!
//! The shapes exchanged with the backend's three endpoints
//! (`pdf_to_images`, `extract_pages`, `get_my_extraction_jobs`) and the
//! push-bus progress payload. A job traverses its queue state and its
//! extraction state concurrently; clients treat the extraction state as
//! primary. Both state enums define a monotone ordering so out-of-order
//! updates can be rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Progress values are percentages.
pub const MAX_PROGRESS: u32 = 100;

/// Where a job sits in the work queue.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueueState {
    /// Created, not yet enqueued.
    #[default]
    Pending,
    /// Waiting for a worker.
    Enqueued,
    /// A worker picked the job up.
    Started,
    /// Worker finished cleanly.
    Done,
    /// Worker failed.
    Failed,
    /// The job was cancelled.
    Cancelled,
}

impl QueueState {
    /// No further queue transitions are observed client-side from these
    /// states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Position in the monotone state ordering. Terminal states share the
    /// highest rank; whichever is observed first is absorbing.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Enqueued => 1,
            Self::Started => 2,
            Self::Done | Self::Failed | Self::Cancelled => 3,
        }
    }

    /// Applies an observed update without ever regressing: terminal
    /// states absorb everything, and an update with a lower rank than the
    /// current state is ignored.
    #[must_use]
    pub const fn merge(self, observed: Self) -> Self {
        if self.is_terminal() {
            self
        } else if observed.rank() >= self.rank() {
            observed
        } else {
            self
        }
    }
}

/// Where the extraction itself stands. Clients treat this as the primary
/// state.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExtractionState {
    /// Not started yet.
    #[default]
    Pending,
    /// Pages are being processed.
    Processing,
    /// The result is ready.
    Done,
    /// Extraction failed.
    Error,
}

impl ExtractionState {
    /// No further extraction transitions are observed client-side from
    /// these states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Position in the monotone state ordering.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Done | Self::Error => 2,
        }
    }

    /// Applies an observed update without ever regressing out of a
    /// terminal state or back down the ordering.
    #[must_use]
    pub const fn merge(self, observed: Self) -> Self {
        if self.is_terminal() {
            self
        } else if observed.rank() >= self.rank() {
            observed
        } else {
            self
        }
    }
}

/// A server-side extraction job as returned by the list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Database id, used to locate the job in list responses.
    pub id: i64,
    /// Stable identifier, also the push-bus channel key.
    pub uuid: String,
    /// Queue lifecycle state.
    #[serde(default)]
    pub queue_state: QueueState,
    /// Extraction lifecycle state (primary).
    #[serde(default)]
    pub extraction_state: ExtractionState,
    /// Progress percentage in `[0, 100]`.
    #[serde(default)]
    pub progress: u32,
    /// Human-readable progress message.
    #[serde(default)]
    pub progress_message: String,
    /// Identifier of the step currently running.
    #[serde(default)]
    pub current_step: String,
    /// Error description for failed jobs.
    #[serde(default)]
    pub error_message: String,
    /// Opaque navigation descriptor, parsed lazily on click.
    #[serde(default)]
    pub result_action_json: Option<String>,
    /// Document type code the job was submitted with.
    #[serde(default)]
    pub document_type: String,
    /// URL of the merged source PDF, when the server kept one.
    #[serde(default)]
    pub merged_pdf_url: Option<String>,
    /// Server-side creation timestamp; dashboards sort by it.
    #[serde(default)]
    pub create_date: Option<DateTime<Utc>>,
}

impl Job {
    /// `true` once either lifecycle reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.extraction_state.is_terminal() || self.queue_state.is_terminal()
    }
}

/// A page thumbnail produced by the `pdf_to_images` endpoint. Selection
/// is by `attachment_id`; the URL is for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Server attachment id of the rendered page.
    pub attachment_id: i64,
    /// Thumbnail URL.
    pub url: String,
    /// 1-based page number in the source document.
    pub page_num: i64,
}

/// Request body for `POST pdf_to_images`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfToImagesRequest {
    /// The PDF file contents, base64-encoded.
    pub pdf_file: String,
}

/// Status discriminant of the `pdf_to_images` response.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResponseStatus {
    /// The request succeeded.
    Success,
    /// The request failed; `message` explains why.
    Error,
}

/// Response body of `POST pdf_to_images`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfToImagesResponse {
    /// Whether the conversion succeeded.
    pub status: ResponseStatus,
    /// One entry per rendered page, on success.
    #[serde(default)]
    pub pages: Option<Vec<Page>>,
    /// Error description, on failure.
    #[serde(default)]
    pub message: Option<String>,
}

/// Request body for `POST extract_pages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractPagesRequest {
    /// Attachment ids of the selected pages.
    pub attachment_ids: Vec<i64>,
    /// Document type code chosen by the user.
    pub document_type: String,
    /// Original file name of the upload.
    pub filename: String,
}

/// Response body of `POST extract_pages`, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractPagesResponse {
    /// The job was accepted.
    Success {
        /// Id of the created job.
        job_id: i64,
    },
    /// The submission was rejected.
    Error {
        /// Why the submission was rejected.
        message: String,
    },
}

/// Request body for `POST get_my_extraction_jobs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListJobsRequest {
    /// Number of jobs to skip.
    pub offset: i64,
    /// Page size.
    pub limit: i64,
}

/// Response body of `POST get_my_extraction_jobs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchJobsPage {
    /// The caller's jobs, newest first.
    pub jobs: Vec<Job>,
    /// `true` when another page exists past `offset + limit`.
    pub has_more: bool,
}

/// Payload of the `update_progress` push event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressPayload {
    /// Progress percentage in `[0, 100]`.
    pub progress: u32,
    /// Human-readable progress message.
    #[serde(default)]
    pub message: String,
    /// Identifier of the step currently running.
    #[serde(default)]
    pub step: String,
}
