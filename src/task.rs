use std::fmt::Display;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::quality::QualityProfile;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies an inbound chat message so replies and status edits can be
/// threaded under it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat: String,
    pub message_id: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentKind {
    Video,
    Document,
}

/// A media file as the chat platform knows it. `source` is opaque to the
/// pipeline and only meaningful to the [`crate::chat::ChatClient`].
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub source: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub size: u64,
    pub kind: AttachmentKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Downloading,
    Transcoding,
    ExtractingMetadata,
    Uploading,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_active(&self) -> bool {
        !matches!(self, TaskStatus::Queued | TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Clone, Debug)]
pub struct Task {
    pub id: TaskId,
    pub origin: MessageRef,
    pub attachment: Attachment,
    pub profile: QualityProfile,
    /// Never deleted by the pipeline.
    pub custom_thumbnail: Option<PathBuf>,
    pub status: TaskStatus,
    pub submitted_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: TaskId, origin: MessageRef, attachment: Attachment, profile: QualityProfile) -> Self {
        Task {
            id,
            origin,
            attachment,
            profile,
            custom_thumbnail: None,
            status: TaskStatus::Queued,
            submitted_at: Utc::now(),
        }
    }

    /// Scratch directory name under the work dir. Ids restart with the
    /// process, so the submission time keeps names apart across runs.
    pub fn work_dir_name(&self) -> String {
        format!("task-{}-{}", self.id.0, self.submitted_at.format("%Y%m%dT%H%M%S%3f"))
    }

    pub fn custom_thumbnail(mut self, thumbnail: Option<PathBuf>) -> Self {
        self.custom_thumbnail = thumbnail;
        self
    }
}
