use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;

use human_repr::HumanCount;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::progress::ProgressEvent;
use crate::quality::QualityProfile;
use crate::stats::StatsRecorder;
use crate::task::{Attachment, AttachmentKind, MessageRef, Task};
use crate::task_queue::{Admission, TaskQueue, render_queue};

pub const VIDEO_MIME_TYPES: [&str; 12] = [
    "video/x-flv",
    "video/mp4",
    "application/x-mpegURL",
    "video/MP2T",
    "video/3gpp",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-ms-wmv",
    "video/x-matroska",
    "video/webm",
    "video/x-m4v",
    "video/mpeg",
];

/// An editable outbound message.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusHandle {
    pub origin: MessageRef,
    pub message_id: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UploadAttributes {
    pub file_name: String,
    pub duration: u64,
    pub width: u64,
    pub height: u64,
    pub thumbnail: Option<PathBuf>,
    pub supports_streaming: bool,
}

/// The chat platform as the pipeline sees it. Transfers report progress on
/// the given channel and block until done.
pub trait ChatClient: Send + Sync {
    fn download(&self, attachment: &Attachment, dest_dir: &Path, progress_tx: &Sender<ProgressEvent>) -> Result<PathBuf, TaskError>;

    fn upload_video(
        &self,
        origin: &MessageRef,
        video: &Path,
        attributes: &UploadAttributes,
        progress_tx: &Sender<ProgressEvent>,
    ) -> Result<(), TaskError>;

    fn reply(&self, origin: &MessageRef, text: &str) -> Result<StatusHandle, TaskError>;

    fn edit(&self, status: &StatusHandle, text: &str) -> Result<(), TaskError>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum InboundBody {
    Command { name: String, args: String },
    /// `options` is only present when the media was submitted by replying
    /// to it with a command.
    Media { attachment: Attachment, options: Option<String> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Inbound {
    pub sender: String,
    pub origin: MessageRef,
    pub body: InboundBody,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Dispatch {
    Replied,
    Enqueued(Admission),
    Rejected(String),
    Ignored,
}

/// Routes inbound events: help for anyone, everything else for operators.
pub struct Dispatcher {
    operators: HashSet<String>,
    queue: Arc<TaskQueue>,
    stats: Arc<StatsRecorder>,
    chat: Arc<dyn ChatClient>,
}

impl Dispatcher {
    pub fn new(operators: &[String], queue: Arc<TaskQueue>, stats: Arc<StatsRecorder>, chat: Arc<dyn ChatClient>) -> Self {
        Dispatcher {
            operators: operators.iter().cloned().collect(),
            queue,
            stats,
            chat,
        }
    }

    pub fn is_operator(&self, sender: &str) -> bool {
        self.operators.contains(sender)
    }

    pub fn handle(&self, inbound: Inbound) -> Dispatch {
        match inbound.body {
            InboundBody::Command { ref name, .. } if name == "start" || name == "help" => {
                self.reply(&inbound.origin, &format!("Hey {}\nSend me a video and I will re-encode it.", inbound.sender))
            },
            _ if !self.is_operator(&inbound.sender) => {
                warn!(sender = %inbound.sender, "ignoring message from unknown sender");
                Dispatch::Ignored
            },
            InboundBody::Command { ref name, .. } => match name.as_str() {
                "queue" => self.reply(&inbound.origin, &render_queue(&self.queue.peek_all())),
                "stats" => self.reply(&inbound.origin, &self.stats.render(self.queue.len())),
                _ => {
                    debug!(command = %name, "unknown command");
                    Dispatch::Ignored
                },
            },
            InboundBody::Media { attachment, options } => self.submit(inbound.origin, attachment, options),
        }
    }

    fn submit(&self, origin: MessageRef, attachment: Attachment, options: Option<String>) -> Dispatch {
        if let Err(err) = validate_attachment(&attachment) {
            info!(file = %attachment.file_name, error = %err, "rejected submission");
            self.reply(&origin, "Invalid video format!\nMake sure it is a supported video file.");
            return Dispatch::Rejected(err.to_string());
        }

        let size = attachment.size;
        let options = options.unwrap_or_default();
        let task = Task::new(self.queue.next_id(), origin.clone(), attachment, QualityProfile::parse(&options))
            .custom_thumbnail(thumbnail_option(&options));
        self.reply(&origin, "Added to queue");
        let admission = self.queue.enqueue(task);
        info!(admission = ?admission, size = %size.human_count_bytes(), "submission accepted");
        Dispatch::Enqueued(admission)
    }

    fn reply(&self, origin: &MessageRef, text: &str) -> Dispatch {
        if let Err(err) = self.chat.reply(origin, text) {
            warn!(error = %err, "unable to reply");
        }
        Dispatch::Replied
    }
}

/// Documents must carry a known video MIME type; native videos pass.
pub fn validate_attachment(attachment: &Attachment) -> Result<(), TaskError> {
    match attachment.kind {
        AttachmentKind::Video => Ok(()),
        AttachmentKind::Document => match &attachment.mime_type {
            Some(mime) if VIDEO_MIME_TYPES.contains(&mime.as_str()) => Ok(()),
            Some(mime) => Err(TaskError::Validation(format!("unsupported format {}", mime))),
            None => Err(TaskError::Validation(String::from("unknown format"))),
        },
    }
}

/// `thumb=<path>` names a caller-supplied thumbnail.
fn thumbnail_option(options: &str) -> Option<PathBuf> {
    options.split_whitespace()
        .find_map(|word| word.strip_prefix("thumb="))
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}
