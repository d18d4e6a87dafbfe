use std::fs::{self, File};
use std::io::{BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::chat::{ChatClient, Dispatch, Dispatcher, Inbound, InboundBody, StatusHandle, UploadAttributes};
use crate::error::TaskError;
use crate::fstools::{DirEntryCategory, classify_file, file_size};
use crate::progress::{Phase, ProgressEvent};
use crate::task::{Attachment, AttachmentKind, MessageRef};

const CHUNK_SIZE: usize = 64 * 1024;
pub const CONSOLE_CHAT: &str = "console";

/// A chat platform made of the local terminal: attachments are local paths,
/// uploads land in an outbox directory and messages go to stdout.
pub struct ConsoleChat {
    outbox: PathBuf,
    next_message_id: AtomicU64,
}

impl ConsoleChat {
    pub fn new(outbox: &Path) -> Self {
        ConsoleChat {
            outbox: outbox.to_path_buf(),
            next_message_id: AtomicU64::new(1),
        }
    }

    pub fn next_message_id(&self) -> u64 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl ChatClient for ConsoleChat {
    fn download(&self, attachment: &Attachment, dest_dir: &Path, progress_tx: &Sender<ProgressEvent>) -> Result<PathBuf, TaskError> {
        let source = Path::new(&attachment.source);
        match classify_file(source) {
            DirEntryCategory::RegularFile => (),
            DirEntryCategory::DoesNotExist => return Err(TaskError::Io(format!("{:?} does not exist", source))),
            _ => return Err(TaskError::Io(format!("{:?} is not a regular file", source))),
        }
        let destination = dest_dir.join(&attachment.file_name);
        copy_with_progress(source, &destination, Phase::Download, progress_tx)?;
        Ok(destination)
    }

    fn upload_video(
        &self,
        origin: &MessageRef,
        video: &Path,
        attributes: &UploadAttributes,
        progress_tx: &Sender<ProgressEvent>,
    ) -> Result<(), TaskError> {
        fs::create_dir_all(&self.outbox)?;
        let delivered = self.outbox.join(&attributes.file_name);
        copy_with_progress(video, &delivered, Phase::Upload, progress_tx)?;

        let mut sidecar = attributes.clone();
        if let Some(thumbnail) = &attributes.thumbnail {
            let copied = delivered.with_extension("jpg");
            match fs::copy(thumbnail, &copied) {
                Ok(_) => sidecar.thumbnail = Some(copied),
                Err(err) => {
                    warn!(path = ?thumbnail, error = %err, "unable to deliver thumbnail");
                    sidecar.thumbnail = None;
                },
            }
        }
        let json = serde_json::to_string_pretty(&sidecar).map_err(|err| TaskError::Unknown(err.to_string()))?;
        fs::write(sidecar_path(&delivered), json)?;
        info!(chat = %origin.chat, reply_to = origin.message_id, path = ?delivered, "delivered");
        Ok(())
    }

    fn reply(&self, origin: &MessageRef, text: &str) -> Result<StatusHandle, TaskError> {
        let message_id = self.next_message_id();
        println!("[{} > {}] {}", message_id, origin.message_id, text);
        Ok(StatusHandle { origin: origin.clone(), message_id })
    }

    fn edit(&self, status: &StatusHandle, text: &str) -> Result<(), TaskError> {
        println!("[{}*] {}", status.message_id, text);
        Ok(())
    }
}

fn sidecar_path(delivered: &Path) -> PathBuf {
    let mut name = delivered.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".json");
    delivered.with_file_name(name)
}

fn copy_with_progress(from: &Path, to: &Path, phase: Phase, progress_tx: &Sender<ProgressEvent>) -> Result<u64, TaskError> {
    let total = file_size(from);
    let mut reader = File::open(from)?;
    let mut writer = File::create(to)?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut current = 0u64;
    let _ = progress_tx.send(ProgressEvent::Transfer { phase, current, total });
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n])?;
        current += n as u64;
        let _ = progress_tx.send(ProgressEvent::Transfer { phase, current, total });
    }
    writer.flush()?;
    Ok(current)
}

pub fn mime_for_extension(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_string_lossy().to_lowercase();
    let mime = match extension.as_str() {
        "flv" => "video/x-flv",
        "mp4" => "video/mp4",
        "m3u8" => "application/x-mpegURL",
        "ts" => "video/MP2T",
        "3gp" => "video/3gpp",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "wmv" => "video/x-ms-wmv",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "m4v" => "video/x-m4v",
        "mpg" | "mpeg" => "video/mpeg",
        _ => return None,
    };
    Some(mime)
}

/// Turns one line of console input into an inbound event. A bare path is a
/// submission with no options; `encode <path> [options]` carries options.
pub fn parse_line(line: &str, sender: &str, message_id: u64) -> Option<Inbound> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let word = word.strip_prefix('/').unwrap_or(word);

    let body = match word {
        "help" | "start" | "queue" | "stats" => InboundBody::Command { name: String::from(word), args: String::from(rest) },
        "encode" => {
            let (path, options) = match rest.split_once(char::is_whitespace) {
                Some((path, options)) => (path, Some(String::from(options.trim()))),
                None => (rest, None),
            };
            if path.is_empty() {
                return None;
            }
            InboundBody::Media { attachment: attachment_for(Path::new(path)), options }
        },
        _ => InboundBody::Media { attachment: attachment_for(Path::new(line)), options: None },
    };
    Some(Inbound {
        sender: String::from(sender),
        origin: MessageRef { chat: String::from(CONSOLE_CHAT), message_id },
        body,
    })
}

fn attachment_for(path: &Path) -> Attachment {
    Attachment {
        source: path.to_string_lossy().to_string(),
        file_name: path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
        mime_type: mime_for_extension(path).map(String::from),
        size: file_size(path),
        kind: AttachmentKind::Document,
    }
}

/// Feeds lines from `input` to the dispatcher until end of input or until
/// `stop` is raised. `stop` is only seen once the next line arrives, so a
/// caller reading a terminal runs this on its own thread and waits with
/// [`wait_for_intake`].
pub fn run_intake(input: impl BufRead, chat: &ConsoleChat, sender: &str, dispatcher: &Dispatcher, stop: &AtomicBool) {
    for line in input.lines() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "unable to read input");
                break;
            },
        };
        if let Some(inbound) = parse_line(&line, sender, chat.next_message_id()) {
            let outcome = dispatcher.handle(inbound);
            debug!(outcome = ?outcome, "handled");
            if let Dispatch::Rejected(reason) = outcome {
                info!(reason = %reason, "submission rejected");
            }
        }
    }
}

/// Returns once intake has ended or `stop` is raised, whichever comes first.
/// A stopped intake thread may still be blocked on its read and is left
/// behind.
pub fn wait_for_intake(intake: &JoinHandle<()>, stop: &AtomicBool, poll: Duration) {
    while !intake.is_finished() && !stop.load(Ordering::Relaxed) {
        thread::sleep(poll);
    }
    if !intake.is_finished() {
        info!("stopping with console input still open");
    }
}
