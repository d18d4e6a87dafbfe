use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::TaskError;

pub const FALLBACK_WIDTH: u64 = 1280;
pub const FALLBACK_HEIGHT: u64 = 720;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StreamSelector {
    Video,
    Audio,
}

impl StreamSelector {
    pub fn specifier(&self) -> &'static str {
        match self {
            StreamSelector::Video => "v:0",
            StreamSelector::Audio => "a:0",
        }
    }
}

/// Snapshot of one stream's codec, taken once per decision pass.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamCodecInfo {
    pub codec_name: String,
    pub codec_tag: String,
}

impl StreamCodecInfo {
    pub fn new(codec_name: &str, codec_tag: &str) -> Self {
        StreamCodecInfo {
            codec_name: String::from(codec_name),
            codec_tag: String::from(codec_tag),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MediaMetadata {
    pub duration: f64,
    pub width: u64,
    pub height: u64,
}

impl MediaMetadata {
    pub fn fallback() -> Self {
        MediaMetadata {
            duration: 0.0,
            width: FALLBACK_WIDTH,
            height: FALLBACK_HEIGHT,
        }
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration.max(0.0) as u64
    }

    /// Where the thumbnail frame is grabbed from.
    pub fn thumbnail_offset(&self) -> f64 {
        self.duration.max(0.0) / 4.0
    }
}

pub trait MediaProbe: Send + Sync {
    /// `Ok(None)` when the container is readable but has no such stream.
    fn stream_codec(&self, path: &Path, stream: StreamSelector) -> Result<Option<StreamCodecInfo>, TaskError>;

    /// Never fails; missing fields fall back to defaults.
    fn metadata(&self, path: &Path) -> MediaMetadata;
}

#[derive(Deserialize, Debug, Default)]
struct FFProbeJsonOutput {
    #[serde(default)]
    pub streams: Vec<FFProbeJsonStream>,
    pub format: Option<FFProbeJsonFormat>,
}

#[derive(Deserialize, Debug, Default)]
struct FFProbeJsonStream {
    pub codec_name: Option<String>,
    pub codec_tag_string: Option<String>,
    pub width: Option<u64>,
    pub height: Option<u64>,
}

#[derive(Deserialize, Debug)]
struct FFProbeJsonFormat {
    pub duration: Option<String>,
}

pub struct FFprobe {
    program: String,
}

impl FFprobe {
    pub fn new(program: &str) -> Self {
        FFprobe {
            program: String::from(program),
        }
    }

    fn run(&self, path: &Path, stream: StreamSelector, entries: &str) -> Result<String, TaskError> {
        let output = Command::new(&self.program)
            .args(["-v", "error", "-of", "json", "-select_streams", stream.specifier(), "-show_entries", entries])
            .arg(path)
            .output()
            .map_err(|e| TaskError::probe(&PathBuf::from(path), &format!("unable to run {}: {}", self.program, e)))?;
        if output.status.success() {
            String::from_utf8(output.stdout)
                .map_err(|_| TaskError::probe(&PathBuf::from(path), "ffprobe output is not utf-8"))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(TaskError::probe(&PathBuf::from(path), stderr.trim()))
        }
    }
}

impl MediaProbe for FFprobe {
    fn stream_codec(&self, path: &Path, stream: StreamSelector) -> Result<Option<StreamCodecInfo>, TaskError> {
        let json = self.run(path, stream, "stream=codec_name,codec_tag_string")?;
        let info = parse_stream_codec(&json)
            .map_err(|e| TaskError::probe(&PathBuf::from(path), &e.to_string()))?;
        debug!(path = ?path, stream = stream.specifier(), info = ?info, "probed codec");
        Ok(info)
    }

    fn metadata(&self, path: &Path) -> MediaMetadata {
        match self.run(path, StreamSelector::Video, "format=duration:stream=width,height") {
            Ok(json) => parse_metadata(&json),
            Err(err) => {
                warn!(path = ?path, error = %err, "metadata unavailable, using defaults");
                MediaMetadata::fallback()
            },
        }
    }
}

fn parse_stream_codec(json: &str) -> Result<Option<StreamCodecInfo>, serde_json::Error> {
    let deserialized = serde_json::from_str::<FFProbeJsonOutput>(json)?;
    Ok(deserialized.streams.into_iter().next().and_then(|stream| {
        stream.codec_name.map(|codec_name| StreamCodecInfo {
            codec_name,
            codec_tag: stream.codec_tag_string.unwrap_or_default(),
        })
    }))
}

fn parse_metadata(json: &str) -> MediaMetadata {
    let deserialized = serde_json::from_str::<FFProbeJsonOutput>(json).unwrap_or_default();
    let mut metadata = MediaMetadata::fallback();
    if let Some(duration) = deserialized.format.and_then(|f| f.duration).and_then(|d| d.parse::<f64>().ok()) {
        if duration.is_finite() && duration > 0.0 {
            metadata.duration = duration;
        }
    }
    if let Some(stream) = deserialized.streams.first() {
        if let (Some(width), Some(height)) = (stream.width, stream.height) {
            if width > 0 && height > 0 {
                metadata.width = width;
                metadata.height = height;
            }
        }
    }
    metadata
}
