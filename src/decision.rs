use std::path::Path;

use tracing::info;

use crate::codecs::TargetFormat;
use crate::error::TaskError;
use crate::ffmpeg::probe::{MediaProbe, StreamCodecInfo, StreamSelector};
use crate::quality::EncodeParams;

#[derive(Clone, Debug, PartialEq)]
pub enum VideoMode {
    /// Stream bits copied, only the container tag rewritten.
    Remux,
    Transcode { crf: u8, preset: String, threads: u16 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum AudioMode {
    Absent,
    Copy,
    Transcode { bitrate: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct EncodeDecision {
    pub target: TargetFormat,
    pub video: VideoMode,
    pub audio: AudioMode,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    AlreadyEncoded,
    Encode(EncodeDecision),
}

/// Picks copy/remux/transcode from probed stream codecs. Pure; the
/// probe-driven entry point is [`CodecDecisionEngine::evaluate`].
pub fn decide(
    target: &TargetFormat,
    video: &StreamCodecInfo,
    audio: Option<&StreamCodecInfo>,
    params: &EncodeParams,
    threads: u16,
) -> Decision {
    let video_mode = match (same_codec(target, video), same_tag(target, video)) {
        (true, true) => return Decision::AlreadyEncoded,
        (true, false) => VideoMode::Remux,
        (false, _) => VideoMode::Transcode {
            crf: params.crf,
            preset: params.preset.clone(),
            threads,
        },
    };

    let audio_mode = match audio {
        None => AudioMode::Absent,
        Some(audio) if audio.codec_name.eq_ignore_ascii_case(target.audio) => AudioMode::Copy,
        Some(_) => AudioMode::Transcode {
            bitrate: params.audio_bitrate.clone(),
        },
    };

    Decision::Encode(EncodeDecision {
        target: target.clone(),
        video: video_mode,
        audio: audio_mode,
    })
}

fn same_codec(target: &TargetFormat, video: &StreamCodecInfo) -> bool {
    video.codec_name.eq_ignore_ascii_case(&target.video.to_string())
}

fn same_tag(target: &TargetFormat, video: &StreamCodecInfo) -> bool {
    video.codec_tag.eq_ignore_ascii_case(target.tag())
}

pub struct CodecDecisionEngine {
    pub target: TargetFormat,
    pub threads: u16,
}

impl CodecDecisionEngine {
    pub fn new(target: TargetFormat, threads: u16) -> Self {
        CodecDecisionEngine { target, threads }
    }

    pub fn evaluate(&self, probe: &dyn MediaProbe, path: &Path, params: &EncodeParams) -> Result<Decision, TaskError> {
        let video = probe.stream_codec(path, StreamSelector::Video)?
            .ok_or_else(|| TaskError::probe(&path.to_path_buf(), "no video stream found"))?;

        if same_codec(&self.target, &video) && same_tag(&self.target, &video) {
            info!(path = ?path, codec = %video.codec_name, tag = %video.codec_tag, "already encoded");
            return Ok(Decision::AlreadyEncoded);
        }

        let audio = probe.stream_codec(path, StreamSelector::Audio)?;
        let decision = decide(&self.target, &video, audio.as_ref(), params, self.threads);
        info!(path = ?path, decision = ?decision, "encode decision");
        Ok(decision)
    }
}
