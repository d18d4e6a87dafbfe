use std::fmt::Display;

use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[serde(skip)]
    Unknown(String),
    AV1,
    HEVC,
    H264,
}

impl Codec {
    /// Encoder passed to `-c:v` when re-encoding into this codec.
    pub fn cv_parameter(&self) -> Option<&'static str> {
        match self {
            Codec::Unknown(_) => None,
            Codec::AV1 => Some("libsvtav1"),
            Codec::HEVC => Some("libx265"),
            Codec::H264 => Some("libx264"),
        }
    }

    /// The MP4 sample entry players expect for this codec.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Codec::Unknown(_) => None,
            Codec::AV1 => Some("av01"),
            Codec::HEVC => Some("hvc1"),
            Codec::H264 => Some("avc1"),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Codec::HEVC => String::from("HEVC"),
            Codec::H264 => String::from("H264"),
            Codec::AV1 => String::from("AV1"),
            Codec::Unknown(codec) => codec.to_uppercase(),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Codec::HEVC
    }
}

impl Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codec::Unknown(codec) => write!(f, "{}", codec.to_lowercase()),
            _ => write!(f, "{}", format!("{:?}", self).to_lowercase()),
        }
    }
}

pub const TARGET_AUDIO_CODEC: &str = "aac";

/// What a finished output must look like: video codec plus its container tag,
/// and the audio codec.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetFormat {
    pub video: Codec,
    pub audio: &'static str,
}

impl TargetFormat {
    pub fn new(video: Codec) -> Self {
        TargetFormat {
            video,
            audio: TARGET_AUDIO_CODEC,
        }
    }

    pub fn tag(&self) -> &'static str {
        self.video.tag().unwrap_or("")
    }
}

impl Default for TargetFormat {
    fn default() -> Self {
        TargetFormat::new(Codec::HEVC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Codec::AV1), "av1");
        assert_eq!(format!("{}", Codec::HEVC), "hevc");
        assert_eq!(format!("{}", Codec::H264), "h264");
        assert_eq!(format!("{}", Codec::Unknown(String::from("MPEG4"))), "mpeg4");
    }

    #[test]
    fn test_tags() {
        assert_eq!(Codec::HEVC.tag(), Some("hvc1"));
        assert_eq!(Codec::H264.tag(), Some("avc1"));
        assert_eq!(Codec::Unknown(String::from("vp9")).tag(), None);
        assert_eq!(TargetFormat::default().tag(), "hvc1");
        assert_eq!(TargetFormat::default().audio, "aac");
    }
}
