use crate::codecs::Codec;

pub const DEFAULT_CRF: u8 = 28;
pub const DEFAULT_PRESET: &str = "medium";
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

const X26X_PRESETS: [&str; 10] = [
    "ultrafast", "superfast", "veryfast", "faster", "fast",
    "medium", "slow", "slower", "veryslow", "placebo",
];

const SVT_MAX_PRESET: u8 = 13;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Quality {
    Insane,
    Excellent,
    Great,
    Good,
    Fast,
}

impl Quality {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "insane" => Some(Quality::Insane),
            "excellent" => Some(Quality::Excellent),
            "great" => Some(Quality::Great),
            "good" => Some(Quality::Good),
            "fast" => Some(Quality::Fast),
            _ => None,
        }
    }

    /// Rate factor and preset for a tier, per target codec.
    pub fn parameters(codec: &Codec, quality: Quality) -> (u8, String) {
        let (crf, preset) = match codec {
            Codec::AV1 => av1_parameters(quality),
            Codec::H264 => h264_parameters(quality),
            Codec::HEVC | Codec::Unknown(_) => hevc_parameters(quality),
        };
        (crf, String::from(preset))
    }
}

fn av1_parameters(quality: Quality) -> (u8, &'static str) {
    match quality {
        Quality::Insane => (8, "2"),
        Quality::Excellent => (18, "2"),
        Quality::Great => (22, "3"),
        Quality::Good => (25, "8"),
        Quality::Fast => (25, "12"),
    }
}

fn hevc_parameters(quality: Quality) -> (u8, &'static str) {
    match quality {
        Quality::Insane => (18, "veryslow"),
        Quality::Excellent => (20, "slower"),
        Quality::Great => (25, "medium"),
        Quality::Good => (28, "fast"),
        Quality::Fast => (30, "veryfast"),
    }
}

fn h264_parameters(quality: Quality) -> (u8, &'static str) {
    match quality {
        Quality::Insane => (8, "veryslow"),
        Quality::Excellent => (16, "slower"),
        Quality::Great => (18, "medium"),
        Quality::Good => (22, "fast"),
        Quality::Fast => (24, "veryfast"),
    }
}

/// What the submitter asked for: a named tier, or explicit values.
/// Explicit values that are absent fall back to the configured defaults.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QualityProfile {
    pub tier: Option<Quality>,
    pub crf: Option<u8>,
    pub preset: Option<String>,
    pub audio_bitrate: Option<String>,
}

impl QualityProfile {
    /// Parses `crf=<int> preset=<name> audio=<n>k quality=<tier>`. Anything
    /// unrecognised or malformed is dropped so the default applies.
    pub fn parse(options: &str) -> Self {
        let mut profile = QualityProfile::default();
        for word in options.split_whitespace() {
            let parts: Vec<&str> = word.splitn(2, '=').collect();
            if parts.len() != 2 {
                continue;
            }
            let value = parts[1];
            match parts[0].to_lowercase().as_str() {
                "crf" => profile.crf = value.parse::<u8>().ok().filter(|crf| *crf <= 51).or(profile.crf),
                "preset" => profile.preset = parse_preset(value).or(profile.preset.take()),
                "audio" => profile.audio_bitrate = parse_bitrate(value).or(profile.audio_bitrate.take()),
                "quality" => profile.tier = Quality::from_str(value).or(profile.tier),
                _ => (),
            }
        }
        profile
    }

    pub fn resolve(&self, codec: &Codec, defaults: &EncodeParams) -> EncodeParams {
        let (tier_crf, tier_preset) = match self.tier {
            Some(tier) => {
                let (crf, preset) = Quality::parameters(codec, tier);
                (Some(crf), Some(preset))
            },
            None => (None, None),
        };
        // first candidate the target's encoder accepts wins
        let preset = [self.preset.as_deref(), tier_preset.as_deref(), Some(defaults.preset.as_str())]
            .into_iter()
            .flatten()
            .find_map(|preset| preset_for(codec, preset))
            .unwrap_or_else(|| String::from(default_preset(codec)));
        EncodeParams {
            crf: self.crf.or(tier_crf).unwrap_or(defaults.crf),
            preset,
            audio_bitrate: self.audio_bitrate.clone().unwrap_or_else(|| defaults.audio_bitrate.clone()),
        }
    }
}

/// Concrete values handed to the encoder.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeParams {
    pub crf: u8,
    pub preset: String,
    pub audio_bitrate: String,
}

impl Default for EncodeParams {
    fn default() -> Self {
        EncodeParams {
            crf: DEFAULT_CRF,
            preset: String::from(DEFAULT_PRESET),
            audio_bitrate: String::from(DEFAULT_AUDIO_BITRATE),
        }
    }
}

fn parse_preset(value: &str) -> Option<String> {
    let lower = value.to_lowercase();
    if X26X_PRESETS.contains(&lower.as_str()) || lower.parse::<u8>().is_ok_and(|p| p <= SVT_MAX_PRESET) {
        Some(lower)
    } else {
        None
    }
}

/// Closest SVT-AV1 preset for an x26x preset name.
fn svt_preset_for(name: &str) -> Option<&'static str> {
    let preset = match name {
        "placebo" => "1",
        "veryslow" => "2",
        "slower" => "3",
        "slow" => "4",
        "medium" => "6",
        "fast" => "8",
        "faster" => "9",
        "veryfast" => "10",
        "superfast" => "11",
        "ultrafast" => "12",
        _ => return None,
    };
    Some(preset)
}

pub fn default_preset(codec: &Codec) -> &'static str {
    match codec {
        Codec::AV1 => "6",
        _ => DEFAULT_PRESET,
    }
}

/// `preset` in the form the codec's encoder takes: SVT-AV1 wants a number
/// up to 13 (x26x names are translated), x264/x265 want a name. `None`
/// when there is no sensible translation.
pub fn preset_for(codec: &Codec, preset: &str) -> Option<String> {
    let lower = preset.to_lowercase();
    match codec {
        Codec::AV1 => match lower.parse::<u8>() {
            Ok(number) if number <= SVT_MAX_PRESET => Some(number.to_string()),
            Ok(_) => None,
            Err(_) => svt_preset_for(&lower).map(String::from),
        },
        _ => X26X_PRESETS.contains(&lower.as_str()).then_some(lower),
    }
}

pub fn parse_bitrate(value: &str) -> Option<String> {
    let lower = value.to_lowercase();
    let digits = lower.strip_suffix('k')?;
    match digits.parse::<u32>() {
        Ok(kbps) if kbps > 0 => Some(format!("{}k", kbps)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_explicit_options() {
        let profile = QualityProfile::parse("crf=30 preset=fast audio=96k");
        assert_eq!(profile.crf, Some(30));
        assert_eq!(profile.preset.as_deref(), Some("fast"));
        assert_eq!(profile.audio_bitrate.as_deref(), Some("96k"));
        assert_eq!(profile.tier, None);
    }

    #[test]
    fn test_parse_ignores_malformed() {
        let profile = QualityProfile::parse("crf=abc crf=99 preset=warp audio=128 bogus=1 loose");
        assert_eq!(profile, QualityProfile::default());
        assert_eq!(profile.resolve(&Codec::HEVC, &EncodeParams::default()), EncodeParams {
            crf: 28,
            preset: String::from("medium"),
            audio_bitrate: String::from("128k"),
        });
    }

    #[test]
    fn test_tier_yields_to_explicit() {
        let profile = QualityProfile::parse("quality=fast crf=21");
        let params = profile.resolve(&Codec::HEVC, &EncodeParams::default());
        assert_eq!(params.crf, 21);
        assert_eq!(params.preset, "veryfast");
        assert_eq!(params.audio_bitrate, "128k");
    }

    #[test]
    fn test_tier_tables() {
        assert_eq!(Quality::parameters(&Codec::HEVC, Quality::Great), (25, String::from("medium")));
        assert_eq!(Quality::parameters(&Codec::AV1, Quality::Fast), (25, String::from("12")));
        assert_eq!(Quality::parameters(&Codec::H264, Quality::Excellent), (16, String::from("slower")));
    }

    #[test]
    fn test_presets_fit_the_target_encoder() {
        let accepted = |codec: &Codec, preset: &str| match codec {
            Codec::AV1 => preset.parse::<u8>().is_ok_and(|p| p <= 13),
            _ => X26X_PRESETS.contains(&preset),
        };
        let options = ["", "preset=fast", "preset=5", "preset=ultrafast", "quality=insane", "quality=fast preset=12"];
        for codec in [Codec::AV1, Codec::HEVC, Codec::H264] {
            for option in options {
                let params = QualityProfile::parse(option).resolve(&codec, &EncodeParams::default());
                assert!(accepted(&codec, params.preset.as_str()), "{} gave preset {:?} for {}", option, params.preset, codec);
            }
        }
    }

    #[test]
    fn test_preset_translation() {
        let defaults = EncodeParams::default();
        assert_eq!(QualityProfile::default().resolve(&Codec::AV1, &defaults).preset, "6");
        assert_eq!(QualityProfile::parse("preset=fast").resolve(&Codec::AV1, &defaults).preset, "8");
        assert_eq!(QualityProfile::parse("preset=5").resolve(&Codec::AV1, &defaults).preset, "5");
        // a number means nothing to x265, so the default stands
        assert_eq!(QualityProfile::parse("preset=5").resolve(&Codec::HEVC, &defaults).preset, "medium");
        assert_eq!(QualityProfile::parse("quality=great preset=5").resolve(&Codec::HEVC, &defaults).preset, "medium");
        assert_eq!(QualityProfile::parse("quality=good").resolve(&Codec::AV1, &defaults).preset, "8");
        assert_eq!(preset_for(&Codec::AV1, "14"), None);
        assert_eq!(preset_for(&Codec::H264, "Slow"), Some(String::from("slow")));
    }

    #[test]
    fn test_parse_bitrate() {
        assert_eq!(parse_bitrate("192K"), Some(String::from("192k")));
        assert_eq!(parse_bitrate("0k"), None);
        assert_eq!(parse_bitrate("k"), None);
    }
}
