use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::codecs::{Codec, TargetFormat};
use crate::containers::Container;
use crate::error::ConfigError;
use crate::quality::{DEFAULT_AUDIO_BITRATE, DEFAULT_CRF, DEFAULT_PRESET, EncodeParams, parse_bitrate, preset_for};

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["./encode-bot.toml", "/etc/encode-bot/config.toml"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Senders allowed to submit work and query the bot.
    #[serde(default)]
    pub operators: Vec<String>,

    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub console: ConsoleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            operators: vec![],
            work_dir: default_work_dir(),
            encoder: EncoderConfig::default(),
            defaults: DefaultsConfig::default(),
            progress: ProgressConfig::default(),
            console: ConsoleConfig::default(),
        }
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncoderConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,

    #[serde(default = "default_threads")]
    pub threads: u16,

    #[serde(default)]
    pub target: Codec,

    #[serde(default)]
    pub container: Container,

    /// Replace an output left over from an earlier run instead of skipping.
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            threads: default_threads(),
            target: Codec::default(),
            container: Container::default(),
            overwrite: true,
        }
    }
}

impl EncoderConfig {
    pub fn target_format(&self) -> TargetFormat {
        TargetFormat::new(self.target.clone())
    }
}

fn default_ffmpeg() -> String {
    String::from("ffmpeg")
}

fn default_ffprobe() -> String {
    String::from("ffprobe")
}

fn default_threads() -> u16 {
    8
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_crf")]
    pub crf: u8,

    #[serde(default = "default_preset")]
    pub preset: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        DefaultsConfig {
            crf: DEFAULT_CRF,
            preset: default_preset(),
            audio_bitrate: default_audio_bitrate(),
        }
    }
}

impl DefaultsConfig {
    pub fn params(&self) -> EncodeParams {
        EncodeParams {
            crf: self.crf,
            preset: self.preset.clone(),
            audio_bitrate: parse_bitrate(&self.audio_bitrate).unwrap_or_else(|| String::from(DEFAULT_AUDIO_BITRATE)),
        }
    }
}

fn default_crf() -> u8 {
    DEFAULT_CRF
}

fn default_preset() -> String {
    String::from(DEFAULT_PRESET)
}

fn default_audio_bitrate() -> String {
    String::from(DEFAULT_AUDIO_BITRATE)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressConfig {
    /// Minimum seconds between two status edits within one phase.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        ProgressConfig {
            interval_secs: default_interval_secs(),
        }
    }
}

impl ProgressConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_interval_secs() -> u64 {
    5
}

/// The local stand-in for a chat platform.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// Sender name attached to every line read from stdin.
    #[serde(default = "default_operator")]
    pub operator: String,

    /// Where "uploaded" videos are delivered.
    #[serde(default = "default_outbox")]
    pub outbox: PathBuf,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            operator: default_operator(),
            outbox: default_outbox(),
        }
    }
}

fn default_operator() -> String {
    String::from("operator")
}

fn default_outbox() -> PathBuf {
    PathBuf::from("./outbox")
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let config: Config = toml::from_str(&content)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    validate_config(&config)?;
    debug!(path = ?path, "loaded config");
    Ok(config)
}

/// Loads `custom_path`, else the first default location that exists, else
/// built-in defaults.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = custom_path {
        return load_config(path);
    }
    for path in DEFAULT_CONFIG_PATHS.iter().map(Path::new) {
        if path.exists() {
            return load_config(path);
        }
    }
    Ok(Config::default())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if let Codec::Unknown(name) = &config.encoder.target {
        return Err(ConfigError::Invalid(format!("unsupported target codec {}", name)));
    }
    if config.progress.interval_secs == 0 {
        return Err(ConfigError::Invalid(String::from("progress.interval_secs cannot be 0")));
    }
    if config.encoder.threads == 0 {
        return Err(ConfigError::Invalid(String::from("encoder.threads cannot be 0")));
    }
    if config.defaults.crf > 51 {
        return Err(ConfigError::Invalid(format!("defaults.crf {} is out of range 0-51", config.defaults.crf)));
    }
    if preset_for(&config.encoder.target, &config.defaults.preset).is_none() {
        return Err(ConfigError::Invalid(format!(
            "defaults.preset {:?} is not usable with {}", config.defaults.preset, config.encoder.target)));
    }
    if parse_bitrate(&config.defaults.audio_bitrate).is_none() {
        return Err(ConfigError::Invalid(format!("defaults.audio_bitrate {:?} is not <n>k", config.defaults.audio_bitrate)));
    }
    if config.operators.is_empty() {
        warn!("no operators configured; only help will be answered");
    }
    Ok(())
}
