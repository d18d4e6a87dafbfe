use std::path::PathBuf;

/// Everything that can end a task early. Rendered verbatim into the
/// failure status message, never propagated past the task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{0}")]
    Validation(String),

    #[error("unable to probe {path:?}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("{}", transcode_message(.code, .detail))]
    Transcode { code: Option<i32>, detail: String },

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    Unknown(String),
}

impl TaskError {
    pub fn probe(path: &PathBuf, reason: &str) -> Self {
        TaskError::Probe {
            path: path.clone(),
            reason: String::from(reason),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Validation(_) => "ValidationError",
            TaskError::Probe { .. } => "ProbeError",
            TaskError::Transcode { .. } => "TranscodeError",
            TaskError::Io(_) => "IOError",
            TaskError::Unknown(_) => "UnknownError",
        }
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        TaskError::Io(err.to_string())
    }
}

fn transcode_message(code: &Option<i32>, detail: &str) -> String {
    let head = match code {
        Some(code) => format!("ffmpeg exited with {}", code),
        None => String::from("ffmpeg did not exit successfully"),
    };
    match detail.is_empty() {
        true => head,
        false => format!("{}: {}", head, detail),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!(TaskError::Validation(String::new()).kind(), "ValidationError");
        assert_eq!(TaskError::probe(&PathBuf::from("a.mkv"), "x").kind(), "ProbeError");
        assert_eq!(TaskError::Transcode { code: Some(1), detail: String::new() }.kind(), "TranscodeError");
        assert_eq!(TaskError::from(std::io::Error::other("boom")).kind(), "IOError");
        assert_eq!(TaskError::Unknown(String::new()).kind(), "UnknownError");
    }

    #[test]
    fn test_transcode_display() {
        let err = TaskError::Transcode { code: Some(1), detail: String::from("Invalid data found") };
        assert_eq!(err.to_string(), "ffmpeg exited with 1: Invalid data found");
        let err = TaskError::Transcode { code: None, detail: String::new() };
        assert_eq!(err.to_string(), "ffmpeg did not exit successfully");
    }
}
