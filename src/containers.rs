use serde::Deserialize;

/// Output containers. Both carry an explicit codec tag, which is what the
/// remux path rewrites.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    MP4,
    #[serde(rename = "mov")]
    QuickTime,
}

impl ToString for Container {
    fn to_string(&self) -> String {
        match self {
            Container::MP4 => String::from("mp4"),
            Container::QuickTime => String::from("mov"),
        }
    }
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::MP4 => "mp4",
            Container::QuickTime => "mov",
        }
    }

    pub fn parameters(&self) -> Vec<String> {
        vec![
            String::from("-movflags"),
            String::from("+faststart"),
            String::from("-f"),
            self.to_string(),
        ]
    }
}
