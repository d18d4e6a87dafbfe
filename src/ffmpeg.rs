use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader};
use std::process::{Command, Stdio};

use tracing::debug;

pub mod probe;

const DIAGNOSTIC_TAIL_LINES: usize = 5;

#[derive(Debug)]
pub struct ProcessExit {
    pub success: bool,
    pub code: Option<i32>,
    /// Last few diagnostic lines, for failure messages.
    pub tail: String,
}

/// Launches ffmpeg-like tools. The diagnostic stream is handed out line by
/// line while the process runs.
pub trait EncoderProcess: Send + Sync {
    fn run(&self, program: &str, args: &[OsString], on_line: &mut dyn FnMut(&str)) -> io::Result<ProcessExit>;
}

pub struct SystemProcess;

impl EncoderProcess for SystemProcess {
    fn run(&self, program: &str, args: &[OsString], on_line: &mut dyn FnMut(&str)) -> io::Result<ProcessExit> {
        debug!("{} {}", program, args.iter().map(|s| format!("{:?}", s)).collect::<Vec<String>>().join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);
        if let Some(stderr) = child.stderr.take() {
            // stats lines are terminated by '\r', everything else by '\n'
            for chunk in BufReader::new(stderr).split(b'\r') {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(_) => break,
                };
                for line in String::from_utf8_lossy(&chunk).lines() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    on_line(line);
                    if tail.len() == DIAGNOSTIC_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(String::from(line));
                }
            }
        }

        let status = child.wait()?;
        Ok(ProcessExit {
            success: status.success(),
            code: status.code(),
            tail: tail.into_iter().collect::<Vec<String>>().join("\n"),
        })
    }
}

pub struct FFmpeg {
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl FFmpeg {
    pub fn new(ffmpeg: &str, ffprobe: &str) -> Self {
        FFmpeg {
            ffmpeg: String::from(ffmpeg),
            ffprobe: String::from(ffprobe),
        }
    }

    pub fn is_installed(&self) -> bool {
        [&self.ffmpeg, &self.ffprobe].iter().all(|program| {
            match Command::new(program).arg("-version").stdout(Stdio::null()).stderr(Stdio::null()).status() {
                Ok(status) => status.success(),
                Err(_) => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tools() {
        let f = FFmpeg::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        assert!(!f.is_installed());
    }
}
