use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use crate::containers::Container;
use crate::decision::{AudioMode, EncodeDecision, VideoMode};
use crate::error::TaskError;
use crate::ffmpeg::EncoderProcess;
use crate::fstools::remove_quietly;
use crate::progress::ProgressEvent;

#[derive(Clone, Debug, PartialEq)]
pub enum TranscodeOutcome {
    Encoded(PathBuf),
    Skipped(String),
}

/// What one diagnostic line says about how far the encoder got.
#[derive(Clone, Debug, PartialEq)]
struct DiagnosticProgress {
    time: f64,
    speed: Option<f64>,
}

pub struct TranscodeExecutor {
    process: Box<dyn EncoderProcess>,
    program: String,
    container: Container,
    overwrite: bool,
}

impl TranscodeExecutor {
    pub fn new(process: Box<dyn EncoderProcess>, program: &str) -> Self {
        TranscodeExecutor {
            process,
            program: String::from(program),
            container: Container::MP4,
            overwrite: true,
        }
    }

    pub fn container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn output_path(&self, source: &Path, decision: &EncodeDecision) -> PathBuf {
        output_path(source, decision, self.container)
    }

    /// Runs the encoder. On success the source is deleted and the output
    /// path returned; on failure the source is left alone and any partial
    /// output removed.
    pub fn transcode(
        &self,
        source: &Path,
        decision: &EncodeDecision,
        duration: f64,
        progress_tx: &Sender<ProgressEvent>,
    ) -> Result<TranscodeOutcome, TaskError> {
        let destination = self.output_path(source, decision);
        if destination.as_path() == source {
            error!(path = ?source, "output path equals source path");
            return Err(TaskError::Unknown(format!("refusing to transcode {:?} onto itself", source)));
        }

        if destination.exists() {
            if !self.overwrite {
                info!(path = ?destination, "output exists, skipping");
                return Ok(TranscodeOutcome::Skipped(String::from("output already exists")));
            }
            warn!(path = ?destination, "output exists, overwriting");
            fs::remove_file(&destination)?;
        }

        let args = build_args(source, decision, &destination, self.container);
        let started = Instant::now();
        let mut on_line = |line: &str| {
            if let Some(progress) = parse_diagnostic_line(line) {
                let (percent, eta) = estimate(progress.time, duration, started.elapsed());
                let _ = progress_tx.send(ProgressEvent::Encode { percent, eta, speed: progress.speed });
            }
        };
        let exit = self.process.run(&self.program, &args, &mut on_line)?;

        if !exit.success {
            remove_quietly(&destination);
            warn!(path = ?source, code = ?exit.code, "transcode failed, keeping source");
            return Err(TaskError::Transcode {
                code: exit.code,
                detail: exit.tail.lines().last().unwrap_or("").to_string(),
            });
        }

        let _ = progress_tx.send(ProgressEvent::Encode {
            percent: 100.0,
            eta: Some(Duration::ZERO),
            speed: None,
        });
        if let Err(err) = fs::remove_file(source) {
            warn!(path = ?source, error = %err, "unable to remove source");
        }
        info!(source = ?source, output = ?destination, elapsed = ?started.elapsed(), "transcoded");
        Ok(TranscodeOutcome::Encoded(destination))
    }

    /// Grabs one frame at `offset` seconds into `dir`. `None` when the
    /// encoder cannot produce it; a thumbnail is never worth failing for.
    pub fn extract_thumbnail(&self, video: &Path, offset: f64, dir: &Path) -> Option<PathBuf> {
        let millis = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
        let thumbnail = dir.join(format!("{}.jpg", millis));
        let args: Vec<OsString> = vec![
            OsString::from("-hide_banner"),
            OsString::from("-nostdin"),
            OsString::from("-y"),
            OsString::from("-ss"), OsString::from(format!("{:.3}", offset.max(0.0))),
            OsString::from("-i"), video.as_os_str().to_os_string(),
            OsString::from("-frames:v"), OsString::from("1"),
            thumbnail.as_os_str().to_os_string(),
        ];
        match self.process.run(&self.program, &args, &mut |_| ()) {
            Ok(exit) if exit.success && thumbnail.exists() => Some(thumbnail),
            Ok(exit) => {
                warn!(path = ?video, code = ?exit.code, "thumbnail extraction failed");
                remove_quietly(&thumbnail);
                None
            },
            Err(err) => {
                warn!(path = ?video, error = %err, "thumbnail extraction failed");
                None
            },
        }
    }
}

/// `<stem>.[HEVC].mp4` for a re-encode, `<stem>.[HVC1].mp4` for a tag-only
/// remux.
pub fn output_path(source: &Path, decision: &EncodeDecision, container: Container) -> PathBuf {
    let label = match decision.video {
        VideoMode::Transcode { .. } => decision.target.video.label(),
        VideoMode::Remux => decision.target.tag().to_uppercase(),
    };
    let stem = source.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let mut out = PathBuf::from(source);
    out.set_file_name(format!("{}.[{}].{}", stem, label, container.extension()));
    out
}

pub fn build_args(source: &Path, decision: &EncodeDecision, destination: &Path, container: Container) -> Vec<OsString> {
    fn os(s: &str) -> OsString { OsString::from(s) }

    let tag = decision.target.tag();
    let mut args = vec![
        os("-hide_banner"),
        os("-nostdin"),
        os("-y"),
        os("-i"), source.as_os_str().to_os_string(),
        os("-map"), os("0:v:0"),
    ];
    if decision.audio != AudioMode::Absent {
        args.push(os("-map"));
        args.push(os("0:a:0"));
    }

    match &decision.video {
        VideoMode::Remux => {
            args.extend([os("-c:v"), os("copy"), os("-tag:v"), os(tag)]);
        },
        VideoMode::Transcode { crf, preset, threads } => {
            let encoder = decision.target.video.cv_parameter().unwrap_or("libx265");
            args.extend([
                os("-c:v"), os(encoder),
                os("-crf"), OsString::from(crf.to_string()),
                os("-preset"), os(preset),
                os("-tag:v"), os(tag),
                os("-threads"), OsString::from(threads.to_string()),
            ]);
        },
    }

    match &decision.audio {
        AudioMode::Absent => args.push(os("-an")),
        AudioMode::Copy => args.extend([os("-c:a"), os("copy")]),
        AudioMode::Transcode { bitrate } => {
            args.extend([os("-c:a"), os(decision.target.audio), os("-b:a"), os(bitrate)]);
        },
    }

    args.extend(container.parameters().into_iter().map(OsString::from));
    args.push(destination.as_os_str().to_os_string());
    args
}

fn parse_diagnostic_line(line: &str) -> Option<DiagnosticProgress> {
    let time = field(line, "time=").and_then(parse_timestamp)?;
    let speed = field(line, "speed=")
        .and_then(|s| s.trim_end_matches('x').parse::<f64>().ok());
    Some(DiagnosticProgress { time, speed })
}

/// Value following `key`, tolerating ffmpeg's padding (`speed= 1.2x`).
fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let start = line.find(key)? + key.len();
    line[start..].split_whitespace().next()
}

/// `HH:MM:SS.ff` to seconds.
fn parse_timestamp(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours = parts[0].parse::<u64>().ok()?;
    let minutes = parts[1].parse::<u64>().ok()?;
    let seconds = parts[2].parse::<f64>().ok().filter(|s| *s >= 0.0)?;
    Some((hours * 3600 + minutes * 60) as f64 + seconds)
}

/// Percent of `duration` reached and a linear ETA from wall-clock time.
fn estimate(time: f64, duration: f64, elapsed: Duration) -> (f64, Option<Duration>) {
    if duration <= 0.0 {
        return (0.0, None);
    }
    let percent = (time / duration * 100.0).clamp(0.0, 100.0);
    if percent <= 0.0 {
        return (percent, None);
    }
    let remaining = elapsed.as_secs_f64() * (100.0 - percent) / percent;
    (percent, Some(Duration::from_secs_f64(remaining)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;
    use std::sync::mpsc;
    use crate::codecs::{Codec, TargetFormat};
    use crate::ffmpeg::ProcessExit;

    /// Stands in for ffmpeg: replays diagnostic lines, creates the output
    /// file on success and records every launch.
    pub struct FakeProcess {
        pub lines: Vec<String>,
        pub exit_code: i32,
        pub launches: Mutex<Vec<Vec<OsString>>>,
    }

    impl FakeProcess {
        pub fn new(lines: &[&str], exit_code: i32) -> Self {
            FakeProcess {
                lines: lines.iter().map(|l| String::from(*l)).collect(),
                exit_code,
                launches: Mutex::new(vec![]),
            }
        }
    }

    impl EncoderProcess for FakeProcess {
        fn run(&self, _program: &str, args: &[OsString], on_line: &mut dyn FnMut(&str)) -> io::Result<ProcessExit> {
            self.launches.lock().unwrap().push(args.to_vec());
            if let Some(out) = args.last() {
                fs::write(out, b"encoded")?;
            }
            for line in &self.lines {
                on_line(line);
            }
            Ok(ProcessExit {
                success: self.exit_code == 0,
                code: Some(self.exit_code),
                tail: self.lines.join("\n"),
            })
        }
    }

    fn transcode_decision(audio: AudioMode) -> EncodeDecision {
        EncodeDecision {
            target: TargetFormat::new(Codec::HEVC),
            video: VideoMode::Transcode { crf: 30, preset: String::from("fast"), threads: 8 },
            audio,
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().to_string()).collect()
    }

    #[test]
    fn test_output_path() {
        let remux = EncodeDecision { video: VideoMode::Remux, ..transcode_decision(AudioMode::Copy) };
        assert_eq!(
            output_path(Path::new("/work/movie.mkv"), &transcode_decision(AudioMode::Copy), Container::MP4),
            PathBuf::from("/work/movie.[HEVC].mp4"));
        assert_eq!(
            output_path(Path::new("/work/movie.mp4"), &remux, Container::MP4),
            PathBuf::from("/work/movie.[HVC1].mp4"));
        assert_eq!(
            output_path(Path::new("clip.[HEVC].mp4"), &transcode_decision(AudioMode::Copy), Container::MP4),
            PathBuf::from("clip.[HEVC].[HEVC].mp4"));
    }

    #[test]
    fn test_build_args_transcode_without_audio() {
        let args = build_args(Path::new("in.avi"), &transcode_decision(AudioMode::Absent), Path::new("out.mp4"), Container::MP4);
        assert_eq!(strings(&args), vec![
            "-hide_banner", "-nostdin", "-y", "-i", "in.avi", "-map", "0:v:0",
            "-c:v", "libx265", "-crf", "30", "-preset", "fast", "-tag:v", "hvc1", "-threads", "8",
            "-an", "-movflags", "+faststart", "-f", "mp4", "out.mp4",
        ]);
    }

    #[test]
    fn test_build_args_remux() {
        let decision = EncodeDecision {
            video: VideoMode::Remux,
            ..transcode_decision(AudioMode::Transcode { bitrate: String::from("96k") })
        };
        let args = strings(&build_args(Path::new("in.mp4"), &decision, Path::new("out.mp4"), Container::MP4));
        assert!(args.windows(4).any(|w| w == ["-c:v", "copy", "-tag:v", "hvc1"]));
        assert!(args.windows(4).any(|w| w == ["-c:a", "aac", "-b:a", "96k"]));
        assert!(args.windows(2).any(|w| w == ["-map", "0:a:0"]));
        assert!(!args.contains(&String::from("-crf")));
    }

    #[test]
    fn test_parse_diagnostic_line() {
        let line = "frame=  240 fps= 48 q=28.0 size=    512kB time=00:01:02.50 bitrate= 67.1kbits/s speed=1.25x";
        assert_eq!(parse_diagnostic_line(line), Some(DiagnosticProgress { time: 62.5, speed: Some(1.25) }));
        assert_eq!(parse_diagnostic_line("size=N/A time=N/A bitrate=N/A speed=N/A"), None);
        assert_eq!(parse_diagnostic_line("Input #0, matroska,webm, from 'in.mkv':"), None);
        assert_eq!(parse_timestamp("01:00:00.00"), Some(3600.0));
        assert_eq!(parse_timestamp("-00:00:00.02"), None);
    }

    #[test]
    fn test_estimate() {
        assert_eq!(estimate(30.0, 120.0, Duration::from_secs(10)), (25.0, Some(Duration::from_secs(30))));
        assert_eq!(estimate(0.0, 120.0, Duration::from_secs(10)), (0.0, None));
        assert_eq!(estimate(10.0, 0.0, Duration::from_secs(10)), (0.0, None));
        assert_eq!(estimate(500.0, 120.0, Duration::from_secs(10)).0, 100.0);
    }

    #[test]
    fn test_transcode_success_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.avi");
        fs::write(&source, b"raw").unwrap();
        let process = FakeProcess::new(&["frame=1 time=00:00:05.00 speed=2.0x", "frame=2 time=00:00:10.00 speed=2.0x"], 0);
        let executor = TranscodeExecutor::new(Box::new(process), "ffmpeg");
        let (tx, rx) = mpsc::channel();
        let outcome = executor.transcode(&source, &transcode_decision(AudioMode::Absent), 20.0, &tx).unwrap();
        drop(tx);

        let output = dir.path().join("clip.[HEVC].mp4");
        assert_eq!(outcome, TranscodeOutcome::Encoded(output.clone()));
        assert!(output.exists());
        assert!(!source.exists());
        let percents: Vec<f64> = rx.iter().map(|e| match e {
            ProgressEvent::Encode { percent, .. } => percent,
            _ => -1.0,
        }).collect();
        assert_eq!(percents, vec![25.0, 50.0, 100.0]);
    }

    #[test]
    fn test_transcode_failure_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.avi");
        fs::write(&source, b"raw").unwrap();
        let process = FakeProcess::new(&["Conversion failed!"], 1);
        let executor = TranscodeExecutor::new(Box::new(process), "ffmpeg");
        let (tx, _rx) = mpsc::channel();
        let err = executor.transcode(&source, &transcode_decision(AudioMode::Copy), 20.0, &tx).unwrap_err();

        assert_eq!(err.kind(), "TranscodeError");
        assert_eq!(err.to_string(), "ffmpeg exited with 1: Conversion failed!");
        assert!(source.exists());
        assert!(!dir.path().join("clip.[HEVC].mp4").exists());
    }

    #[test]
    fn test_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.avi");
        let existing = dir.path().join("clip.[HEVC].mp4");
        fs::write(&source, b"raw").unwrap();
        fs::write(&existing, b"stale").unwrap();
        let (tx, _rx) = mpsc::channel();

        let executor = TranscodeExecutor::new(Box::new(FakeProcess::new(&[], 0)), "ffmpeg").overwrite(false);
        let outcome = executor.transcode(&source, &transcode_decision(AudioMode::Copy), 20.0, &tx).unwrap();
        assert_eq!(outcome, TranscodeOutcome::Skipped(String::from("output already exists")));
        assert!(source.exists());

        let executor = TranscodeExecutor::new(Box::new(FakeProcess::new(&[], 0)), "ffmpeg");
        let outcome = executor.transcode(&source, &transcode_decision(AudioMode::Copy), 20.0, &tx).unwrap();
        assert_eq!(outcome, TranscodeOutcome::Encoded(existing.clone()));
        assert_eq!(fs::read(&existing).unwrap(), b"encoded");
    }

    #[test]
    fn test_extract_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let executor = TranscodeExecutor::new(Box::new(FakeProcess::new(&[], 0)), "ffmpeg");
        let thumbnail = executor.extract_thumbnail(Path::new("clip.mp4"), 12.5, dir.path()).unwrap();
        assert!(thumbnail.exists());
        assert_eq!(thumbnail.extension().unwrap(), "jpg");

        let executor = TranscodeExecutor::new(Box::new(FakeProcess::new(&[], 1)), "ffmpeg");
        assert!(executor.extract_thumbnail(Path::new("clip.mp4"), 12.5, dir.path()).is_none());
    }
}
