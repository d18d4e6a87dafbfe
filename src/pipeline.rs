use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::chat::{ChatClient, StatusHandle, UploadAttributes};
use crate::codecs::TargetFormat;
use crate::decision::{CodecDecisionEngine, Decision};
use crate::error::TaskError;
use crate::ffmpeg::probe::MediaProbe;
use crate::fstools::remove_quietly;
use crate::progress::{Phase, ProgressEvent, ProgressTracker, progress_bar};
use crate::quality::EncodeParams;
use crate::stats::StatsRecorder;
use crate::task::{Task, TaskStatus};
use crate::task_queue::TaskQueue;
use crate::transcoder::{TranscodeExecutor, TranscodeOutcome};

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub work_dir: PathBuf,
    pub target: TargetFormat,
    pub threads: u16,
    pub defaults: EncodeParams,
    pub interval: Duration,
}

#[derive(Debug, PartialEq)]
enum Outcome {
    Encoded,
    Skipped(String),
}

/// Files a task created. Whatever is still listed when the task ends is
/// cleaned up or reported by [`Pipeline::finish`].
#[derive(Debug, Default)]
struct Artifacts {
    dir: Option<PathBuf>,
    source: Option<PathBuf>,
    output: Option<PathBuf>,
    thumbnail: Option<PathBuf>,
}

/// The single worker: takes activated tasks one at a time and drives them
/// to a terminal state.
pub struct Pipeline {
    chat: Arc<dyn ChatClient>,
    probe: Arc<dyn MediaProbe>,
    engine: CodecDecisionEngine,
    executor: TranscodeExecutor,
    queue: Arc<TaskQueue>,
    stats: Arc<StatsRecorder>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        probe: Arc<dyn MediaProbe>,
        executor: TranscodeExecutor,
        queue: Arc<TaskQueue>,
        stats: Arc<StatsRecorder>,
        settings: PipelineSettings,
    ) -> Self {
        Pipeline {
            chat,
            probe,
            engine: CodecDecisionEngine::new(settings.target.clone(), settings.threads),
            executor,
            queue,
            stats,
            settings,
        }
    }

    pub fn run(&self, activations: Receiver<Task>) {
        for task in activations {
            self.process(task);
        }
        info!("activation channel closed, worker exiting");
    }

    pub fn process(&self, task: Task) {
        info!(task = %task.id, file = %task.attachment.file_name, "starting");
        let status = match self.chat.reply(&task.origin, &initial_text(Phase::Download)) {
            Ok(status) => Some(status),
            Err(err) => {
                warn!(task = %task.id, error = %err, "unable to post status message");
                None
            },
        };

        let mut artifacts = Artifacts::default();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&task, status.as_ref(), &mut artifacts)))
            .unwrap_or_else(|_| Err(TaskError::Unknown(String::from("task panicked"))));

        self.finish(&task, status.as_ref(), result, artifacts);
        self.queue.complete(task.id);
    }

    fn execute(&self, task: &Task, status: Option<&StatusHandle>, artifacts: &mut Artifacts) -> Result<Outcome, TaskError> {
        self.queue.set_status(task.id, TaskStatus::Downloading);
        fs::create_dir_all(&self.settings.work_dir)?;
        let dir = self.settings.work_dir.join(task.work_dir_name());
        // never reuse a directory that may hold a kept source
        fs::create_dir(&dir)?;
        artifacts.dir = Some(dir.clone());
        let source = self.with_progress(status, Phase::Download, |tx| self.chat.download(&task.attachment, &dir, tx))?;
        artifacts.source = Some(source.clone());

        let params = task.profile.resolve(&self.settings.target.video, &self.settings.defaults);
        let decision = match self.engine.evaluate(self.probe.as_ref(), &source, &params)? {
            Decision::AlreadyEncoded => {
                return Ok(Outcome::Skipped(format!("already encoded in {}", self.settings.target.video.label())));
            },
            Decision::Encode(decision) => decision,
        };

        self.queue.set_status(task.id, TaskStatus::Transcoding);
        let duration = self.probe.metadata(&source).duration;
        self.edit(status, &initial_text(Phase::Transcode));
        let output = match self.with_progress(status, Phase::Transcode, |tx| self.executor.transcode(&source, &decision, duration, tx))? {
            TranscodeOutcome::Skipped(reason) => return Ok(Outcome::Skipped(reason)),
            TranscodeOutcome::Encoded(output) => output,
        };
        artifacts.source = None;
        artifacts.output = Some(output.clone());

        self.queue.set_status(task.id, TaskStatus::ExtractingMetadata);
        let metadata = self.probe.metadata(&output);
        let thumbnail = match &task.custom_thumbnail {
            Some(custom) => Some(custom.clone()),
            None => {
                artifacts.thumbnail = self.executor.extract_thumbnail(&output, metadata.thumbnail_offset(), &dir);
                artifacts.thumbnail.clone()
            },
        };
        let attributes = UploadAttributes {
            file_name: output.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            duration: metadata.duration_secs(),
            width: metadata.width,
            height: metadata.height,
            thumbnail,
            supports_streaming: true,
        };

        self.queue.set_status(task.id, TaskStatus::Uploading);
        self.edit(status, &initial_text(Phase::Upload));
        self.with_progress(status, Phase::Upload, |tx| self.chat.upload_video(&task.origin, &output, &attributes, tx))?;
        Ok(Outcome::Encoded)
    }

    /// Runs one phase on a helper thread while this thread feeds its progress
    /// events through a tracker into the status message.
    fn with_progress<T, F>(&self, status: Option<&StatusHandle>, phase: Phase, work: F) -> Result<T, TaskError>
    where
        T: Send,
        F: FnOnce(&Sender<ProgressEvent>) -> Result<T, TaskError> + Send,
    {
        let mut tracker = ProgressTracker::new(self.settings.interval);
        tracker.begin(phase, Instant::now());
        let (tx, rx) = mpsc::channel();
        thread::scope(|scope| {
            let worker = scope.spawn(move || work(&tx));
            for event in rx {
                if let Some(text) = tracker.observe(event, Instant::now()) {
                    self.edit(status, &text);
                }
            }
            if let Some(text) = tracker.finish() {
                self.edit(status, &text);
            }
            worker.join()
                .unwrap_or_else(|_| Err(TaskError::Unknown(format!("{} panicked", phase.title()))))
        })
    }

    fn finish(&self, task: &Task, status: Option<&StatusHandle>, result: Result<Outcome, TaskError>, artifacts: Artifacts) {
        match &result {
            Ok(Outcome::Encoded) => {
                self.stats.record_completion();
                self.queue.set_status(task.id, TaskStatus::Completed);
                self.edit(status, &format!("Video successfully encoded to {}", self.settings.target.video.label()));
                info!(task = %task.id, "completed");
            },
            Ok(Outcome::Skipped(reason)) => {
                self.queue.set_status(task.id, TaskStatus::Completed);
                self.edit(status, &format!("Skipped: {}", reason));
                info!(task = %task.id, reason = %reason, "skipped");
            },
            Err(err) => {
                self.queue.set_status(task.id, TaskStatus::Failed);
                self.edit(status, &format!("{}: {}", err.kind(), err));
                error!(task = %task.id, kind = err.kind(), error = %err, "failed");
            },
        }

        if let Some(thumbnail) = &artifacts.thumbnail {
            remove_quietly(thumbnail);
        }
        match result {
            Ok(_) => {
                for path in [&artifacts.source, &artifacts.output].into_iter().flatten() {
                    remove_quietly(path);
                }
            },
            Err(_) => {
                for path in [&artifacts.source, &artifacts.output].into_iter().flatten() {
                    warn!(task = %task.id, path = ?path, "kept for recovery");
                }
            },
        }
        if let Some(dir) = &artifacts.dir {
            // only succeeds once nothing is left in it
            let _ = fs::remove_dir(dir);
        }
    }

    fn edit(&self, status: Option<&StatusHandle>, text: &str) {
        if let Some(status) = status {
            if let Err(err) = self.chat.edit(status, text) {
                warn!(error = %err, "unable to update status message");
            }
        }
    }
}

fn initial_text(phase: Phase) -> String {
    format!("{}\nProgress: 0.00%\n[{}]", phase.title(), progress_bar(0.0))
}
