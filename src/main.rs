pub mod chat;
pub mod codecs;
pub mod config;
pub mod console;
pub mod containers;
pub mod decision;
pub mod error;
pub mod ffmpeg;
pub mod fstools;
pub mod pipeline;
pub mod progress;
pub mod quality;
pub mod stats;
pub mod task;
pub mod task_queue;
pub mod transcoder;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rustop::opts;
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;
use tracing::{error, info};

use chat::Dispatcher;
use config::load_config_or_default;
use console::{ConsoleChat, run_intake, wait_for_intake};
use ffmpeg::probe::FFprobe;
use ffmpeg::{FFmpeg, SystemProcess};
use pipeline::{Pipeline, PipelineSettings};
use stats::StatsRecorder;
use task_queue::TaskQueue;
use transcoder::TranscodeExecutor;

fn main() -> ExitCode {
    let (args, _rest) = opts! {
        synopsis "Queue videos and re-encode them to HEVC, one at a time.";
        opt config:Option<String>, desc:"Path to the TOML config file.";
        opt verbose:bool=false, desc:"Log debug output.";
        opt work_dir:Option<String>, desc:"Directory for downloads and encoder output.";
        opt outbox:Option<String>, desc:"Directory finished videos are delivered to.";
        opt operator:Option<String>, desc:"Sender name used for console input.";
    }.parse_or_exit();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if args.verbose {
            String::from("encode_bot=debug")
        } else {
            String::from("encode_bot=info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(io::stderr)
        .init();

    let mut config = match load_config_or_default(args.config.as_deref().map(std::path::Path::new)) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "unable to load config");
            return ExitCode::FAILURE;
        },
    };
    if let Some(work_dir) = args.work_dir {
        config.work_dir = PathBuf::from(work_dir);
    }
    if let Some(outbox) = args.outbox {
        config.console.outbox = PathBuf::from(outbox);
    }
    if let Some(operator) = args.operator {
        config.console.operator = operator;
    }
    if !config.operators.contains(&config.console.operator) {
        config.operators.push(config.console.operator.clone());
    }

    let tools = FFmpeg::new(&config.encoder.ffmpeg, &config.encoder.ffprobe);
    if !tools.is_installed() {
        error!(ffmpeg = %tools.ffmpeg, ffprobe = %tools.ffprobe, "ffmpeg is not installed");
        return ExitCode::FAILURE;
    }
    if let Err(err) = std::fs::create_dir_all(&config.work_dir) {
        error!(path = ?config.work_dir, error = %err, "unable to create work dir");
        return ExitCode::FAILURE;
    }

    // a second signal while draining exits immediately
    let term = Arc::new(AtomicBool::new(false));
    for signal in TERM_SIGNALS {
        let registered = flag::register_conditional_shutdown(*signal, 1, Arc::clone(&term))
            .and_then(|_| flag::register(*signal, Arc::clone(&term)));
        if let Err(err) = registered {
            error!(signal = *signal, error = %err, "unable to register signal handler");
            return ExitCode::FAILURE;
        }
    }

    let (queue, activations) = TaskQueue::new();
    let queue = Arc::new(queue);
    let stats = Arc::new(StatsRecorder::new());
    let chat = Arc::new(ConsoleChat::new(&config.console.outbox));

    let executor = TranscodeExecutor::new(Box::new(SystemProcess), &config.encoder.ffmpeg)
        .container(config.encoder.container)
        .overwrite(config.encoder.overwrite);
    let pipeline = Pipeline::new(
        chat.clone(),
        Arc::new(FFprobe::new(&config.encoder.ffprobe)),
        executor,
        Arc::clone(&queue),
        Arc::clone(&stats),
        PipelineSettings {
            work_dir: config.work_dir.clone(),
            target: config.encoder.target_format(),
            threads: config.encoder.threads,
            defaults: config.defaults.params(),
            interval: config.progress.interval(),
        },
    );
    thread::spawn(move || pipeline.run(activations));

    info!(operators = ?config.operators, work_dir = ?config.work_dir, "ready");
    let dispatcher = Dispatcher::new(&config.operators, Arc::clone(&queue), Arc::clone(&stats), chat.clone());
    let intake = {
        let term = Arc::clone(&term);
        let operator = config.console.operator.clone();
        thread::spawn(move || run_intake(io::stdin().lock(), &chat, &operator, &dispatcher, &term))
    };
    wait_for_intake(&intake, &term, Duration::from_millis(250));

    while !queue.is_empty() && !term.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(250));
    }
    if !queue.is_empty() {
        info!(remaining = queue.len(), "interrupted with work pending");
        return ExitCode::FAILURE;
    }
    info!(encoded = stats.snapshot().total, "done");
    ExitCode::SUCCESS
}
