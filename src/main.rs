//! Live Perception - Main Entry Point
//!
//! Runs one pipeline variant against a local webcam and an ONNX model, with a
//! fixed-rate refresh clock standing in for the display. Overlays can be
//! printed as JSON lines for a host UI to replay.

use std::ops::ControlFlow;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use live_perception::camera::nokhwa::{list_cameras, NokhwaCamera};
use live_perception::controller::FrameOutcome;
use live_perception::logging::init_logging;
use live_perception::model::onnx::OnnxBackend;
use live_perception::render::DisplayList;
use live_perception::scheduler::IntervalClock;
use live_perception::{PipelineConfig, PipelineController, PipelineEvent, Variant};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "live-perception", version, about)]
struct Cli {
    /// Pipeline variant: object-detection, image-classification,
    /// hand-gesture-recognition or face-landmark-detection.
    #[arg(value_name = "VARIANT", required_unless_present = "list_cameras")]
    variant: Option<Variant>,
    /// Camera index (overrides the config file).
    #[arg(long = "camera", value_name = "INDEX")]
    camera: Option<u32>,
    /// Directory holding `<variant>.onnx` models.
    #[arg(long = "models", value_name = "DIR")]
    models: Option<PathBuf>,
    /// JSON configuration file.
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Refresh rate driving the frame loop.
    #[arg(long = "fps", value_name = "HZ")]
    fps: Option<u32>,
    /// Stop after this many refresh callbacks.
    #[arg(long = "frames", value_name = "N")]
    frames: Option<u64>,
    /// Print each rendered overlay as a JSON line on stdout.
    #[arg(long = "dump", action = clap::ArgAction::SetTrue)]
    dump: bool,
    /// List available cameras and exit.
    #[arg(long = "list-cameras", action = clap::ArgAction::SetTrue)]
    list_cameras: bool,
    /// Enable debug logging.
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    verbose: bool,
}

impl Cli {
    /// File configuration with command line overrides applied.
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(camera) = self.camera {
            config.camera_index = camera;
        }
        if let Some(models) = &self.models {
            config.model_dir = Some(models.clone());
        }
        if let Some(fps) = self.fps {
            config.refresh_hz = fps;
        }
        Ok(config)
    }
}

/// Error message for events that end the session.
fn failure(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::Error { kind, message } => Some(format!("{} error: {}", kind, message)),
        _ => None,
    }
}

fn report(event: PipelineEvent) {
    match event {
        PipelineEvent::Loading { message, .. } => log::info!(target: "host", "{}", message),
        PipelineEvent::CameraReady { width, height } => {
            log::info!(target: "host", "Camera ready ({}x{})", width, height)
        }
        PipelineEvent::Ready(variant) => {
            log::info!(target: "host", "{} ready ({})", variant.title(), variant.capability())
        }
        PipelineEvent::LoadingCleared => log::debug!(target: "host", "Loading cleared"),
        PipelineEvent::Error { kind, message } => {
            log::error!(target: "host", "Pipeline error ({}): {}", kind, message)
        }
        PipelineEvent::Closed(variant) => log::info!(target: "host", "{} closed", variant.title()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(if cli.verbose { "debug" } else { "info" })
        .context("Failed to initialize logging")?;

    log::info!("Live Perception v{}", env!("CARGO_PKG_VERSION"));

    if cli.list_cameras {
        let cameras = list_cameras();
        if cameras.is_empty() {
            println!("No cameras found");
        }
        for camera in cameras {
            println!("{}: {}", camera.index, camera.name);
        }
        return Ok(());
    }

    let variant = cli.variant.context("No pipeline variant given")?;
    let config = cli.pipeline_config()?;

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let event_thread = std::thread::Builder::new()
        .name("host-events".to_string())
        .spawn(move || {
            let mut first_failure = None;
            for event in events_rx.iter() {
                if first_failure.is_none() {
                    first_failure = failure(&event);
                }
                report(event);
            }
            first_failure
        })
        .context("Failed to spawn event thread")?;

    let models = OnnxBackend::new(config.model_dir.clone());
    let mut clock = IntervalClock::new(config.refresh_hz);
    let mut controller = PipelineController::new(NokhwaCamera, models, config, events_tx);
    controller.start(variant);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let mut surface = DisplayList::new();
    let mut ticks: u64 = 0;
    controller
        .run(&mut clock, &mut surface, shutdown, |outcome, surface| {
            ticks += 1;

            match outcome {
                FrameOutcome::Rendered(_) if cli.dump => match surface.to_json() {
                    Ok(json) => println!("{}", json),
                    Err(e) => log::warn!("Failed to serialize overlay: {}", e),
                },
                FrameOutcome::Inactive => {
                    log::info!("Pipeline is inactive, exiting");
                    return ControlFlow::Break(());
                }
                _ => {}
            }

            match cli.frames {
                Some(limit) if ticks >= limit => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        })
        .await;

    if let Some(session) = controller.session() {
        let stats = session.stats();
        log::info!(
            "{} frames submitted, {} rendered, {} skipped",
            stats.submitted,
            stats.rendered,
            stats.skipped
        );
    }

    // Dropping the controller closes the event channel
    drop(controller);
    let first_failure = event_thread
        .join()
        .map_err(|_| anyhow::anyhow!("Event thread panicked"))?;

    match first_failure {
        Some(message) => anyhow::bail!("Pipeline failed: {}", message),
        None => Ok(()),
    }
}
