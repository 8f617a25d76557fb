//! Hush CLI
//!
//! Headless runner for the suppression engine: loads a scene, starts
//! capture and reports engine events until the run time elapses.

mod cli;
mod scene;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use hush_core::{
    is_demo_mode, AudioDevice, AudioEngine, CaptureBackend, CpalBackend, EngineConfig, Event,
    NoiseKind, OfflineBackend,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, RunArgs};
use crate::scene::Scene;

/// Frames the offline clock advances per tick (20ms at 48kHz)
const OFFLINE_TICK_FRAMES: usize = 960;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hush=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Devices => list_devices(),
        Commands::Presets => {
            list_presets();
            Ok(())
        }
        Commands::InitConfig { path } => EngineConfig::default()
            .save(&path)
            .with_context(|| format!("writing {}", path.display())),
    }
}

fn engine_config(args: &RunArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None if args.low_latency => EngineConfig::low_latency(),
        None => EngineConfig::default(),
    };
    if args.input.is_some() {
        config.input_device = args.input.clone();
    }
    if args.output.is_some() {
        config.output_device = args.output.clone();
    }
    Ok(config)
}

fn load_scene(path: Option<&Path>, presets: &[String]) -> Result<Scene> {
    let mut scene = match path {
        Some(path) => Scene::load(path)?,
        None => Scene::default(),
    };
    scene.add_presets(presets)?;
    Ok(scene)
}

fn run(args: RunArgs) -> Result<()> {
    let config = engine_config(&args)?;
    let mut scene = load_scene(args.scene.as_deref(), &args.presets)?;
    if let Some(master) = args.master {
        scene.master_gain = master;
    }

    let offline = args.offline.then(OfflineBackend::new);
    let backend: Arc<dyn CaptureBackend> = match &offline {
        Some(backend) => Arc::new(backend.clone()),
        None => Arc::new(CpalBackend::new()),
    };

    info!(
        "Hush v{} ({} sources, master {:.2}, {:.1}ms buffer)",
        env!("CARGO_PKG_VERSION"),
        scene.sources.len(),
        scene.master_gain,
        config.stream.latency_ms()
    );

    let engine = AudioEngine::with_backend(backend, config).context("creating engine")?;
    engine.on_master_gain_changed(scene.master_gain)?;
    engine.on_sources_changed(scene.sources.clone())?;

    match engine.start()?.wait() {
        Ok(()) => {}
        Err(e) if is_demo_mode(&e) => {
            warn!("Demo mode - no audio will be processed: {}", e);
        }
        Err(e) => return Err(e).context("starting capture"),
    }

    let deadline = Instant::now() + Duration::from_secs_f32(args.seconds.max(0.0));
    let mut last_report = Instant::now();
    while Instant::now() < deadline {
        if let Some(backend) = &offline {
            backend.advance(OFFLINE_TICK_FRAMES);
        }

        while let Some(event) = engine.poll_event() {
            report_event(&event);
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            let snapshot = engine.snapshot()?;
            info!(
                "{:?}: {} live / {} declared, peaks L {:.3} R {:.3}",
                snapshot.state,
                snapshot.live_sources.len(),
                snapshot.pending_sources,
                snapshot.peaks.0,
                snapshot.peaks.1
            );
            last_report = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(20));
    }

    engine.stop()?;
    let snapshot = engine.snapshot()?;
    info!("Stopped ({:?})", snapshot.state);
    Ok(())
}

fn report_event(event: &Event) {
    match event {
        Event::Started { device } => info!("Capturing from '{}'", device),
        Event::Stopped => info!("Capture stopped"),
        Event::DemoMode { reason } => warn!("Demo mode: {}", reason),
        Event::Error { message } => warn!("Engine error: {}", message),
        Event::Reconciled {
            created,
            updated,
            released,
        } => info!(
            "Graph: +{:?} ~{:?} -{:?}",
            created, updated, released
        ),
        Event::SourceFailed { id, message } => warn!("Source '{}' failed: {}", id, message),
        Event::LevelUpdate { .. } | Event::StateUpdate(_) => {
            debug!("{:?}", event);
        }
    }
}

fn list_devices() -> Result<()> {
    let devices = AudioDevice::enumerate_all().context("enumerating devices")?;
    for device in devices {
        println!(
            "{:?}\t{}{}\t{} ch\t{:?}",
            device.device_type,
            device.name,
            if device.is_default { " (default)" } else { "" },
            device.max_channels,
            device.sample_rates
        );
    }
    Ok(())
}

fn list_presets() {
    for kind in NoiseKind::ALL {
        println!(
            "{:<10} {:<18} {:>6.0} Hz  intensity {:.2}",
            kind.name(),
            kind.label(),
            kind.default_frequency_hz(),
            kind.default_intensity()
        );
    }
}
