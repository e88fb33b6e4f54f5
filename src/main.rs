//! Trail Capture CLI
//!
//! Records routes from a synthetic camera with synthetic positioning and
//! compass drivers, and manages the recorded routes.

use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use trailcap::{
    capture::{FileConfig, FrameSource, SyntheticCamera},
    metadata::MetadataEmbedder,
    metrics::{MetricsRegistry, MetricsSnapshot},
    pipeline::CapturePipeline,
    scheduler::{FpsReport, FrameScheduler},
    sensors::{OrientationSample, PositioningSample, SensorHub},
    session::{DiskStorageProbe, SessionManager},
};

#[derive(Debug, Parser)]
#[command(name = "trailcap", version, about = "Geotagged still-frame trail recorder")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the routes (overrides the configuration).
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or resume a route and record until Ctrl-C.
    Record {
        route: String,
        /// Keep one of every N frames (new routes only).
        #[arg(short, long, default_value_t = 1)]
        skip: u32,
        /// Stop after this many native-rate frames.
        #[arg(long)]
        frames: Option<u64>,
        /// Frame width (overrides the configuration).
        #[arg(long)]
        width: Option<u32>,
        /// Frame height (overrides the configuration).
        #[arg(long)]
        height: Option<u32>,
        /// Print the final metrics in Prometheus text format.
        #[arg(long)]
        print_metrics: bool,
    },
    /// List recorded routes.
    Routes,
    /// Delete a route and all of its frames.
    Delete { route: String },
    /// Show the last session and storage status.
    Status,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    if let Some(base_dir) = cli.base_dir {
        config.output.base_dir = base_dir;
    }

    let session = SessionManager::new(
        config.output.base_dir.clone(),
        Arc::new(DiskStorageProbe),
        config.storage.clone(),
    )?
    .with_native_fps(config.capture.native_fps);

    match cli.command {
        Command::Record {
            route,
            skip,
            frames,
            width,
            height,
            print_metrics,
        } => {
            if let Some(width) = width {
                config.capture.width = width;
            }
            if let Some(height) = height {
                config.capture.height = height;
            }
            config.validate()?;
            record(&config, &session, &route, skip, frames, print_metrics)
        }
        Command::Routes => {
            for route in session.list_routes()? {
                match session.route_config(&route) {
                    Some(cfg) => println!("{route}\tskip={}", cfg.frame_skip),
                    None => println!("{route}\t(no config)"),
                }
            }
            Ok(())
        }
        Command::Delete { route } => {
            session.delete_route(&route)?;
            println!("Deleted {route}");
            Ok(())
        }
        Command::Status => {
            match session.last_session() {
                Some(last) => println!(
                    "Last route: {} (recording: {}, started: {})",
                    last.route_name,
                    last.is_recording,
                    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(last.start_time)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| last.start_time.to_string())
                ),
                None => println!("No previous session"),
            }
            match session.available_bytes() {
                Some(bytes) => println!("Available storage: {:.1} GB", bytes as f64 / 1e9),
                None => println!("Available storage: unknown"),
            }
            if let Some(warning) = session.storage_warning() {
                println!("{warning}");
            }
            Ok(())
        }
    }
}

fn record(
    config: &FileConfig,
    session: &SessionManager,
    route: &str,
    skip: u32,
    max_frames: Option<u64>,
    print_metrics: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Trail Capture v{}", trailcap::VERSION);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    session.set_warning_handler(|status, message| {
        warn!(?status, "{message}");
    });
    let route_config = session.open(route, skip)?;
    if let Some(warning) = session.storage_warning() {
        warn!("{warning}");
    }

    // Sensor drivers
    let sensors = Arc::new(SensorHub::new());
    let (fix_tx, fix_rx) = bounded(16);
    let (heading_tx, heading_rx) = bounded(64);
    let logger = session.clone();
    let positioning = sensors.subscribe_positioning(fix_rx, move |fix| {
        if let Err(e) = logger.log_position(fix) {
            warn!(error = %e, "Failed to log position");
        }
    });
    let orientation = sensors.subscribe_orientation(heading_rx);
    let drivers = spawn_synthetic_drivers(fix_tx, heading_tx, Arc::clone(&running));

    // Pipeline
    let pipeline = Arc::new(CapturePipeline::new(
        session.route_dir(route)?,
        &config.pipeline,
        MetadataEmbedder::with_local_offset(config.device.clone()),
        Arc::clone(&sensors),
    )?);
    let scheduler = FrameScheduler::new(config.pipeline.ceiling(), config.capture.native_fps)?;

    let registry = MetricsRegistry::new()?;
    #[cfg(feature = "metrics")]
    let metrics_state = start_metrics_server(config.output.metrics_port)?;

    let mut camera = SyntheticCamera::new();
    camera.open(&config.capture)?;

    session.start_capture(
        &scheduler,
        pipeline.clone(),
        Some(Arc::new(|report: FpsReport| {
            if report.healthy {
                tracing::debug!(fps = format_args!("{:.1}", report.observed), "Observed frame rate");
            } else {
                warn!(
                    fps = format_args!("{:.1}", report.observed),
                    expected = format_args!("{:.1}", report.expected),
                    "Capture falling behind; consider a larger frame skip"
                );
            }
        })),
    )?;
    info!(
        route,
        skip = route_config.frame_skip,
        description = %scheduler.frame_skip_description(),
        expected_fps = scheduler.expected_fps(),
        "Recording; press Ctrl-C to stop"
    );

    let interval = Duration::from_secs_f64(1.0 / f64::from(config.capture.native_fps));
    let mut next_tick = Instant::now();
    let mut last_report = Instant::now();
    let mut ticks = 0u64;

    while running.load(Ordering::SeqCst) && session.is_recording() {
        if max_frames.is_some_and(|max| ticks >= max) {
            break;
        }

        match camera.next_frame() {
            Ok(frame) => {
                scheduler.on_frame(frame);
            }
            Err(e) => {
                warn!("Frame capture failed: {}", e);
            }
        }
        ticks += 1;

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let snapshot = MetricsSnapshot::from_components(&scheduler, session, Some(pipeline.as_ref()));
            registry.update(&snapshot);
            #[cfg(feature = "metrics")]
            if let Some(state) = &metrics_state {
                state.blocking_write().update(&snapshot);
            }
            if let Some(state) = session.state() {
                info!(
                    frames = state.frame_count,
                    duration_s = state.duration_ms / 1000,
                    fps = format_args!("{:.1}", snapshot.observed_fps),
                    healthy = snapshot.fps_healthy,
                    in_flight = snapshot.in_flight,
                    dropped = snapshot.overload_drops,
                    "Progress"
                );
            }
        }

        next_tick += interval;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            // fell behind: do not try to catch up
            next_tick = now;
        }
    }

    if !session.is_recording() && running.load(Ordering::SeqCst) {
        warn!("Recording paused automatically");
    }

    session.pause();
    if !scheduler.wait_idle(Duration::from_secs(10)) {
        warn!(in_flight = scheduler.in_flight(), "Frames still in flight at shutdown");
    }
    pipeline.drain();
    camera.close();

    running.store(false, Ordering::SeqCst);
    for driver in drivers {
        let _ = driver.join();
    }
    positioning.unsubscribe();
    orientation.unsubscribe();

    let snapshot = MetricsSnapshot::from_components(&scheduler, session, Some(pipeline.as_ref()));
    registry.update(&snapshot);
    if let Some(state) = session.state() {
        info!(
            route = %state.route_name,
            frames = state.frame_count,
            duration_s = state.duration_ms / 1000,
            stored = snapshot.completed,
            dropped = snapshot.overload_drops,
            failed = snapshot.failed,
            "Session paused"
        );
    }
    session.close();
    scheduler.shutdown();

    if print_metrics {
        print!("{}", registry.encode()?);
    }
    Ok(())
}

/// Starts the Prometheus exporter on its own runtime thread.
#[cfg(feature = "metrics")]
fn start_metrics_server(
    port: u16,
) -> Result<
    Option<Arc<tokio::sync::RwLock<trailcap::metrics::MetricsState>>>,
    Box<dyn std::error::Error>,
> {
    use trailcap::metrics::{MetricsServer, MetricsServerConfig};

    if port == 0 {
        return Ok(None);
    }
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), MetricsRegistry::new()?);
    let state = server.state();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("metrics".to_string())
        .spawn(move || {
            if let Err(e) = runtime.block_on(server.run()) {
                warn!(error = %e, "Metrics server stopped");
            }
        })?;
    Ok(Some(state))
}

/// Emits a fix every second walking north-east, and a slowly turning
/// heading ten times a second.
fn spawn_synthetic_drivers(
    fixes: Sender<PositioningSample>,
    headings: Sender<OrientationSample>,
    running: Arc<AtomicBool>,
) -> Vec<std::thread::JoinHandle<()>> {
    let gps_running = Arc::clone(&running);
    let gps = std::thread::spawn(move || {
        let (mut lat, mut lon) = (37.7749, -122.4194);
        while gps_running.load(Ordering::SeqCst) {
            lat += 0.00001;
            lon += 0.00001;
            let fix = PositioningSample {
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
                latitude: lat,
                longitude: lon,
                altitude: 16.0,
                speed: 1.4,
                accuracy: 5.0,
                heading: 45.0,
            };
            if fixes.send(fix).is_err() {
                break;
            }
            std::thread::sleep(Duration::from_secs(1));
        }
    });

    let compass = std::thread::spawn(move || {
        let mut heading = 40.0f32;
        while running.load(Ordering::SeqCst) {
            heading += 0.5;
            let sample = OrientationSample::new(chrono::Utc::now().timestamp_millis(), heading);
            if headings.send(sample).is_err() {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    });

    vec![gps, compass]
}
