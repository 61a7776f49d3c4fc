//! CLI Entry Point for dslr_capture
//!
//! Drives the exposure subsystem against the simulated Canon EOS body, so the whole
//! capture path (preset/bulb selection, shutter release, timer, retrieval) can be
//! exercised without a camera attached.
//!
//! # Usage
//!
//! Show camera capabilities:
//! ```bash
//! dslr_capture info
//! ```
//!
//! Take a 5 second bulb exposure with 500 ms mirror lock:
//! ```bash
//! dslr_capture capture --exposure 5 --mirror-lock 500 --output frame.cr2
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dslr_capture::camera::mock::{MockMode, SimulatedCamera};
use dslr_capture::config::AppConfig;
use dslr_capture::exposure::{ExposureMode, ExposureRequest, ShutterKind};
use dslr_capture::logging;
use dslr_capture::registry::{CameraHandle, CameraRegistry};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "dslr_capture")]
#[command(about = "Exposure control for tethered DSLR cameras", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = dslr_capture::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print camera capabilities and exposure presets
    Info {
        /// Also list every widget in the configuration tree
        #[arg(long)]
        widgets: bool,
    },

    /// Take one exposure and save the image
    Capture {
        /// Exposure time in seconds
        #[arg(long)]
        exposure: f64,

        /// Mirror-lock delay in milliseconds
        #[arg(long, default_value = "0")]
        mirror_lock: u32,

        /// ISO choice index
        #[arg(long)]
        iso: Option<usize>,

        /// Image format choice index
        #[arg(long)]
        format: Option<usize>,

        /// Output file (defaults to the camera file name)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.validate().map_err(anyhow::Error::msg)?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let camera = Arc::new(SimulatedCamera::canon_eos().with_mode(MockMode::Realistic));
    let mut registry = CameraRegistry::new();
    let handle = registry
        .open(camera.clone(), config.open_options())
        .context("Failed to open camera")?;

    let result = match cli.command {
        Commands::Info { widgets } => show_info(&registry, handle, widgets),
        Commands::Capture {
            exposure,
            mirror_lock,
            iso,
            format,
            output,
        } => capture(
            &mut registry,
            handle,
            &camera,
            ExposureRequest::from_secs_f64(exposure).with_mirror_lock(mirror_lock),
            (iso, format),
            output,
        ),
    };

    registry.close(handle);
    result
}

fn show_info(registry: &CameraRegistry, handle: CameraHandle, widgets: bool) -> Result<()> {
    let camera = registry.get(handle).context("Camera not open")?;
    let caps = camera.capabilities();

    println!(
        "Camera:          {} {}",
        camera.manufacturer().unwrap_or("unknown"),
        camera.model().unwrap_or("")
    );
    let (min, max) = camera.exposure_range();
    println!("Exposure range:  {min}s .. {max}s");
    println!(
        "Shutter release: {}",
        camera
            .shutter_kind()
            .map_or_else(|| "none (presets only)".to_string(), |k| k.to_string())
    );
    println!("ISO:             {}", camera.iso_choices().join(", "));
    println!("Formats:         {}", camera.format_choices().join(", "));
    if let Some(target) = camera.capture_target()? {
        println!("Capture target:  {target:?}");
    }

    let presets = camera.list_exposure_presets();
    if !presets.is_empty() {
        println!("Quick exposures: {}", presets.join(", "));
    }
    if let Some(bulb) = caps.bulb_preset_index() {
        println!("Bulb preset:     index {bulb}");
    }

    if widgets {
        println!();
        for name in camera.widget_names()? {
            println!("  {name}");
        }
    }
    Ok(())
}

fn capture(
    registry: &mut CameraRegistry,
    handle: CameraHandle,
    simulated: &SimulatedCamera,
    request: ExposureRequest,
    (iso, format): (Option<usize>, Option<usize>),
    output: Option<PathBuf>,
) -> Result<()> {
    let camera = registry.get_mut(handle).context("Camera not open")?;
    camera.set_iso(iso)?;
    camera.set_format(format)?;

    let started = Instant::now();
    let mode = camera
        .start_exposure(request)
        .context("Failed to start exposure")?;
    println!("Exposing {}s ({mode})", request.seconds());

    // An external release cable bypasses the simulated body, so report the file the
    // way the camera would once the shutter closes. The serial cable keys presets too.
    let external = match camera.shutter_kind() {
        Some(ShutterKind::SerialToggle) => true,
        Some(ShutterKind::UsbRelease) => mode == ExposureMode::Bulb,
        _ => false,
    };
    if external {
        simulated.queue_file_added();
    }

    let image = match output {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut sink = BufWriter::new(file);
            let image = camera.read_exposure(Some(&mut sink))?;
            sink.flush()?;
            println!("Saved {} to {}", image.name, path.display());
            image
        }
        None => {
            let image = camera.read_exposure(None)?;
            let path = PathBuf::from(&image.name);
            std::fs::write(&path, &image.data)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Saved {}", path.display());
            image
        }
    };

    println!(
        "{}x{}, {} bytes, {:.2}s total",
        image.width,
        image.height,
        image.size,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
