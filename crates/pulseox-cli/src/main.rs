use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use pulseox_core::{
    AcquisitionLoop, AcquisitionSettings, ConfigError, PacketTransport, Pipeline, PipelineConfig,
    PulseoxConfig, ResultSnapshot, SharedResultState, SimulatedSensor, ViewMode,
};

#[derive(Parser)]
#[command(name = "pulseox-cli", about = "Pulse oximeter pipeline on a simulated sensor")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the threaded acquisition loop and print each displayed frame
    Run {
        #[arg(long, value_parser = parse_view)]
        view: Option<ViewMode>,
        #[arg(long, default_value_t = 10)]
        seconds: u64,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Push packets through the pipeline synchronously and print the result
    Offline {
        #[arg(long, default_value_t = 600)]
        packets: usize,
        #[arg(long, value_parser = parse_view)]
        view: Option<ViewMode>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Show the view presets and their derived values
    Presets {
        #[arg(long)]
        json: bool,
    },
}

fn parse_view(s: &str) -> Result<ViewMode, ConfigError> {
    s.parse()
}

fn load_config(path: Option<PathBuf>) -> Result<PulseoxConfig, ConfigError> {
    match path {
        Some(path) => PulseoxConfig::from_file_with_env(path),
        None => PulseoxConfig::load_layered(None, None),
    }
}

fn print_snapshot(snap: &ResultSnapshot, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", snap.to_json()?);
    } else {
        let beats = snap.peaks.as_ref().map_or(0, Vec::len);
        println!(
            "batch {:>5}  HR {:>3}  SpO2 {:>4}  beats {}",
            snap.batch, snap.heart_rate_label, snap.spo2_label, beats
        );
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Run {
            view,
            seconds,
            config,
            json,
        } => {
            let mut cfg = load_config(config)?;
            if let Some(view) = view {
                cfg.view = view;
            }
            let pipeline = cfg.pipeline();
            let sensor = SimulatedSensor::from_config(&cfg.simulation, pipeline.sample_period_s);

            let mut acquisition =
                AcquisitionLoop::new(pipeline, AcquisitionSettings::from_config(&cfg.acquisition))?;
            let shared = acquisition.shared();
            let events = shared.display_events();
            acquisition.start(Box::new(sensor))?;

            let deadline = Instant::now() + Duration::from_secs(seconds);
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                if events.recv_timeout(remaining).is_ok() {
                    print_snapshot(&shared.snapshot(), json)?;
                }
            }

            acquisition.stop();
            let m = acquisition.metrics();
            log::info!(
                "packets {} | batches {} published, {} skipped | faults {} transport, {} malformed",
                m.packets_read,
                m.batches_published,
                m.batches_skipped,
                m.transport_errors,
                m.malformed_packets
            );
        }
        Commands::Offline {
            packets,
            view,
            config,
            json,
        } => {
            let mut cfg = load_config(config)?;
            if let Some(view) = view {
                cfg.view = view;
            }
            let mut pipeline = Pipeline::new(cfg.pipeline())?;
            let shared = SharedResultState::new(pipeline.placeholder());
            let mut sensor =
                SimulatedSensor::from_config(&cfg.simulation, pipeline.config().sample_period_s);

            let timeout = cfg.acquisition.io_timeout();
            for _ in 0..packets {
                let bytes = sensor.read_packet(timeout)?;
                pipeline.ingest_packet(&bytes, &shared)?;
            }
            print_snapshot(&shared.snapshot(), json)?;
        }
        Commands::Presets { json } => {
            for view in ViewMode::ALL {
                let p = PipelineConfig::for_view(view);
                if json {
                    println!("{}", serde_json::to_string_pretty(&p)?);
                    continue;
                }
                println!(
                    "{:<6} buffer {:>5}  plot {:>4} x{:<2}  refresh {:>3} ({:.2} s)  \
                     {}x{}  edge {}  HR hist {}  SpO2 hist {}",
                    view,
                    p.buffer_capacity,
                    p.plot_points,
                    p.plot_step,
                    p.samples_per_refresh,
                    p.refresh_period_s(),
                    p.display_width,
                    p.display_height,
                    p.edge_threshold(),
                    p.heart_rate_history_len(),
                    p.spo2_history_len()
                );
            }
        }
    }
    Ok(())
}
