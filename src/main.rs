use anyhow::Result;
use clap::Parser;
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use plaque_common::{OutputFormat, TickMetrics};
use plaque_engine::{Simulation, SimulationConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Overrides initial_conditions.seed
    #[arg(long)]
    seed: Option<u64>,

    /// Overrides timing.total_ticks
    #[arg(long)]
    ticks: Option<u32>,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    seed: u64,
    ticks: u32,
    wall_time_secs: f64,
    final_metrics: &'a TickMetrics,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Starting plaque simulation...");

    // --- Load Configuration ---
    let mut config = SimulationConfig::load(&args.config)?;
    if let Some(seed) = args.seed {
        config.initial_conditions.seed = Some(seed);
    }
    if let Some(ticks) = args.ticks {
        config.timing.total_ticks = ticks;
    }
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Initialize Simulation ---
    let mut sim = Simulation::new(config)?;
    let params = sim.params().clone();
    info!(
        "Lattice {}x{} ({} cells), seed {}, {:?} spread, {:?} interferon.",
        params.size, params.size, params.num_cells, sim.seed(), params.spread_policy, params.ifn_policy
    );
    debug!("Simulation Parameters: {:#?}", params);

    let output = sim.config().output.clone();
    let mut record_interval = sim.config().timing.record_interval_ticks;
    if record_interval == 0 {
        warn!("Record interval is 0 ticks. Recording every tick.");
        record_interval = 1;
    }

    let mut metrics_writer = if output.save_metrics {
        let filename = format!("{}_metrics.csv", output.base_filename);
        match csv::Writer::from_path(&filename) {
            Ok(writer) => Some(writer),
            Err(e) => {
                error!("Error creating metrics file '{}': {}", filename, e);
                anyhow::bail!("Failed to open metrics output.");
            }
        }
    } else {
        None
    };

    // --- Simulation Loop ---
    let total_ticks = params.total_ticks;
    info!("Starting simulation loop for {} ticks...", total_ticks);
    let start_time = Instant::now();
    let mut previous_print_time = start_time;

    if output.save_snapshots {
        sim.record_snapshot();
    }
    let mut last_metrics = sim.metrics();

    for tick in 0..total_ticks {
        let tick_start_time = Instant::now();
        let metrics = sim.step();
        let tick_duration = tick_start_time.elapsed();

        if let Some(writer) = metrics_writer.as_mut() {
            if let Err(e) = writer.serialize(&metrics) {
                error!("Error writing metrics for tick {}: {}", tick + 1, e);
                anyhow::bail!("Failed to write metrics.");
            }
        }

        let current_time = Instant::now();
        let should_print_status = current_time.duration_since(previous_print_time).as_secs_f64() >= 5.0;
        let is_record_tick = (tick + 1) % record_interval == 0;
        let is_last_tick = tick + 1 == total_ticks;

        if should_print_status || is_record_tick || is_last_tick {
            info!(
                "Tick [{}/{}] | Plaque: {:5.2}% | Infected: {:5.2}% | Antiviral: {:5.2}% | Virions: {} | DIPs: {} | IFN: {:.3} | Tick Time: {:6.2} ms",
                tick + 1,
                total_ticks,
                metrics.plaque_pct,
                metrics.pct_infected,
                metrics.pct_antiviral,
                metrics.total_virions,
                metrics.total_dips,
                metrics.global_ifn,
                tick_duration.as_secs_f64() * 1000.0
            );
            previous_print_time = current_time;

            if output.save_snapshots && (is_record_tick || is_last_tick) {
                sim.record_snapshot();
            }
        } else {
            trace!(
                "Tick [{}/{}] completed in {:.2} ms",
                tick + 1,
                total_ticks,
                tick_duration.as_secs_f64() * 1000.0
            );
        }
        last_metrics = metrics;
    }

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds. Final plaque {:.2}% of lattice.",
        total_duration.as_secs_f64(),
        last_metrics.plaque_pct
    );

    // --- Save Recorded Data ---
    if let Some(mut writer) = metrics_writer {
        writer.flush()?;
        info!("Metrics saved to {}_metrics.csv", output.base_filename);
    }

    if output.save_snapshots {
        save_snapshots(&sim, output.format, &output.base_filename)?;
    } else {
        info!("Skipping saving snapshots as per config (save_snapshots is false).");
    }

    let summary = RunSummary {
        seed: sim.seed(),
        ticks: sim.current_tick(),
        wall_time_secs: total_duration.as_secs_f64(),
        final_metrics: &last_metrics,
    };
    let filename = format!("{}_summary.json", output.base_filename);
    let mut file = File::create(&filename)?;
    file.write_all(serde_json::to_string_pretty(&summary)?.as_bytes())?;
    info!("Run summary saved to {}", filename);

    info!("Simulation Complete.");
    Ok(())
}

fn save_snapshots(sim: &Simulation, format: OutputFormat, base_filename: &str) -> Result<()> {
    let snapshots = sim.get_recorded_snapshots();
    let extension = match format {
        OutputFormat::Json => "json",
        OutputFormat::Bincode => "bin",
        OutputFormat::MessagePack => "msgpack",
    };
    let filename = format!("{}_snapshots.{}", base_filename, extension);
    let file = match File::create(&filename) {
        Ok(file) => file,
        Err(e) => {
            error!("Error creating snapshot file '{}': {}", filename, e);
            anyhow::bail!("Failed to save snapshots.");
        }
    };
    let mut writer = BufWriter::new(file);

    let result = match format {
        OutputFormat::Json => serde_json::to_writer(&mut writer, snapshots).map_err(anyhow::Error::from),
        OutputFormat::Bincode => bincode::serialize_into(&mut writer, snapshots).map_err(anyhow::Error::from),
        OutputFormat::MessagePack => rmp_serde::encode::write(&mut writer, snapshots).map_err(anyhow::Error::from),
    };
    if let Err(e) = result.and_then(|_| writer.flush().map_err(anyhow::Error::from)) {
        error!("Error serializing snapshots to {:?}: {}", format, e);
        anyhow::bail!("Failed to save snapshots.");
    }
    info!("{} snapshots saved to {} ({:?} format)", snapshots.len(), filename, format);
    Ok(())
}
