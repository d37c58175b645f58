//! Replay an event recording through the convolver.
//!
//! Reads whitespace-separated events (`x y timestamp polarity`) from stdin,
//! feeds them in batches to the selected strategy, and reports the final
//! frame on stderr.

use std::io::{self, BufRead, BufWriter, Write};
use std::process::ExitCode;

use clap::Parser;
use crossbeam::channel::{bounded, unbounded};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use event_conv::{ChannelSource, ConvConfig, Event, Pipeline, Strategy};

#[derive(Parser, Debug)]
#[command(name = "event-conv")]
#[command(about = "Decaying event-camera image reconstruction with Gaussian smoothing", long_about = None)]
struct Cli {
    /// Sensor width
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Sensor height
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Decay rate in 1/s
    #[arg(long, default_value_t = std::f64::consts::PI)]
    alpha: f64,

    /// Gaussian kernel size (odd)
    #[arg(short = 'k', long, default_value_t = 3)]
    kernel_size: usize,

    /// Gaussian sigma in pixels
    #[arg(long, default_value_t = 0.3)]
    sigma: f64,

    /// Production rate of the approximate strategy
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// approximate | exact
    #[arg(short, long, default_value_t = Strategy::Approximate)]
    strategy: Strategy,

    /// Events per batch handed to the ingest task
    #[arg(short, long, default_value_t = 64)]
    batch_size: usize,

    /// Largest raw timestamp before the counter wraps
    #[arg(long, default_value_t = i32::MAX as u32)]
    max_stamp: u32,

    /// Duration of one timestamp tick in nanoseconds
    #[arg(long, default_value_t = 80.0)]
    tick_ns: f64,

    /// Treat forward gaps above this many ticks as lost data
    #[arg(long)]
    max_gap: Option<u64>,

    /// Print measurements (`kind, a, b, c`) to stdout
    #[arg(long)]
    measurements: bool,

    /// Include per-event accuracy measurements
    #[arg(long)]
    accuracy: bool,

    /// Write the final frame to stdout as tab-separated rows
    #[arg(long)]
    dump_frame: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConvConfig::new(cli.width, cli.height)
        .with_alpha(cli.alpha)
        .with_kernel(cli.kernel_size, cli.sigma)
        .with_fps(cli.fps)
        .with_strategy(cli.strategy)
        .with_clock(cli.max_stamp, cli.tick_ns * 1e-9)
        .with_max_gap(cli.max_gap)
        .with_accuracy_log(cli.accuracy);

    let (batch_tx, batch_rx) = bounded::<Vec<Event>>(1024);
    let (measure_tx, measure_rx) = unbounded();
    let measurements = cli.measurements.then_some(measure_tx);

    let pipeline = Pipeline::start_with_measurements(&config, ChannelSource::new(batch_rx), measurements)?;

    let stdin = io::stdin();
    let batch_size = cli.batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);
    let mut total: u64 = 0;
    let mut malformed: u64 = 0;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<Event>() {
            Ok(ev) => {
                batch.push(ev);
                total += 1;
            }
            Err(e) => {
                malformed += 1;
                debug!("{}", e);
                continue;
            }
        }
        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if batch_tx.send(full).is_err() {
                break;
            }
        }
    }
    if !batch.is_empty() {
        let _ = batch_tx.send(batch);
    }
    drop(batch_tx);

    let summary = pipeline.join()?;
    info!(total, malformed, "input exhausted");

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for m in measure_rx.try_iter() {
        writeln!(out, "{}", m)?;
    }

    let frame = &summary.final_frame;
    if cli.dump_frame {
        for y in 0..frame.height() {
            let row: Vec<String> = (0..frame.width()).map(|x| format!("{:.6}", frame.get(x, y))).collect();
            writeln!(out, "{}", row.join("\t"))?;
        }
    }
    out.flush()?;

    let (min, max) = frame.min_max();
    eprintln!(
        "event-conv: {} events ({} rejected, {} discontinuities, {} malformed lines), {} frames",
        summary.stats.events(),
        summary.stats.rejected(),
        summary.stats.discontinuities(),
        malformed,
        summary.frames_produced,
    );
    eprintln!(
        "event-conv: t = {:.6} s, energy {:.6}, range [{:.6}, {:.6}], peak rate {:.0} ev/s",
        summary.global_time,
        frame.energy(),
        min,
        max,
        summary.stats.peak_rate(),
    );
    Ok(())
}
