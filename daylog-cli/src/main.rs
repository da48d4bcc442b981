use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use daylog_lib::device::{DeviceOpener, SimulatedOpener};
use daylog_lib::display::LogChart;
use daylog_lib::ljm::LjmOpener;
use daylog_lib::sample::Reading;
use daylog_lib::{AcquisitionConfig, AcquisitionScheduler, NoaaCalculator, SolarCalculator};

/// Daylight-gated logger for a two-channel LabJack current/voltage probe.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Directory for a daily rolling log file, in addition to the console.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect data every day between sunrise and sunset until Ctrl+C.
    Run(RunArgs),
    /// Print the daylight window for a date.
    Window {
        /// Date as YYYY-MM-DD (default: today).
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Open the device and read both channels once.
    Probe {
        /// Use the simulated device instead of the LJM driver.
        #[arg(long)]
        simulate: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Where session databases and exports are written.
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
    /// Use the simulated device instead of the LJM driver.
    #[arg(long)]
    simulate: bool,
    /// One record every 30 s (10 reads, 3 s apart) instead of every minute.
    #[arg(long)]
    fast: bool,
}

fn setup_logging(log_dir: Option<&PathBuf>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false);

    let (file_layer, guard) = if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory {:?}", dir))?;
        let appender = tracing_appender::rolling::daily(dir, "daylog.log");
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v; RUST_LOG overrides
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(dir) = log_dir {
        info!("Logging to directory: {:?}", dir);
    }
    Ok(guard)
}

fn opener(simulate: bool) -> Box<dyn DeviceOpener> {
    if simulate {
        Box::new(SimulatedOpener::default())
    } else {
        Box::new(LjmOpener::new())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_dir.as_ref(), &cli.verbose)?;

    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Window { date, json } => window(date, json),
        Command::Probe { simulate } => probe(simulate),
    };
    if let Err(e) = result {
        error!("daylog failed: {:?}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let config = if args.fast {
        AcquisitionConfig::fast()
    } else {
        AcquisitionConfig::standard()
    }
    .context("Invalid compiled-in configuration")?
    .with_output_dir(&args.output_dir);

    info!(
        location = %config.location,
        batch = config.batch_size,
        interval_secs = config.read_interval.as_secs(),
        output = %config.output_dir.display(),
        simulate = args.simulate,
        "Starting acquisition"
    );

    let cancel = CancellationToken::new();
    let mut scheduler = AcquisitionScheduler::new(config, opener(args.simulate), Box::new(NoaaCalculator::local()))?
        .with_chart(Box::new(LogChart))
        .with_cancellation(cancel.clone());

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received, finishing the current session"),
            Err(e) => warn!("Cannot listen for Ctrl+C: {e}"),
        }
        cancel.cancel();
    });

    scheduler.run().await.context("Acquisition stopped")?;
    Ok(())
}

fn window(date: Option<NaiveDate>, json: bool) -> Result<()> {
    let config = AcquisitionConfig::standard()?;
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let window = NoaaCalculator::local()
        .compute(date, &config.location)
        .with_context(|| format!("No daylight window on {date}"))?;

    if json {
        let value = serde_json::json!({
            "date": date,
            "location": config.location,
            "window": window,
            "active_from": window.active_from(config.margin),
            "active_until": window.active_until(config.margin),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Location:     {}", config.location);
        println!("Sunrise:      {}", window.sunrise.format("%Y-%m-%d %H:%M:%S"));
        println!("Sunset:       {}", window.sunset.format("%Y-%m-%d %H:%M:%S"));
        println!("Next sunrise: {}", window.next_sunrise.format("%Y-%m-%d %H:%M:%S"));
        println!(
            "Active:       {} - {}",
            window.active_from(config.margin).format("%H:%M:%S"),
            window.active_until(config.margin).format("%H:%M:%S")
        );
    }
    Ok(())
}

fn probe(simulate: bool) -> Result<()> {
    let config = AcquisitionConfig::standard()?;
    let mut device = opener(simulate)
        .open(&config.device)
        .context("Failed to open the measurement device")?;
    info!(device = %device.describe(), "Device opened");

    let samples = device.read_all(Local::now().naive_local());
    device.close()?;
    let samples = samples.context("Reading AIN0/AIN1 failed")?;

    let reading = Reading::from_samples(&samples, config.calibration_factor);
    for sample in &samples {
        println!("  {}: {:.6} (raw)", sample.channel, sample.raw_value);
    }
    println!("Current: {:.3} A", reading.current_a);
    println!("Voltage: {:.3} V", reading.voltage_v);
    Ok(())
}
