// JIT scheduler simulation binary.
//
// Builds a queue, a simulated concentrator, and a dispatcher from the configuration file, feeds
// the queue with synthetic Class A/C and beacon traffic, and prints the final statistics as JSON
// when the run ends or Ctrl+C is received.

use clap::Parser;
use lorawan_jit::concentrator::{Concentrator, SimulatedConcentrator};
use lorawan_jit::scheduler::{JitDispatcher, JitQueue, TxOutcome};
use lorawan_jit::simulation::{TrafficGenerator, TrafficProfile};
use lorawan_jit::GatewayConfig;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "jit-sim")]
#[command(author, version, about = "Simulate LoRaWAN downlink JIT scheduling", long_about = None)]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// JSON configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run duration in seconds
    #[arg(short, long, default_value = "30")]
    duration: u64,

    /// Initial concentrator counter value (use a value near 4294967295 to cross the wrap)
    #[arg(long, default_value = "0")]
    counter_start: u32,

    /// Interval between simulated Class A uplinks in ms (0 disables)
    #[arg(long, default_value = "400")]
    class_a_ms: u64,

    /// Interval between immediate Class C pushes in ms (0 disables)
    #[arg(long, default_value = "1500")]
    class_c_ms: u64,

    /// Downlink spreading factor (7-12)
    #[arg(long, default_value = "9", value_parser = clap::value_parser!(u8).range(7..=12))]
    sf: u8,

    /// Disable beacon generation
    #[arg(long)]
    no_beacons: bool,

    /// Dump the queue every second
    #[arg(long)]
    show_queue: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => GatewayConfig::from_file(path)?,
        None => GatewayConfig::default(),
    };
    info!(?config, "starting jit simulation");

    let concentrator = Arc::new(SimulatedConcentrator::starting_at(cli.counter_start));
    let queue = Arc::new(JitQueue::new(&config.jit));
    let (dispatcher, events) = JitDispatcher::new(
        queue.clone(),
        concentrator.clone(),
        config.dispatcher.clone(),
    );
    let dispatcher = Arc::new(dispatcher);
    dispatcher.start()?;

    let profile = TrafficProfile {
        class_a_interval_ms: cli.class_a_ms,
        class_c_interval_ms: cli.class_c_ms,
        spreading_factor: cli.sf,
        beacons: !cli.no_beacons,
        ..TrafficProfile::default()
    };
    let radio: Arc<dyn Concentrator> = concentrator.clone();
    let traffic = TrafficGenerator::start(
        queue.clone(),
        radio,
        profile,
        config.jit.beacon_period_us,
        config.jit.beacons_in_queue,
    )?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::Relaxed);
    })?;

    let deadline = Instant::now() + Duration::from_secs(cli.duration);
    let mut last_dump = Instant::now();
    while !shutdown.load(Ordering::Relaxed) && Instant::now() < deadline {
        while let Ok(event) = events.try_recv() {
            if !event.outcome.is_sent() {
                warn!(
                    packet_type = %event.packet_type,
                    target_us = event.target_time_us,
                    outcome = ?event.outcome,
                    "downlink not transmitted"
                );
            } else if event.outcome == TxOutcome::SentOverwriting {
                warn!(packet_type = %event.packet_type, "pending downlink overwritten");
            }
        }
        if cli.show_queue && last_dump.elapsed() >= Duration::from_secs(1) {
            queue.print(true, 1);
            last_dump = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    traffic.stop();
    dispatcher.stop();

    let stats = queue.stats().snapshot();
    info!(
        enqueued = stats.total_enqueued(),
        rejected = stats.total_rejected(),
        transmitted = stats.total_transmitted(),
        frames = concentrator.frames_sent(),
        "simulation finished"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
