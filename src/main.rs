use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use snapline::config::AcquisitionConfig;
use snapline::core::{LoggingInvocation, Value, ValueKind};
use snapline::engine::{AggregatorRuntime, ShutdownMode};
use snapline::logging;
use snapline::source::{ChannelSource, SimulatedChannel, SimulationMode};

const DEMO_CONFIG: &str = include_str!("../config/cu_inj.json");
const DEMO_FRAME_SIZE: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;

    let config = match std::env::args().nth(1) {
        Some(path) => AcquisitionConfig::load(&path)?,
        None => {
            let json = serde_json::from_str(DEMO_CONFIG).context("Failed to parse built-in config")?;
            AcquisitionConfig::from_json(json)?
        }
    };
    let config = Arc::new(config);
    info!(channels = config.channels.len(), "configuration loaded");

    let sources = simulated_sources(&config);
    let mut runtime = AggregatorRuntime::new(config.clone(), LoggingInvocation::new("demo"));
    let mut errors = runtime.take_errors().context("error stream already taken")?;

    runtime.start(sources).await?;
    info!("collecting snapshots, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(err) = errors.recv() => warn!(error = %err, "aggregator error"),
        }
    }

    runtime.shutdown(ShutdownMode::Graceful).await?;
    println!("\n{}", runtime.monitor().generate_report());
    Ok(())
}

/// One simulated feed per configured channel, with staggered update rates
fn simulated_sources(config: &AcquisitionConfig) -> Vec<Box<dyn ChannelSource>> {
    let frame = config.frame.as_ref();
    let is_frame_field = |name: &str, field: Option<&String>| field.map(|f| f == name).unwrap_or(false);

    config
        .channels
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let name = spec.name.as_str();
            let channel = if is_frame_field(name, frame.map(|f| &f.array)) {
                SimulatedChannel::new(name, Arc::new(spot_frame))
            } else if is_frame_field(name, frame.and_then(|f| f.rows.as_ref()))
                || is_frame_field(name, frame.and_then(|f| f.cols.as_ref()))
            {
                SimulatedChannel::constant(name, DEMO_FRAME_SIZE as f64)
            } else if is_frame_field(name, frame.map(|f| &f.resolution)) {
                SimulatedChannel::constant(name, 9.0)
            } else if is_frame_field(name, frame.map(|f| &f.resolution_units)) {
                SimulatedChannel::constant(name, "um/px")
            } else if spec.kind == Some(ValueKind::Text) {
                SimulatedChannel::constant(name, "demo")
            } else {
                let phase = i as f64;
                SimulatedChannel::new(name, Arc::new(move |n: u64| Value::Scalar((n as f64 * 0.1 + phase).sin())))
            };

            let interval_ms = 200 + 37 * i as u64;
            Box::new(channel.with_mode(SimulationMode::Periodic { interval_ms })) as Box<dyn ChannelSource>
        })
        .collect()
}

/// Gaussian spot wandering around the frame center
fn spot_frame(n: u64) -> Value {
    let size = DEMO_FRAME_SIZE as f64;
    let cy = size / 2.0 + 6.0 * (n as f64 * 0.3).sin();
    let cx = size / 2.0 + 6.0 * (n as f64 * 0.2).cos();
    let sigma = 5.0;

    let pixels = (0..DEMO_FRAME_SIZE * DEMO_FRAME_SIZE)
        .map(|i| {
            let y = (i / DEMO_FRAME_SIZE) as f64;
            let x = (i % DEMO_FRAME_SIZE) as f64;
            let r2 = (y - cy).powi(2) + (x - cx).powi(2);
            1000.0 * (-r2 / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    Value::Waveform(pixels)
}
