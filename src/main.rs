//! Chronos capture pipeline demo with a synthetic signal generator

use std::sync::Arc;
use std::time::Duration;

use chronos::capture::format::VideoFormat;
use chronos::device::{InputDevice, SyntheticSource};
use chronos::display::{FieldPass, FrameSink};
use chronos::{Config, CONFIG};
use color_eyre::Result;
use tracing::{debug, info, warn};

/// Sink that stages presented frames and logs each publish.
struct LogSink {
    staging: Vec<u8>,
    published: u64,
}

impl FrameSink for LogSink {
    fn upload(&mut self, image: &[u8], _format: &VideoFormat) {
        self.staging.clear();
        self.staging.extend_from_slice(image);
    }

    fn unpack(&mut self, pass: FieldPass) {
        self.published += 1;
        debug!(?pass, bytes = self.staging.len(), "published frame");
    }
}

fn load_config() -> Config {
    let loaded = config::Config::builder()
        .add_source(config::File::with_name("chronos").required(false))
        .add_source(config::Environment::with_prefix("CHRONOS").separator("__"))
        .build()
        .and_then(|settings| settings.try_deserialize::<Config>());

    match loaded {
        Ok(config) => config,
        Err(err) => {
            warn!(%err, "falling back to the default configuration");
            Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter("chronos=debug")
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Chronos launching...");

    // Load configuration
    let config = load_config();
    CONFIG.store(Arc::new(config.clone()));

    // The generator plays the capture card: its own thread delivers frames
    // at the signal rate while the render loop below ticks independently.
    let source = SyntheticSource::new(config.synthetic.clone());
    let mut device = InputDevice::new(config.device.clone(), Box::new(source));

    // Forward arrival notifications out of the delivery thread without
    // ever blocking it.
    let (frame_tx, frame_rx) = flume::bounded::<i64>(64);
    device.add_video_frame_callback(move |frame| {
        let _ = frame_tx.try_send(frame.stream_timestamp);
    });

    device.set_device_selection(Some(0));
    device.set_running(true);
    device.update_lifecycle();

    if !device.is_active() {
        if let Some((message, severity)) = device.status() {
            warn!(?severity, %message, "device did not activate");
        }
        return Ok(());
    }

    let mut sink = LogSink {
        staging: Vec::new(),
        published: 0,
    };
    let mut render_tick =
        tokio::time::interval(Duration::from_secs_f64(1.0 / config.demo.render_fps.max(1) as f64));
    let mut stats_tick =
        tokio::time::interval(Duration::from_secs(config.demo.stats_interval_secs.max(1)));
    let mut arrived: u64 = 0;

    loop {
        tokio::select! {
            _ = render_tick.tick() => {
                device.perform_update(&mut sink);
                arrived += frame_rx.drain().count() as u64;
            }
            _ = stats_tick.tick() => {
                let timecode = device
                    .timestamp()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "--:--:--:--".into());
                info!(
                    arrived,
                    published = sink.published,
                    occupancy = device.queue_occupancy(),
                    dropped = device.dropped_frame_count(),
                    %timecode,
                    "pipeline stats"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Chronos shutting down");
                break;
            }
        }
    }

    device.dispose();
    Ok(())
}
