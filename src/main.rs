//! imaqkit demo host: drives one demo adaptor end to end.
//!
//! Usage: `imaqkit [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::{eyre::bail, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use imaqkit::adaptor::DemoAdaptor;
use imaqkit::capture::{Frame, Roi};
use imaqkit::engine::{HostEngine, PropContainer, PropKind, PropValue};
use imaqkit::hardware::{self, TIMESTAMP_INTEGER};
use imaqkit::Config;

const DEMO_RUN: Duration = Duration::from_secs(5);
const RECONFIGURE_AFTER: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("imaqkit demo launching...");
    imaqkit::CONFIG.store(Arc::new(config.clone()));

    // Host side: frame sink, property containers, device properties
    let (tx, rx) = flume::bounded::<Frame>(config.engine.ring_buffer_size);
    let host = Arc::new(HostEngine::new(&config.engine).with_frame_sink(tx));
    let attrs = hardware::device_attributes(config.capture.device_id)?;
    hardware::register_attributes(host.property_store(), &attrs);

    let adaptor = DemoAdaptor::from_config(host.clone(), &config.capture)?;
    info!(
        driver = adaptor.driver_description(),
        version = adaptor.driver_version(),
        device = adaptor.device().name,
        width = adaptor.max_width(),
        height = adaptor.max_height(),
        bands = adaptor.number_of_bands(),
        "adaptor ready"
    );

    let consumer = tokio::spawn(async move {
        let mut frames = 0u64;
        let mut bytes = 0usize;
        while let Ok(frame) = rx.recv_async().await {
            frames += 1;
            bytes += frame.data.len();
            if frames % 30 == 0 {
                debug!(
                    sequence = frame.meta.sequence,
                    width = frame.meta.width,
                    height = frame.meta.height,
                    time = frame.meta.time,
                    "frames consumed"
                );
            }
        }
        (frames, bytes)
    });

    let control = Arc::clone(&adaptor);
    let started = tokio::task::spawn_blocking(move || {
        control.open();
        control.start()
    })
    .await??;
    if !started {
        bail!("adaptor refused to start");
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        result = run_demo(Arc::clone(&host), Arc::clone(&adaptor)) => {
            result?;
            info!("demo run complete");
        }
    }

    let control = Arc::clone(&adaptor);
    tokio::task::spawn_blocking(move || control.close()).await??;

    let stats = host.ring_stats();
    info!(
        frames_acquired = adaptor.frame_count(),
        frames_received = host.frames_received(),
        frames_refused = host.frames_refused(),
        ring_dropped = stats.dropped,
        errors = host.errors().len(),
        "acquisition summary"
    );

    // Dropping the last engine handle closes the frame sink
    drop(adaptor);
    drop(host);
    let (frames, bytes) = consumer.await?;
    info!(frames, bytes, "consumer finished");

    info!("imaqkit demo shutting down");
    Ok(())
}

/// Narrow the ROI, then change a device property mid-acquisition so the
/// adaptor pauses, reconfigures and resumes.
async fn run_demo(host: Arc<HostEngine>, adaptor: Arc<DemoAdaptor>) -> Result<()> {
    let full = Roi::full(adaptor.max_width(), adaptor.max_height());
    let roi = adaptor.set_roi(Roi::new(
        full.width / 4,
        full.height / 4,
        full.width / 2,
        full.height / 2,
    ));
    info!(?roi, "region of interest set");

    tokio::time::sleep(RECONFIGURE_AFTER).await;

    let store = host.property_store();
    let target = store.prop_names().into_iter().find_map(|name| {
        let info = store.prop_info(&name)?;
        (info.kind == PropKind::Int && name != TIMESTAMP_INTEGER).then_some(info)
    });

    match target {
        Some(info) => {
            let value = match store.get_prop_value(&info.name)? {
                PropValue::Int(v) => PropValue::Int(v + 1),
                other => other,
            };
            info!(property = %info.name, ?value, "changing property during acquisition");
            let name = info.name.clone();
            let setter = Arc::clone(&host);
            tokio::task::spawn_blocking(move || {
                setter.property_store().set_prop_value(&name, value)
            })
            .await??;
            info!(
                acquiring = adaptor.is_acquiring(),
                applied = ?adaptor.applied_setting(&info.name),
                "property applied"
            );
        }
        None => warn!("device has no integer property to change"),
    }

    tokio::time::sleep(DEMO_RUN.saturating_sub(RECONFIGURE_AFTER)).await;
    Ok(())
}
