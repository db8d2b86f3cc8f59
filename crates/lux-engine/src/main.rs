//! luxd entry point.
//!
//! Wires the infrastructure collaborators together, runs the initial
//! enumeration, arms the watchdogs, and blocks until shutdown.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()           -- TOML config, defaults on first run
//!  └─ EngineContext::new()    -- collaborators + mode set
//!  └─ ctx.initialize()        -- enumerate, resolve startup mode, adapt
//!  └─ watchdog::start()       -- 15 s control / 5 s mode loops
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lux_core::Coordinates;
use lux_engine::application::{engine, watchdog};
use lux_engine::infrastructure::control::gamma::{GammaControl, LoggingGammaSink};
use lux_engine::infrastructure::control::native::NativeApiControl;
use lux_engine::infrastructure::control::network::{HttpRelay, NetworkControl};
use lux_engine::infrastructure::enumeration::DrmEnumerator;
use lux_engine::infrastructure::location::StaticLocation;
use lux_engine::infrastructure::prompt::AutoPrompter;
use lux_engine::infrastructure::sensor::SerialLineSensor;
use lux_engine::infrastructure::storage::{config, datastore::TomlDatastore};
use lux_engine::BackendSet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_config = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load config, using defaults: {e}");
            config::AppConfig::default()
        }
    };

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(app_config.engine.log_level.clone())),
        )
        .init();

    info!("luxd starting");

    // ── Collaborators ─────────────────────────────────────────────────────────
    let store_dir = config::config_dir()?;
    let datastore = Arc::new(TomlDatastore::new(store_dir));

    let mut backends = BackendSet::new(Arc::new(GammaControl::new(Box::new(LoggingGammaSink))));

    #[cfg(target_os = "linux")]
    {
        use lux_engine::infrastructure::control::ddc::{linux::LinuxI2cBus, DdcControl};
        backends = backends.with_ddc(Arc::new(DdcControl::new(Arc::new(LinuxI2cBus::new()))));
    }

    if let Some(native) = NativeApiControl::discover("/sys/class/backlight").await {
        info!("backlight class device found, native channel enabled");
        backends = backends.with_native_api(Arc::new(native));
    }

    if let Some(relay_url) = &app_config.network.relay_url {
        match HttpRelay::new(
            relay_url.clone(),
            Duration::from_millis(app_config.network.timeout_ms),
        ) {
            Ok(relay) => {
                info!(relay_url, "network relay channel enabled");
                backends = backends.with_network(Arc::new(NetworkControl::new(Arc::new(relay))));
            }
            Err(e) => warn!(error = %e, "network relay disabled"),
        }
    }

    let sensor: Arc<dyn lux_engine::infrastructure::sensor::AmbientSensor> =
        match &app_config.sensor.device {
            Some(device) => Arc::new(SerialLineSensor::new(device.clone())),
            None => Arc::new(lux_engine::infrastructure::sensor::NullSensor),
        };

    let coordinates = match (app_config.location.latitude, app_config.location.longitude) {
        (Some(latitude), Some(longitude)) => Some(Coordinates {
            latitude,
            longitude,
        }),
        _ => None,
    };

    let collaborators = engine::Collaborators {
        datastore,
        enumerator: Arc::new(DrmEnumerator::default()),
        backends: Arc::new(backends),
        sensor,
        location: Arc::new(StaticLocation::new(coordinates)),
        prompter: Arc::new(AutoPrompter),
        topology: Arc::new(engine::NullTopology),
        audio: Arc::new(engine::NoAudio),
    };

    let ctx = engine::EngineContext::new((&app_config).into(), collaborators);
    ctx.initialize().await;
    watchdog::start(&ctx);

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!("luxd ready");

    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !running.load(Ordering::Relaxed) {
            break;
        }
    }

    watchdog::stop(&ctx);
    ctx.persist_displays().await;
    if let Err(e) = config::save_config(&app_config) {
        error!(error = %e, "failed to persist config on shutdown");
    }

    info!("luxd stopped");
    Ok(())
}
