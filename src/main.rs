//! # Prayer Tracker Application Entry Point
//!
//! Command-line front end for the prayer time engine. It resolves today's prayer times through
//! the same cache and fallback chain a mobile UI would use, prints them as a table and can
//! schedule the day's notifications against an in-process notification center.


use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use prayer_clock_lib::clock::{Clock, SystemClock};
use prayer_clock_lib::config::{Config, CONFIG_FILE};
use prayer_clock_lib::location::FixedLocationDevice;
use prayer_clock_lib::notifications::{LogNotificationCenter, NotificationScheduler};
use prayer_clock_lib::renderer::draw_ascii;
use prayer_clock_lib::service::PrayerTimeService;
use prayer_clock_lib::store::FileStore;
use prayer_clock_lib::CalculationMethod;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "prayer-tracker")]
#[command(about = "Location-aware prayer times with cached results and notifications")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: String,

    /// Latitude (overrides config file)
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude (overrides config file)
    #[arg(long, allow_hyphen_values = true)]
    lng: Option<f64>,

    /// Calculation method to persist, e.g. NorthAmerica or MuslimWorldLeague
    #[arg(long)]
    method: Option<CalculationMethod>,

    /// Show another day instead of today (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Discard the cached day and resolve again
    #[arg(long)]
    refresh: bool,

    /// Schedule today's notifications after resolving
    #[arg(long)]
    notify: bool,

    /// Use the remote timing service ahead of local calculation
    #[arg(long, env = "PRAYER_TRACKER_REMOTE")]
    remote: bool,
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prayer_clock_lib=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_from_path(&cli.config);

    // Apply CLI overrides
    if let (Some(lat), Some(lng)) = (cli.lat, cli.lng) {
        config.location.latitude = lat;
        config.location.longitude = lng;
        config.location.name = String::new();
    }
    if cli.remote {
        config.remote.enabled = true;
    }

    let store = Arc::new(
        FileStore::open(&config.storage.dir)
            .with_context(|| format!("open store at {}", config.storage.dir.display()))?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let device = Arc::new(FixedLocationDevice::new(
        config.location.latitude,
        config.location.longitude,
        config.location.name.clone(),
    ));

    let service = PrayerTimeService::from_config(&config, device, store.clone(), clock.clone())?;

    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        if cli.lat.is_some() && cli.lng.is_some() {
            // New coordinates: the cached fix belongs to the old ones
            service.locations().clear_cache()?;
        }
        if let Some(method) = cli.method {
            service.set_method(method)?;
        }

        let resolution = match (cli.date, cli.refresh) {
            (Some(date), _) => service.times_for(date).await?,
            (None, true) => service.refresh().await?,
            (None, false) => service.today().await?,
        };

        for failure in &resolution.failures {
            warn!(strategy = failure.strategy, error = %failure.error, "Tier skipped");
        }

        draw_ascii(&resolution.times, clock.now());

        if cli.notify && config.notifications.enabled && cli.date.is_none() {
            let scheduler =
                NotificationScheduler::new(Arc::new(LogNotificationCenter::new()), store, clock);
            let batch = scheduler.reschedule(&resolution.times).await?;

            if let Some(minutes) = config.notifications.reminder_minutes {
                for prayer in &resolution.times.prayers {
                    scheduler.schedule_reminder(prayer, minutes).await?;
                }
            }
            info!(count = batch.ids.len(), "Notifications scheduled");
        }

        anyhow::Ok(())
    })
}
