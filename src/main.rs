//! Historical statistics daemon.
//!
//! Runs one sensor per stored configuration, keeps the running set in sync
//! with the database and serves snapshots over HTTP and WebSocket.

use historical_stats::database::Database;
use historical_stats::engine::{StatisticsEngine, DEFAULT_VALUE_AT_TOLERANCE_MINS};
use historical_stats::recorder::RecorderMaintenance;
use historical_stats::sensor::{SensorManager, ThreadScheduler, BROADCAST_TX};
use historical_stats::settings::Settings;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("historical_stats=info")),
        )
        .init();

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              Historical Statistics                         ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    println!("🔧 Opening recorder database...");
    let db = Database::open()?;
    let settings = Settings::load(&db);
    println!("   ✓ Database ready at {}", Database::get_db_path().display());

    let tolerance = chrono::Duration::try_minutes(settings.value_at_tolerance_mins)
        .unwrap_or_else(|| chrono::Duration::minutes(DEFAULT_VALUE_AT_TOLERANCE_MINS));
    let mut engine =
        StatisticsEngine::new(Arc::new(db.clone())).with_value_at_tolerance(tolerance);
    if settings.statistics_fallback {
        engine = engine.with_statistics(Arc::new(db.clone()));
    }

    // Start HTTP server
    println!("🔧 Starting HTTP server...");
    let broadcast_tx = historical_stats::server::start_server(db.clone(), settings.http_port);
    let _ = BROADCAST_TX.set(broadcast_tx);
    println!(
        "   ✓ HTTP server listening on http://127.0.0.1:{}",
        settings.http_port
    );

    // Shutdown signal
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        println!("\n🛑 Shutdown signal received...");
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    })?;

    let scheduler = Arc::new(ThreadScheduler::default());

    println!("🔧 Starting recorder maintenance...");
    let maintenance =
        RecorderMaintenance::new(db.clone(), settings.purge_keep_days).schedule(scheduler.as_ref());
    println!(
        "   ✓ Hourly statistics compiled, states kept for {} day(s)",
        settings.purge_keep_days
    );

    println!("🔧 Starting sensors...");
    let mut manager = SensorManager::new(engine, Arc::new(db.clone()), scheduler);
    let summary = manager.sync(db.list_configurations()?);
    println!("   ✓ {} sensor(s) running", summary.started);

    println!();
    println!("════════════════════════════════════════════════════════════════");
    println!("🌐 API available at http://127.0.0.1:{}", settings.http_port);
    println!("   • GET  /api/sensors           - Sensor snapshots");
    println!("   • GET  /api/configurations    - Stored configurations");
    println!("   • POST /api/states/:entity_id - Record a state change");
    println!("   • WS   /ws                    - Real-time updates");
    println!("════════════════════════════════════════════════════════════════");
    println!();

    // Pick up configurations added or edited by the setup tool
    let reload_every = Duration::from_secs(settings.reload_check_secs);
    let mut last_reload = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
        if last_reload.elapsed() < reload_every {
            continue;
        }
        last_reload = Instant::now();

        match db.list_configurations() {
            Ok(configs) => {
                manager.sync(configs);
            }
            Err(e) => tracing::warn!(?e, "Failed to reload configurations"),
        }
    }

    println!("\n⏳ Stopping sensors...");
    manager.shutdown_all();
    maintenance.stop();

    println!("\n👋 Historical statistics has exited. Goodbye!");
    Ok(())
}
