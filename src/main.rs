use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;
use std::time::Duration;

use licensegate::audit::{AuditSink, Origin};
use licensegate::clock::{Clock, SystemClock};
use licensegate::config::Config;
use licensegate::db::{AppState, create_pool, init_audit_db, init_db};
use licensegate::engine::LicenseEngine;
use licensegate::handlers;
use licensegate::rate_limit::RateLimiter;

#[derive(Parser, Debug)]
#[command(name = "licensegate")]
#[command(about = "Machine-bound license key issuance and verification server")]
struct Cli {
    /// Issue N licenses, print their keys and exit
    #[arg(long, value_name = "N", requires = "days")]
    issue: Option<usize>,

    /// Validity in days for --issue
    #[arg(long, value_name = "D")]
    days: Option<i64>,

    /// Renumber license ids to a dense 1..N sequence and exit
    #[arg(long)]
    reorder_ids: bool,

    /// Delete databases on exit (useful for fresh starts during development)
    #[arg(long)]
    ephemeral: bool,
}

/// Purge audit logs past their retention (0 = keep forever).
fn purge_expired_logs(engine: &LicenseEngine, config: &Config) {
    match engine.purge_usage_logs(config.usage_log_retention_days) {
        Ok(count) if count > 0 => tracing::info!(
            "Purged {} usage log entries older than {} days",
            count,
            config.usage_log_retention_days
        ),
        Ok(_) => {}
        Err(e) => tracing::warn!("Failed to purge usage logs: {}", e),
    }
    match engine.purge_admin_logs(config.admin_log_retention_days) {
        Ok(count) if count > 0 => tracing::info!(
            "Purged {} admin log entries older than {} days",
            count,
            config.admin_log_retention_days
        ),
        Ok(_) => {}
        Err(e) => tracing::warn!("Failed to purge admin logs: {}", e),
    }
}

/// Spawns a background task that prunes audit logs and idle rate-limit keys.
fn spawn_cleanup_task(engine: LicenseEngine, limiter: Arc<RateLimiter>, config: Config) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(60 * 60);

        loop {
            tokio::time::sleep(interval).await;

            purge_expired_logs(&engine, &config);

            let dropped = limiter.purge_idle();
            if dropped > 0 {
                tracing::debug!("Dropped {} idle rate limit keys", dropped);
            }
        }
    });

    tracing::info!("Background cleanup task started (runs every hour)");
}

fn remove_database_files(paths: &[&str]) {
    for path in paths {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove {}: {}", path, e);
        } else {
            tracing::info!("Removed {}", path);
        }
        let _ = std::fs::remove_file(format!("{}-wal", path));
        let _ = std::fs::remove_file(format!("{}-shm", path));
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "licensegate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    });

    if config.debug {
        tracing::info!("APP_DEBUG is on: internal error detail is returned to clients");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    let audit_pool =
        create_pool(&config.audit_database_path).expect("Failed to create audit database pool");

    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }
    {
        let conn = audit_pool.get().expect("Failed to get audit connection");
        init_audit_db(&conn).expect("Failed to initialize audit database");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let audit = AuditSink::new(audit_pool, config.audit_log_enabled);
    let engine = LicenseEngine::new(
        db_pool,
        audit,
        Arc::clone(&clock),
        config.key_format.clone(),
    );

    // One-shot commands
    if let Some(count) = cli.issue {
        let days = cli.days.unwrap_or_default();
        match engine.issue_batch(count, days, None, &Origin::system()) {
            Ok(licenses) => {
                for license in licenses {
                    println!("{}", license.license_key);
                }
            }
            Err(e) => {
                eprintln!("Failed to issue licenses: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if cli.reorder_ids {
        match engine.reorder_ids(&Origin::system()) {
            Ok(count) => println!("Reordered {} licenses", count),
            Err(e) => {
                eprintln!("Failed to reorder ids: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    purge_expired_logs(&engine, &config);

    let limiter = Arc::new(RateLimiter::new(config.rate_limit, Arc::clone(&clock)));
    spawn_cleanup_task(engine.clone(), Arc::clone(&limiter), config.clone());

    let state = AppState { engine };

    let app = handlers::build_pipeline(state, &config, clock, limiter)
        .into_axum()
        .layer(TraceLayer::new_for_http());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    if cli.ephemeral {
        tracing::info!("EPHEMERAL MODE: databases will be deleted on exit");
    }

    tracing::info!("licensegate listening on {}", addr);

    // Connect info carries the peer address used for rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cli.ephemeral {
        tracing::info!("Cleaning up ephemeral databases...");
        remove_database_files(&[&config.database_path, &config.audit_database_path]);
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
