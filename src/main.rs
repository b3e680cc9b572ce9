use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use birthday_reminder::config::Config;
use birthday_reminder::google_oauth::GoogleOauthService;
use birthday_reminder::logging::init_tracing;
use birthday_reminder::mail::SmtpMailer;
use birthday_reminder::service::ReminderScheduler;
use birthday_reminder::storage::PhotoStore;
use birthday_reminder::{AppState, app_router, db};
use clap::Parser;
use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[command(version, about = "Birthday tracker with scheduled email reminders")]
struct Args {
    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    host: Option<IpAddr>,
    #[arg(long)]
    port: Option<u16>,
    /// Keep the database and uploads under ./data.
    #[arg(long)]
    portable: bool,
}

impl Args {
    fn apply(&self, cfg: &mut Config) {
        let addr = cfg.basic.listen_addr;
        cfg.basic.listen_addr = SocketAddr::new(
            self.host.unwrap_or(addr.ip()),
            self.port.unwrap_or(addr.port()),
        );
        if self.portable {
            cfg.basic.portable = true;
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut cfg = Config::load_from(args.config.as_deref())?;
    args.apply(&mut cfg);

    init_tracing(&cfg.logging);

    let db_path = cfg.database_path();
    let uploads_dir = cfg.uploads_dir();
    info!(
        database = %db_path.display(),
        uploads = %uploads_dir.display(),
        listen = %cfg.basic.listen_addr,
        access_key = cfg.basic.access_key.is_some(),
        loglevel = %cfg.logging.level
    );

    let pool = db::connect(&db_path).await?;
    let photos = PhotoStore::new(uploads_dir);
    photos.initialize().await?;

    let oauth = GoogleOauthService::new(cfg.google.clone())?;
    let mailer = Arc::new(SmtpMailer::new(oauth.clone()));
    let state = AppState::new(&cfg, pool, photos, mailer, oauth);

    let scheduler = ReminderScheduler::start(&cfg.reminders, state.reminders.clone()).await?;
    info!(jobs = scheduler.job_count(), "scheduler started");

    let app = app_router(state);
    let listener = TcpListener::bind(cfg.basic.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.basic.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = scheduler.shutdown().await {
        warn!(error = %e, "scheduler did not stop cleanly");
    }
    Ok(())
}
