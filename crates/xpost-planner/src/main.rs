use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use xpost_core::config::LogConfig;
use xpost_core::{Notifier, NotifierWorker, XpostConfig};
use xpost_discord::{BotState, DiscordAdapter, DiscordSink};
use xpost_publish::{PublishGateway, Publisher, XApi};
use xpost_scheduler::{ErrorAlert, PublishScheduler, Reconciler, Timing};
use xpost_store::{ImageStore, PostStore};

mod app;

const DEFAULT_LOG_FILTER: &str = "xpost_planner=info,xpost_scheduler=info,xpost_publish=info,\
                                  xpost_discord=info,xpost_store=info,xpost_core=info,tower_http=info";

/// Schedule X (Twitter) posts from Discord.
#[derive(Parser, Debug)]
#[command(name = "xpost-planner")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file (default: $XPOST_CONFIG or ~/.xpost/xpost.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real deployments use the environment directly.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    // load config: --config > XPOST_CONFIG env > ~/.xpost/xpost.toml
    let config_path = args.config.or_else(|| std::env::var("XPOST_CONFIG").ok());
    let config = XpostConfig::load(config_path.as_deref())?;
    init_tracing(&config.log);
    config.validate()?;

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    // The scheduler and the Discord UI each get their own connection.
    let scheduler_store = PostStore::open(db_path)?;
    let ui_store = PostStore::open(db_path)?;

    let images = ImageStore::new(&config.images.dir, config.images.max_bytes);
    images.ensure_dir().await?;

    let (notifier, notifier_worker) = build_notifier(&config);

    let gateway: Arc<dyn PublishGateway> = Arc::new(
        Publisher::new(XApi::new(&config.x)).with_max_attachments(config.images.max_per_post),
    );
    let reconciler = Reconciler::new(
        scheduler_store,
        gateway,
        notifier,
        Duration::from_secs(config.scheduler.publish_timeout_secs),
    )
    .with_slow_threshold(Duration::from_millis(config.scheduler.slow_publish_ms));
    let scheduler = PublishScheduler::new(reconciler, Timing::from(&config.scheduler))
        .with_error_alert(ErrorAlert::from(&config.scheduler));
    scheduler.start()?;

    let bot = Arc::new(BotState {
        store: ui_store,
        images,
        max_attachments: config.images.max_per_post,
    });
    let adapter = DiscordAdapter::new(&config.discord, bot)?;
    let discord_task = tokio::spawn(adapter.run());
    info!("Discord bot started");

    let http_task = if config.http.enabled {
        let state = Arc::new(app::AppState::new(scheduler.status()));
        let router = app::build_router(state);
        let addr: SocketAddr = format!("{}:{}", config.http.bind, config.http.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("health endpoint listening on http://{}/health", addr);
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "health server stopped");
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // Let an in-flight tick finish, then stop the UI and HTTP surfaces.
    scheduler.stop();
    scheduler.wait().await;
    discord_task.abort();
    if let Some(task) = http_task {
        task.abort();
    }

    // Dropping the scheduler drops the last Notifier, closing the queue.
    drop(scheduler);
    if let Some(worker) = notifier_worker {
        let delivered = worker.join().await;
        info!(delivered, "notification queue drained");
    }

    info!("xpost-planner stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(log.level.as_deref().unwrap_or(DEFAULT_LOG_FILTER))
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Operations-channel notifier, or a no-op one when no channel is configured.
fn build_notifier(config: &XpostConfig) -> (Notifier, Option<NotifierWorker>) {
    match config.discord.log_channel_id.filter(|id| *id != 0) {
        Some(channel_id) => {
            let sink = DiscordSink::new(&config.discord.bot_token, channel_id);
            let (notifier, worker) = Notifier::spawn(sink, config.notifier.queue_capacity);
            info!(channel_id, "publish notifications enabled");
            (notifier, Some(worker))
        }
        None => {
            warn!("discord.log_channel_id not set; publish notifications disabled");
            (Notifier::disabled(), None)
        }
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
