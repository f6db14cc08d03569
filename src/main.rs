use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use attendance_live::aggregate::Aggregator;
use attendance_live::bus;
use attendance_live::config::Config;
use attendance_live::db::init_db;
use attendance_live::docs;
use attendance_live::gateway::Gateway;
use attendance_live::poller::{Poller, PollerSettings};
use attendance_live::routes;
use attendance_live::snapshot;
use attendance_live::source::{DeviceBridge, EventSource};
use attendance_live::store::{LogStore, MySqlLogStore};

use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;
use utoipa_swagger_ui::SwaggerUi;

const BROKER_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[get("/")]
async fn index() -> impl Responder {
    "Attendance live view"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "attendance.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!("Server starting...");

    let bridge = DeviceBridge::new(&config.device_addr, config.device_port, config.device_timeout)
        .context("Failed to build device bridge client")?;
    if let Err(e) = bridge.probe().await {
        warn!(error = %e, "Terminal not reachable yet, first cycles may be skipped");
    }
    let source: Arc<dyn EventSource> = Arc::new(bridge);

    let bus = bus::connect(config.redis_url.as_deref(), BROKER_CONNECT_TIMEOUT).await;
    info!(backend = bus.backend(), channel = %config.redis_channel, "Distribution bus ready");

    let store: Option<Arc<dyn LogStore>> = match config.database_url.as_deref() {
        Some(url) => match init_db(url).await {
            Ok(pool) => Some(Arc::new(MySqlLogStore::new(pool))),
            Err(e) => {
                error!(error = %e, "Database unavailable, punches will not be persisted");
                None
            }
        },
        None => None,
    };

    let (snapshot_writer, snapshot_reader) = snapshot::channel();
    let poller = Poller::new(
        source.clone(),
        Aggregator::local(config.threshold_minutes),
        bus.clone(),
        store,
        snapshot_writer,
        PollerSettings {
            channel: config.redis_channel.clone(),
            mode: config.payload_mode,
            active_employee_ids: config.active_employee_ids.clone(),
            retention_days: config.retention_days,
        },
    );
    let scheduler = actix_web::rt::spawn(poller.run(config.poll_interval));

    let gateway = Gateway::new(bus, snapshot_reader, config.redis_channel.clone());
    let server_addr = config.server_addr.clone();
    let config_data = config.clone();
    let openapi = docs::openapi_for(&config.api_prefix);

    let result = HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi.clone()),
            )
            .app_data(Data::new(gateway.clone()))
            .service(index)
            .configure(|cfg| routes::configure(cfg, &config_data))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await;

    info!("Server stopping...");
    scheduler.abort();
    source.close().await;

    result.context("HTTP server error")
}
