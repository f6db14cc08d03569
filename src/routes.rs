use crate::{api::snapshot, config::Config, gateway};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::web;

/// Per-peer limiter allowing `requests_per_min` with an equal burst.
fn build_limiter(requests_per_min: u32) -> Option<Governor<PeerIpKeyExtractor, NoOpMiddleware>> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        60_000 / requests_per_min as u64
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms.max(1))
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()?;
    Some(Governor::new(&cfg))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    // Viewer stream; connects are rate limited, open streams are not.
    match build_limiter(config.rate_connect_per_min) {
        Some(limiter) => cfg.service(
            web::resource("/ws")
                .wrap(limiter)
                .route(web::get().to(gateway::stream)),
        ),
        None => {
            tracing::warn!("Connect rate limiter misconfigured, /ws is unthrottled");
            cfg.service(web::resource("/ws").route(web::get().to(gateway::stream)))
        }
    };

    // Read-only API
    cfg.service(
        web::scope(&config.api_prefix)
            .service(web::resource("/snapshot").route(web::get().to(snapshot::latest_snapshot)))
            .service(web::resource("/status").route(web::get().to(snapshot::status))),
    );
}
