use crate::codec;
use crate::gateway::Gateway;
use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[schema(example = "redis")]
    pub backend: String,
    #[schema(example = 3)]
    pub listeners: usize,
    /// Epoch milliseconds of the last published payload.
    #[schema(nullable = true)]
    pub last_updated: Option<i64>,
}

/// Latest attendance payload
#[utoipa::path(
    get,
    path = "/api/snapshot",
    responses(
        (status = 200, description = "Last published payload as JSON", content_type = "application/json", example = json!({
            "timestamp": 1744275600000_i64,
            "deviceDetails": { "firmware": "Ver 6.60 Sep 19 2019", "platform": "ZLM60_TFT" },
            "users": [{ "userId": "36", "name": "Alma Collado", "privilege": 0 }],
            "logs": [{
                "employeeId": "36",
                "name": "Alma Collado",
                "date": "2025-04-10",
                "dayOfWeek": "Thursday",
                "timeIn": "08:52:10",
                "timeOut": "17:31:02",
                "status": "Early"
            }]
        })),
        (status = 204, description = "Nothing published yet"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn latest_snapshot(gateway: web::Data<Gateway>) -> actix_web::Result<impl Responder> {
    let Some(snapshot) = gateway.latest() else {
        return Ok(HttpResponse::NoContent().finish());
    };

    let text = codec::transcode_to_text(&snapshot.payload).map_err(|e| {
        tracing::error!(error = %e, "Failed to render snapshot");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .body(text))
}

/// Pipeline status
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Bus backend and viewer count", body = StatusResponse)
    ),
    tag = "Attendance"
)]
pub async fn status(gateway: web::Data<Gateway>) -> impl Responder {
    HttpResponse::Ok().json(StatusResponse {
        backend: gateway.backend().to_string(),
        listeners: gateway.listener_count(),
        last_updated: gateway.latest().map(|s| s.generated_at),
    })
}
