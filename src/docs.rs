use crate::api::snapshot::StatusResponse;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Live API",
        version = "0.1.0",
        description = r#"
## Live attendance view

Polls a biometric attendance terminal, turns its punches into per-employee
daily records and pushes every update to connected dashboards.

### Endpoints
- `GET /ws` streams every published payload (MessagePack binary frames, or
  JSON text frames with `?format=json`); the last payload is sent on connect.
- `GET /api/snapshot` returns the last payload as JSON.
- `GET /api/status` reports the bus backend and connected viewers.

### Status rules
Time-in before the threshold (default 09:00) is **Early**, exactly at it is
**On Time**, after it is **Late**. A day without both an in and an out punch
is **Absent**.
"#,
    ),
    paths(
        crate::api::snapshot::latest_snapshot,
        crate::api::snapshot::status,
    ),
    components(schemas(StatusResponse)),
    tags(
        (name = "Attendance", description = "Live attendance APIs"),
    )
)]
pub struct ApiDoc;

const DOCUMENTED_PREFIX: &str = "/api";

/// The API document with its paths moved under the configured prefix.
pub fn openapi_for(api_prefix: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    let prefix = api_prefix.trim_end_matches('/');
    doc.paths.paths = std::mem::take(&mut doc.paths.paths)
        .into_iter()
        .map(|(path, item)| match path.strip_prefix(DOCUMENTED_PREFIX) {
            Some(rest) => (format!("{prefix}{rest}"), item),
            None => (path, item),
        })
        .collect();
    doc
}
