//! Axum HTTP surface: report creation (redirect) and report read-back (JSON).

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use habrep_report::{DedupGate, GenerateReports};
use habrep_store::ReportStore;
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CRATE_NAME: &str = "habrep-web";

/// Collaborators for the two handlers, injected at startup and shared as
/// trait objects; no ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<dyn GenerateReports>,
    pub store: Arc<dyn ReportStore>,
}

impl AppState {
    pub fn new(reports: Arc<dyn GenerateReports>, store: Arc<dyn ReportStore>) -> Self {
        Self { reports, store }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/users/{user_id}/reports", get(create_report_handler))
        .route("/users/reports/{report_id}", get(get_report_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn create_report_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(user_id): AxumPath<String>,
) -> Response {
    let report = match state.reports.generate(&user_id).await {
        Ok(report) => report,
        Err(err) => return server_error(&format!("could not generate user report: {err}")),
    };

    let gate = DedupGate::new(state.store.clone());
    match gate.find_or_insert(&report).await {
        Ok(outcome) => {
            info!(
                report_id = outcome.report_id,
                deduplicated = outcome.deduplicated,
                %user_id,
                "report ready"
            );
            let location = format!("/users/reports/{}", outcome.report_id);
            match header::HeaderValue::from_str(&location) {
                Ok(value) => {
                    let mut resp = StatusCode::FOUND.into_response();
                    resp.headers_mut().insert(header::LOCATION, value);
                    with_cors(resp)
                }
                Err(err) => server_error(&format!("could not build redirect location: {err}")),
            }
        }
        Err(err) => server_error(&format!("could not store user report: {err}")),
    }
}

async fn get_report_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(report_id): AxumPath<String>,
) -> Response {
    // the segment is captured as a string so a malformed id surfaces as a
    // plain 500 like every other failure, not a routing-level rejection
    let report_id: i64 = match report_id.parse() {
        Ok(report_id) => report_id,
        Err(err) => return server_error(&format!("could not parse reportId from request: {err}")),
    };

    match state.store.get_by_id(report_id).await {
        Ok(report) => with_cors(Json(report).into_response()),
        Err(err) => server_error(&format!("could not get report: {err}")),
    }
}

fn server_error(message: &str) -> Response {
    error!("handler error: {message}");
    with_cors((StatusCode::INTERNAL_SERVER_ERROR, message.to_string()).into_response())
}

fn with_cors(mut resp: Response) -> Response {
    let headers = resp.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        header::HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        header::HeaderValue::from_static("GET"),
    );
    resp
}
