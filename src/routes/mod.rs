pub mod health;
pub mod results;
pub mod session;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub fn router(state: AppState) -> Router {
    let session_api = Router::new()
        .route("/api/sessions", post(session::start_session))
        .route("/api/sessions/:id", get(session::get_session))
        .route(
            "/api/sessions/:id/modules/:module/enter",
            post(session::enter_module),
        )
        .route(
            "/api/sessions/:id/modules/:module/answers",
            put(session::record_answer),
        )
        .route(
            "/api/sessions/:id/modules/:module/submit",
            post(session::submit_module),
        )
        .route("/api/sessions/:id/finalize", post(session::finalize_session))
        .route(
            "/api/sessions/:id/violations",
            post(session::report_violation),
        )
        .route("/api/sessions/:id/report", get(results::get_report));

    Router::new()
        .route("/health", get(health::health))
        .merge(session_api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
