//! HTTP server: axum router, handlers, and the error-to-response mapping.

use super::{AppState, SharedState};
use crate::cache::CachedResult;
use crate::error::{AnalysisError, AssistantError, ErrorClass};
use crate::report::{
    AssistantRequest, AssistantResponse, ErrorBody, HealthResponse, RegressionAnalysis,
    ServiceBanner, country_response, demographics_response, distributions_response,
    overview_response, scatter_response,
};
use crate::research::GroundingBuilder;
use crate::stats::overview;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use essight_core::{GatewayConfig, ResearchDepth};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// A request-boundary failure, rendered as `{error: {class, code, message, retryable}}`.
#[derive(Debug)]
pub enum ApiError {
    Analysis(AnalysisError),
    Assistant(AssistantError),
    /// A worker task panicked or was cancelled.
    Internal(String),
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        ApiError::Analysis(err)
    }
}

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        ApiError::Assistant(err)
    }
}

impl ApiError {
    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Analysis(e) => ErrorBody::new(e.class(), e.code(), e.to_string()),
            ApiError::Assistant(e) => ErrorBody::new(e.class(), e.code(), e.to_string()),
            ApiError::Internal(message) => {
                ErrorBody::new(ErrorClass::Unavailable, "internal", message.clone())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = self.body();
        let status = StatusCode::from_u16(body.error.class.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

/// Run a CPU-bound engine call off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, AnalysisError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(join) => {
            error!(error = %join, "Analysis task failed");
            Err(ApiError::Internal(format!("analysis task failed: {join}")))
        }
    }
}

/// Build the API router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/api/health", get(health_handler))
        .route("/api/data-overview", get(overview_handler))
        .route("/api/regression-analysis", get(regression_handler))
        .route("/api/data-distributions", get(distributions_handler))
        .route("/api/country-analysis", get(country_handler))
        .route("/api/demographics-analysis", get(demographics_handler))
        .route("/api/scatter-data", get(scatter_handler))
        .route("/api/ai-assistant", post(assistant_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root_handler() -> impl IntoResponse {
    Json(ServiceBanner {
        message: "ESS Data Analysis API".to_string(),
        status: "running".to_string(),
    })
}

async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let snapshot = state.store.snapshot();
    Json(HealthResponse {
        status: "healthy".to_string(),
        observations: snapshot.dataset.len(),
        generation: snapshot.generation,
        uptime_secs: state.uptime_secs(),
        assistant_configured: state.assistant.is_configured(),
    })
}

async fn overview_handler(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let snapshot = state.store.snapshot();
    let generation = snapshot.generation;
    let ov = blocking(move || Ok(overview(&snapshot.dataset))).await?;
    let body = overview_response(&ov);
    state.cache.publish(generation, CachedResult::Overview(ov));
    Ok(Json(body).into_response())
}

async fn regression_handler(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let snapshot = state.store.snapshot();
    let generation = snapshot.generation;
    let config = state.analysis.clone();
    let analysis = blocking(move || RegressionAnalysis::run(&snapshot.dataset, &config)).await?;
    let body = analysis.to_response();

    info!(
        generation,
        n_obs = analysis.result.n_obs,
        r_squared = analysis.result.r_squared,
        "Regression analysis served"
    );
    let RegressionAnalysis {
        result,
        outliers,
        correlation,
    } = analysis;
    state.cache.publish(
        generation,
        CachedResult::Regression {
            result: Box::new(result),
            outliers,
        },
    );
    state
        .cache
        .publish(generation, CachedResult::Correlation(correlation));
    Ok(Json(body).into_response())
}

async fn distributions_handler(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let snapshot = state.store.snapshot();
    let body = blocking(move || distributions_response(&snapshot.dataset)).await?;
    Ok(Json(body).into_response())
}

async fn country_handler(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let snapshot = state.store.snapshot();
    let body = blocking(move || country_response(&snapshot.dataset)).await?;
    Ok(Json(body).into_response())
}

async fn demographics_handler(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let snapshot = state.store.snapshot();
    let response = state.analysis.response.clone();
    let body = blocking(move || demographics_response(&snapshot.dataset, &response)).await?;
    Ok(Json(body).into_response())
}

async fn scatter_handler(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let snapshot = state.store.snapshot();
    let (size, seed) = (state.analysis.scatter_sample_size, state.analysis.scatter_seed);
    let body = blocking(move || scatter_response(&snapshot.dataset, size, seed)).await?;
    Ok(Json(body).into_response())
}

async fn assistant_handler(
    State(state): State<SharedState>,
    Json(request): Json<AssistantRequest>,
) -> Result<Response, ApiError> {
    let depth: ResearchDepth = request
        .research_depth
        .parse()
        .map_err(AssistantError::from)?;
    let snapshot = state.store.snapshot();
    let facts = GroundingBuilder::new(&snapshot, &state.cache).build();

    let reply = state.assistant.ask(depth, &facts, &request.message).await?;
    Ok(Json(AssistantResponse {
        response: reply.response,
        research_depth: reply.research_depth,
    })
    .into_response())
}

/// Serve the API on the configured address until Ctrl-C.
pub async fn run(state: SharedState, config: &GatewayConfig) -> Result<(), std::io::Error> {
    let app = router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

impl AppState {
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Catalog, Cell, Dataset, DatasetStore, SourceInfo};
    use crate::research::ResearchAssistant;
    use axum::body::Body;
    use essight_core::{AnalysisConfig, LlmConfig, MockLlmProvider};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> SharedState {
        let raw = Dataset::from_columns(
            Catalog::ess_default(),
            vec![
                ("cntry".into(), vec![Cell::Text("DE".into()), Cell::Text("FR".into())]),
                ("impcntr".into(), vec![Cell::Number(1.0), Cell::Number(3.0)]),
                ("lrscale".into(), vec![Cell::Number(2.0), Cell::Number(8.0)]),
                ("hincfel".into(), vec![Cell::Number(1.0), Cell::Number(2.0)]),
                ("eisced".into(), vec![Cell::Number(3.0), Cell::Number(6.0)]),
                ("aesfdrk".into(), vec![Cell::Number(2.0), Cell::Number(1.0)]),
                ("agea".into(), vec![Cell::Number(30.0), Cell::Number(55.0)]),
                ("gndr".into(), vec![Cell::Number(1.0), Cell::Number(2.0)]),
            ],
        )
        .unwrap();
        let store = DatasetStore::from_raw(
            raw,
            Catalog::ess_default(),
            vec!["impcntr".into()],
            SourceInfo::in_memory(),
        )
        .unwrap();
        let assistant = ResearchAssistant::new(
            Arc::new(MockLlmProvider::with_response("ok")),
            &LlmConfig::default(),
        );
        AppState::new(store, assistant, AnalysisConfig::default())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_router_builds() {
        let _app = router(state());
    }

    #[tokio::test]
    async fn test_root_banner() {
        let (status, json) = get_json(router(state()), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "ESS Data Analysis API");
        assert_eq!(json["status"], "running");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, json) = get_json(router(state()), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["observations"], 2);
        assert_eq!(json["generation"], 1);
        assert_eq!(json["assistant_configured"], true);
    }

    #[tokio::test]
    async fn test_regression_on_tiny_dataset_is_precondition() {
        let (status, json) = get_json(router(state()), "/api/regression-analysis").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"]["class"], "precondition");
        assert_eq!(json["error"]["code"], "insufficient_data");
        assert_eq!(json["error"]["retryable"], false);
    }

    #[test]
    fn test_error_status_mapping() {
        let resp = ApiError::from(AnalysisError::UnknownVariable("x".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp =
            ApiError::from(AssistantError::NotConfigured("no key".into())).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
