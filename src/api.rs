// HTTP API
// JSON endpoints for the browser client, one handler per operation

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::db::connection::{ConnectionConfig, ConnectionManager, ConnectionStatus};
use crate::db::query::{QueryEngine, QueryRequest};
use crate::db::schema::MetadataReader;
use crate::db::traits::DatabaseDriver;
use crate::diagnose::{DiagnoseReport, DiagnoseRequest, Diagnostics};
use crate::error::StudioError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub connection_manager: Arc<ConnectionManager>,
    pub query_engine: Arc<QueryEngine>,
    pub metadata: Arc<MetadataReader>,
    pub diagnostics: Arc<Diagnostics>,
}

impl AppState {
    pub fn new(driver: Arc<dyn DatabaseDriver>) -> Self {
        let connection_manager = Arc::new(ConnectionManager::new(driver));
        Self {
            query_engine: Arc::new(QueryEngine::new(Arc::clone(&connection_manager))),
            metadata: Arc::new(MetadataReader::new(Arc::clone(&connection_manager))),
            diagnostics: Arc::new(Diagnostics::new()),
            connection_manager,
        }
    }
}

impl IntoResponse for StudioError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = match &self {
            StudioError::ConnectionFailure(failure) => json!({
                "success": false,
                "message": failure.message,
                "suggestions": failure.suggestions,
                "originalError": failure.original_error,
            }),
            other => json!({ "success": false, "message": other.to_string() }),
        };

        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }
        (status, Json(body)).into_response()
    }
}

/// `Json` extractor whose rejections use the API's failure shape
#[derive(FromRequest)]
#[from_request(via(Json), rejection(StudioError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for StudioError {
    fn from(rejection: JsonRejection) -> Self {
        StudioError::InputValidation(rejection.body_text())
    }
}

type ApiResult = Result<Json<Value>, StudioError>;

#[derive(Debug, Default, Deserialize)]
struct DescribeRequest {
    #[serde(default)]
    table: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Success<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    payload: T,
}

fn success<T: Serialize>(payload: T) -> ApiResult {
    serde_json::to_value(Success {
        success: true,
        payload,
    })
    .map(Json)
    .map_err(|e| StudioError::QueryExecution(e.to_string()))
}

async fn connect(
    State(state): State<AppState>,
    ApiJson(config): ApiJson<ConnectionConfig>,
) -> ApiResult {
    let session = state.connection_manager.connect(&config).await?;
    success(json!({
        "message": "Connected to Oracle Database",
        "server": session.server,
        "service": session.service,
        "user": session.user,
        "sessionId": session.session_id,
        "format": session.format,
    }))
}

async fn disconnect(State(state): State<AppState>) -> ApiResult {
    let message = if state.connection_manager.disconnect().await? {
        "Disconnected from Oracle Database"
    } else {
        "No active connection"
    };
    success(json!({ "message": message }))
}

async fn execute(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<QueryRequest>,
) -> ApiResult {
    let output = state.query_engine.execute(&request).await?;
    success(output)
}

async fn tables(State(state): State<AppState>) -> ApiResult {
    let tables = state.metadata.list_tables().await?;
    success(json!({ "tables": tables }))
}

async fn describe(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DescribeRequest>,
) -> ApiResult {
    let table = state
        .metadata
        .describe(request.table.as_deref().unwrap_or_default())
        .await?;
    success(table)
}

async fn status(State(state): State<AppState>) -> Json<ConnectionStatus> {
    Json(state.connection_manager.status().await)
}

async fn diagnose(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DiagnoseRequest>,
) -> Json<DiagnoseReport> {
    Json(state.diagnostics.diagnose(&request).await)
}

/// Build the API router, open to cross-origin callers
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/connect", post(connect))
        .route("/api/disconnect", post(disconnect))
        .route("/api/execute", post(execute))
        .route("/api/tables", get(tables))
        .route("/api/describe", post(describe))
        .route("/api/status", get(status))
        .route("/api/diagnose", post(diagnose))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::{ConnectFailure, ConnectStringFormat};
    use crate::db::traits::DatabaseError;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_client_errors_are_400() {
        let response = StudioError::NotConnected.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "No active database connection");
    }

    #[tokio::test]
    async fn test_driver_errors_are_500() {
        let response = StudioError::QueryExecution("ORA-00942".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["message"], "Execution failed: ORA-00942");
    }

    #[tokio::test]
    async fn test_connect_failure_body_carries_suggestions() {
        let err = DatabaseError::driver(Some(12541), "ORA-12541: TNS:no listener");
        let attempted = vec![ConnectStringFormat::ServiceName];
        let failure = ConnectFailure::from_error(&err, "db.local", attempted);
        let response = StudioError::from(failure).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], "TNS: no listener");
        assert_eq!(body["originalError"], "ORA-12541: TNS:no listener");
        assert_eq!(body["suggestions"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_success_flattens_payload() {
        let Json(value) = success(json!({ "tables": ["A.B"] })).unwrap();
        assert_eq!(value, json!({ "success": true, "tables": ["A.B"] }));
    }
}
