//! JSON API for assessments and stored task results.
//!
//! - `POST   /v1/assessments`          - run one remote assessment
//! - `POST   /v1/task-results`         - record a scored submission
//! - `GET    /v1/task-results`         - page through results (`skip`, `limit`)
//! - `GET    /v1/task-results/{id}`    - fetch one result
//! - `PUT    /v1/task-results/{id}`    - rename a result
//! - `DELETE /v1/task-results/{id}`    - remove a result
//!
//! Success bodies are `{success, message, data}`; failures are
//! `{success: false, messages: [...], correlation_id}`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bandscore_agent::{Assessment, AssessmentRuntime};
use bandscore_core::domain::task_result::{TaskResult, TaskResultId};
use bandscore_core::{ApplicationError, AssessmentRequest, InterfaceError, TaskCategory};
use bandscore_db::{NewTaskResult, TaskResultService};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct ApiState {
    assessments: Arc<AssessmentRuntime>,
    results: Arc<TaskResultService>,
    permits: Arc<Semaphore>,
    default_user_id: String,
    shutdown: CancellationToken,
}

impl ApiState {
    pub fn new(
        assessments: Arc<AssessmentRuntime>,
        results: Arc<TaskResultService>,
        max_concurrent_runs: usize,
        default_user_id: impl Into<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            assessments,
            results,
            permits: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
            default_user_id: default_user_id.into(),
            shutdown,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    fn ok(message: &str, data: T) -> Json<Self> {
        Json(Self { success: true, message: message.to_owned(), data })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub messages: Vec<String>,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn from_application(error: impl Into<ApplicationError>) -> Self {
        Self(error.into().into_interface(Uuid::new_v4().to_string()))
    }

    fn status(&self) -> StatusCode {
        match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::BAD_GATEWAY,
            InterfaceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut messages = vec![self.0.user_message().to_owned()];
        if !status.is_server_error() {
            messages.push(self.0.message().to_owned());
        }

        warn!(
            event_name = "api.request.failed",
            correlation_id = %self.0.correlation_id(),
            status = status.as_u16(),
            error = %self.0,
            "request failed"
        );

        let body = ErrorBody {
            success: false,
            messages,
            correlation_id: self.0.correlation_id().to_owned(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct AssessmentBody {
    pub task_category: u8,
    pub task_statement: String,
    pub candidate_text: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RenameBody {
    #[serde(default)]
    pub name: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/assessments", post(create_assessment))
        .route("/v1/task-results", post(create_task_result).get(list_task_results))
        .route(
            "/v1/task-results/{id}",
            get(get_task_result).put(update_task_result).delete(delete_task_result),
        )
        .with_state(state)
}

async fn create_assessment(
    State(state): State<ApiState>,
    Json(body): Json<AssessmentBody>,
) -> ApiResult<String> {
    let user_id = body
        .user_id
        .filter(|user_id| !user_id.trim().is_empty())
        .unwrap_or_else(|| state.default_user_id.clone());
    let request = AssessmentRequest::new(
        user_id,
        TaskCategory::from(body.task_category),
        body.task_statement,
        body.candidate_text,
    );
    request.validate().map_err(ApiError::from_application)?;

    let _permit = state.permits.acquire().await.map_err(|_| {
        ApiError::from_application(ApplicationError::Configuration(
            "assessment capacity is closed".to_owned(),
        ))
    })?;

    let cancel = state.shutdown.child_token();
    let Assessment { text, resent, .. } =
        state.assessments.assess(&request, &cancel).await.map_err(ApiError::from_application)?;

    info!(
        event_name = "api.assessment.completed",
        user_id = %request.user_id,
        resent,
        "assessment served"
    );
    Ok(ApiResponse::ok("assessment completed", text))
}

async fn create_task_result(
    State(state): State<ApiState>,
    Json(body): Json<NewTaskResult>,
) -> Result<(StatusCode, Json<ApiResponse<TaskResult>>), ApiError> {
    let created = state.results.submit(body).await.map_err(ApiError::from_application)?;
    Ok((StatusCode::CREATED, ApiResponse::ok("task result created", created)))
}

async fn list_task_results(
    State(state): State<ApiState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<TaskResult>> {
    let skip = page.skip.unwrap_or(0);
    let limit = page.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let results = state.results.list(skip, limit).await.map_err(ApiError::from_application)?;
    Ok(ApiResponse::ok("task results listed", results))
}

async fn get_task_result(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<TaskResult> {
    let result =
        state.results.get(&TaskResultId(id)).await.map_err(ApiError::from_application)?;
    Ok(ApiResponse::ok("task result found", result))
}

async fn update_task_result(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<RenameBody>,
) -> ApiResult<TaskResult> {
    let updated = state
        .results
        .update(&TaskResultId(id), &body.name)
        .await
        .map_err(ApiError::from_application)?;
    Ok(ApiResponse::ok("task result updated", updated))
}

async fn delete_task_result(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<String> {
    state.results.delete(&TaskResultId(id.clone())).await.map_err(ApiError::from_application)?;
    Ok(ApiResponse::ok("task result deleted", id))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use bandscore_agent::{AssessmentRuntime, CorrelationPolicy, SessionSource};
    use bandscore_core::config::CorrelationStrategy;
    use bandscore_core::prompt::PromptFormat;
    use bandscore_db::{InMemoryResultCache, InMemoryTaskResultRepository, TaskResultService};
    use bandscore_directline::{
        Activity, ConversationTransport, PollBatch, SendAck, Session, TransportError,
    };
    use serde_json::{json, Value};
    use tokio::sync::Mutex;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::{router, ApiState};

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        acks: VecDeque<Result<SendAck, TransportError>>,
        batches: VecDeque<PollBatch>,
        senders: Vec<String>,
    }

    #[async_trait]
    impl ConversationTransport for ScriptedTransport {
        async fn open_session(&self) -> Result<Session, TransportError> {
            Ok(Session::new("sess1", "token".to_owned().into()))
        }

        async fn post(
            &self,
            _session: &Session,
            sender_id: &str,
            _text: &str,
        ) -> Result<SendAck, TransportError> {
            let mut state = self.state.lock().await;
            state.senders.push(sender_id.to_owned());
            state.acks.pop_front().unwrap_or_else(|| Ok(SendAck::new("sess1|1")))
        }

        async fn poll(
            &self,
            _session: &Session,
            _watermark: u64,
        ) -> Result<PollBatch, TransportError> {
            Ok(self.state.lock().await.batches.pop_front().unwrap_or_default())
        }
    }

    fn app(transport: Arc<ScriptedTransport>) -> Router {
        let policy = CorrelationPolicy {
            strategy: CorrelationStrategy::MostRecent,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            max_attempts: Some(3),
            deadline: Some(Duration::from_secs(5)),
        };
        let assessments = Arc::new(AssessmentRuntime::new(
            transport,
            policy,
            SessionSource::Open,
            PromptFormat::Outline,
        ));
        let results = Arc::new(TaskResultService::new(
            Arc::new(InMemoryTaskResultRepository::default()),
            Some(Arc::new(InMemoryResultCache::default())),
        ));
        router(ApiState::new(assessments, results, 2, "bandscore", CancellationToken::new()))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, payload)
    }

    #[tokio::test]
    async fn assessment_returns_cleaned_reply_text() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.state.lock().await.batches.push_back(PollBatch {
            activities: vec![Activity {
                kind: "message".to_owned(),
                id: "sess1|2".to_owned(),
                text: "Details: 1) Task Achievement: - Band score: 6".to_owned(),
                ..Activity::default()
            }],
            watermark: None,
        });
        let app = app(transport.clone());

        let (status, payload) = send(
            &app,
            Method::POST,
            "/v1/assessments",
            Some(json!({
                "task_category": 1,
                "task_statement": "Describe a chart",
                "candidate_text": "The chart shows..."
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["success"], json!(true));
        assert_eq!(payload["data"], json!("Details: 1) Task Achievement: - Band score: 6"));
        assert_eq!(transport.state.lock().await.senders, vec!["bandscore"]);
    }

    #[tokio::test]
    async fn invalid_assessment_is_a_bad_request() {
        let app = app(Arc::new(ScriptedTransport::default()));

        let (status, payload) = send(
            &app,
            Method::POST,
            "/v1/assessments",
            Some(json!({"task_category": 2, "task_statement": "", "candidate_text": "essay"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload["success"], json!(false));
        assert!(payload["messages"]
            .as_array()
            .expect("messages")
            .iter()
            .any(|message| message == "task_statement is required"));
    }

    #[tokio::test]
    async fn unanswered_assessment_is_a_gateway_timeout() {
        let app = app(Arc::new(ScriptedTransport::default()));

        let (status, payload) = send(
            &app,
            Method::POST,
            "/v1/assessments",
            Some(json!({
                "task_category": 2,
                "task_statement": "Discuss both views",
                "candidate_text": "Some people believe...",
                "user_id": "student-9"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(payload["success"], json!(false));
        assert!(payload["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn upstream_failure_is_a_bad_gateway() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.state.lock().await.acks.push_back(Err(TransportError::Status {
            operation: "post_activity",
            status: 500,
            body: "boom".to_owned(),
        }));
        let app = app(transport);

        let (status, payload) = send(
            &app,
            Method::POST,
            "/v1/assessments",
            Some(json!({"task_category": 1, "task_statement": "a", "candidate_text": "b"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(payload["messages"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn task_result_lifecycle() {
        let app = app(Arc::new(ScriptedTransport::default()));

        let (status, created) = send(
            &app,
            Method::POST,
            "/v1/task-results",
            Some(json!({"name": "Chart essay", "score": 6.5, "comment": "clear overview"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["data"]["id"].as_str().expect("id").to_owned();

        let (status, fetched) = send(&app, Method::GET, &format!("/v1/task-results/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["data"]["name"], json!("Chart essay"));

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/v1/task-results/{id}"),
            Some(json!({"name": "Chart essay"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, renamed) = send(
            &app,
            Method::PUT,
            &format!("/v1/task-results/{id}"),
            Some(json!({"name": "Bar chart essay"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renamed["data"]["name"], json!("Bar chart essay"));

        let (status, listed) = send(&app, Method::GET, "/v1/task-results?skip=0&limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));

        let (status, _) = send(&app, Method::DELETE, &format!("/v1/task-results/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, missing) =
            send(&app, Method::DELETE, &format!("/v1/task-results/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(missing["success"], json!(false));
    }

    #[tokio::test]
    async fn invalid_task_result_is_rejected() {
        let app = app(Arc::new(ScriptedTransport::default()));

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/task-results",
            Some(json!({"name": "essay", "score": 11.0})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
