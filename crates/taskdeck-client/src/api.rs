use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use taskdeck_core::{
    AgentName, Credential, DispatchRequest, DispatchResponse, EventType, LogEvent, RunId,
    SessionContext, UserProfile,
};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, ClientError};
use crate::session::SessionStore;

const MAX_DETAIL_CHARS: usize = 240;

#[derive(Debug, Clone, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    user: Option<UserProfile>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TaskRecord {
    pub id: RunId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TaskLogRecord {
    pub id: i64,
    pub task_id: RunId,
    pub agent_name: String,
    #[serde(default)]
    pub log_type: Option<String>,
    pub message: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl TaskLogRecord {
    pub fn to_log_event(&self, arrival_order: u64) -> LogEvent {
        LogEvent {
            agent: AgentName::from_wire(&self.agent_name),
            event_type: EventType::from_wire(self.log_type.as_deref()),
            content: self.message.clone(),
            timestamp: self.created_at.clone(),
            run_id: Some(self.task_id.clone()),
            status: None,
            arrival_order,
        }
    }
}

/// Uniform REST call contract. Every authenticated call carries the bearer
/// credential; any 401 discards the session.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: SessionStore) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ClientError::HttpSetup(err.to_string()))?;
        Ok(Self {
            http,
            config: config.clone(),
            session,
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn call<B, R>(&self, method: Method, path: &str, body: Option<&B>) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let credential = self.session.credential().ok_or(ApiError::NotAuthenticated)?;
        let mut request = self
            .http
            .request(method, self.config.endpoint(path))
            .bearer_auth(credential.expose());
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request, path, true).await
    }

    async fn send<R: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        path: &str,
        authenticated: bool,
    ) -> Result<R, ApiError> {
        let response = request.send().await.map_err(|err| {
            warn!(event = "api_transport_error", path = %path, error = %err);
            ApiError::Transport(err.to_string())
        })?;
        let status = response.status();
        debug!(event = "api_response", path = %path, status = status.as_u16());

        if status == StatusCode::UNAUTHORIZED && authenticated {
            self.session.invalidate(&format!("401 from {path}"));
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }
        response
            .json::<R>()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionContext, ApiError> {
        let path = "/api/auth/login";
        let request = self
            .http
            .post(self.config.endpoint(path))
            .json(&LoginRequest { email, password });
        let response: LoginResponse = self.send(request, path, false).await?;
        let credential = Credential::new(response.access_token)
            .ok_or_else(|| ApiError::Decode("login returned an empty token".to_string()))?;
        let context = SessionContext::new(credential, response.user);
        self.session.establish(context.clone());
        Ok(context)
    }

    /// Adopts a pre-issued token and validates it against `/api/auth/me`.
    pub async fn resume(&self, credential: Credential) -> Result<SessionContext, ApiError> {
        self.session
            .establish(SessionContext::new(credential.clone(), None));
        let user = match self.me().await {
            Ok(user) => user,
            Err(err) => {
                self.session.invalidate("pre-issued token could not be validated");
                return Err(err);
            }
        };
        let context = SessionContext::new(credential, Some(user));
        self.session.establish(context.clone());
        Ok(context)
    }

    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        self.call::<(), _>(Method::GET, "/api/auth/me", None).await
    }

    pub async fn models(&self) -> Result<Vec<ModelInfo>, ApiError> {
        self.call::<(), _>(Method::GET, "/api/models/", None).await
    }

    pub async fn execute_agent(&self, request: &DispatchRequest) -> Result<DispatchResponse, ApiError> {
        self.call(Method::POST, "/api/agent/execute", Some(request))
            .await
    }

    pub async fn tasks(&self) -> Result<Vec<TaskRecord>, ApiError> {
        self.call::<(), _>(Method::GET, "/api/tasks/", None).await
    }

    pub async fn task_logs(&self, id: &RunId) -> Result<Vec<TaskLogRecord>, ApiError> {
        let path = format!("/api/tasks/{id}/logs");
        self.call::<(), _>(Method::GET, &path, None).await
    }
}

/// FastAPI puts the reason in `{"detail": ...}`; anything else is truncated raw text.
fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(detail) = value.get("detail") {
            return match detail {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
        }
    }
    body.chars().take(MAX_DETAIL_CHARS).collect()
}
