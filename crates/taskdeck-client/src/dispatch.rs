use std::time::Duration;

use taskdeck_core::{DispatchError, DispatchRequest, RunId};
use tracing::{info, warn};

use crate::api::ApiClient;

/// Issues `POST /api/agent/execute` under a hard ceiling. Single-flight and
/// ticket bookkeeping live in the run log; this only performs the call.
#[derive(Clone, Debug)]
pub struct TaskDispatcher {
    api: ApiClient,
    timeout: Duration,
}

impl TaskDispatcher {
    pub fn new(api: ApiClient) -> Self {
        let timeout = api.config().dispatch_timeout;
        Self { api, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn dispatch(&self, request: DispatchRequest) -> Result<RunId, DispatchError> {
        if request.task.trim().is_empty() {
            return Err(DispatchError::EmptyDescription);
        }
        info!(
            event = "dispatch_start",
            model = %request.model,
            mode = request.mode.as_str(),
            chars = request.task.chars().count()
        );
        let response = match tokio::time::timeout(self.timeout, self.api.execute_agent(&request)).await {
            Ok(result) => result.map_err(DispatchError::from),
            Err(_) => Err(DispatchError::Timeout(self.timeout)),
        };
        match response {
            Ok(response) => {
                info!(
                    event = "dispatch_ok",
                    run_id = %response.task_id,
                    status = response.status.as_deref().unwrap_or("")
                );
                Ok(response.task_id)
            }
            Err(err) => {
                warn!(event = "dispatch_failed", error = %err);
                Err(err)
            }
        }
    }
}
