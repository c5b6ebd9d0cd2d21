// src/tools/executor.rs: Runs capability invocations with a per-call time budget
//
// A call moves Pending -> Running -> {Completed | Failed | Timeout} and is
// terminal afterwards. Batches run concurrently by default; a timeout,
// failure or panic is confined to the offending call.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::ToolRegistry;
use super::{prepare_params, Params, ToolResult};
use crate::infra::config::ToolsConfig;
use crate::infra::errors::VeriteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl ToolCallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ToolCallStatus::Completed | ToolCallStatus::Failed | ToolCallStatus::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCallStatus::Pending => "pending",
            ToolCallStatus::Running => "running",
            ToolCallStatus::Completed => "completed",
            ToolCallStatus::Failed => "failed",
            ToolCallStatus::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub params: Params,
    pub status: ToolCallStatus,
    pub result: Option<ToolResult>,
    pub error: Option<String>,
    pub elapsed: Option<Duration>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, params: Params) -> Self {
        Self::with_id(format!("call_{}", uuid::Uuid::new_v4().simple()), name, params)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>, params: Params) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            params,
            status: ToolCallStatus::Pending,
            result: None,
            error: None,
            elapsed: None,
        }
    }

    /// Convenience for callers holding a JSON object literal.
    pub fn from_json(name: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Params::new(),
        };
        Self::new(name, params)
    }

    fn finish(&mut self, status: ToolCallStatus, started: Instant) {
        self.status = status;
        self.elapsed = Some(started.elapsed());
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload")
}

pub struct ToolCallExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    parallel_by_default: bool,
}

impl ToolCallExecutor {
    pub fn new(registry: Arc<ToolRegistry>, config: &ToolsConfig) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(config.timeout_seconds),
            parallel_by_default: config.parallel,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a single call to a terminal state. Never returns an error: every
    /// failure is recorded on the returned `ToolCall`.
    pub async fn execute(&self, mut call: ToolCall) -> ToolCall {
        let started = Instant::now();

        if call.status.is_terminal() {
            tracing::debug!(tool = %call.name, id = %call.id, "Call already terminal, skipping");
            return call;
        }

        let Some(capability) = self.registry.get(&call.name) else {
            let err = VeriteError::ToolNotFound {
                name: call.name.clone(),
            };
            tracing::warn!(tool = %call.name, "{}", err);
            call.error = Some(err.to_string());
            call.finish(ToolCallStatus::Failed, started);
            return call;
        };

        let params = match prepare_params(&capability.parameters(), &call.params) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(tool = %call.name, "Rejected parameters: {}", e);
                call.error = Some(e.to_string());
                call.finish(ToolCallStatus::Failed, started);
                return call;
            }
        };

        call.status = ToolCallStatus::Running;
        tracing::info!(tool = %call.name, id = %call.id, "Executing tool call");

        let run = AssertUnwindSafe(capability.execute(&params)).catch_unwind();
        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(Ok(result))) => {
                if !result.success {
                    tracing::warn!(
                        tool = %call.name,
                        "Tool reported failure: {}",
                        result.error.as_deref().unwrap_or("unknown")
                    );
                }
                call.result = Some(result);
                call.finish(ToolCallStatus::Completed, started);
            }
            Ok(Ok(Err(e))) => {
                let err = VeriteError::ToolFailure {
                    name: call.name.clone(),
                    message: e.to_string(),
                };
                tracing::warn!(tool = %call.name, "{}", err);
                call.error = Some(err.to_string());
                call.finish(ToolCallStatus::Failed, started);
            }
            Ok(Err(panic)) => {
                let err = VeriteError::ToolFailure {
                    name: call.name.clone(),
                    message: format!("panicked: {}", panic_message(&*panic)),
                };
                tracing::error!(tool = %call.name, "{}", err);
                call.error = Some(err.to_string());
                call.finish(ToolCallStatus::Failed, started);
            }
            Err(_) => {
                let err = VeriteError::ToolTimeout {
                    name: call.name.clone(),
                    seconds: self.timeout.as_secs(),
                };
                tracing::warn!(tool = %call.name, "{}", err);
                call.error = Some(err.to_string());
                call.finish(ToolCallStatus::Timeout, started);
            }
        }

        tracing::debug!(
            tool = %call.name,
            status = call.status.as_str(),
            elapsed_ms = call.elapsed.map(|d| d.as_millis() as u64).unwrap_or(0),
            "Tool call finished"
        );
        call
    }

    /// Run a batch, concurrently or strictly in order. Output order matches input.
    pub async fn execute_batch(&self, calls: Vec<ToolCall>, parallel: bool) -> Vec<ToolCall> {
        tracing::info!(count = calls.len(), parallel, "Executing tool batch");
        if parallel {
            join_all(calls.into_iter().map(|c| self.execute(c))).await
        } else {
            let mut done = Vec::with_capacity(calls.len());
            for call in calls {
                done.push(self.execute(call).await);
            }
            done
        }
    }

    /// Batch using the configured default mode.
    pub async fn execute_all(&self, calls: Vec<ToolCall>) -> Vec<ToolCall> {
        self.execute_batch(calls, self.parallel_by_default).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Capability, ParamType, ToolParameter};
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Capability for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input"
        }
        fn parameters(&self) -> Vec<ToolParameter> {
            vec![ToolParameter::required("text", ParamType::String, "Text")]
        }
        async fn execute(&self, params: &Params) -> Result<ToolResult, VeriteError> {
            Ok(ToolResult::ok("echo", json!({"text": params["text"]})))
        }
    }

    struct SoftFail;

    #[async_trait]
    impl Capability for SoftFail {
        fn name(&self) -> &str {
            "soft_fail"
        }
        fn description(&self) -> &str {
            "Reports failure without erroring"
        }
        fn parameters(&self) -> Vec<ToolParameter> {
            vec![]
        }
        async fn execute(&self, _params: &Params) -> Result<ToolResult, VeriteError> {
            Ok(ToolResult::failure("soft_fail", "nothing to do"))
        }
    }

    fn executor() -> ToolCallExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        registry.register(Arc::new(SoftFail));
        ToolCallExecutor::new(Arc::new(registry), &ToolsConfig::default())
    }

    #[tokio::test]
    async fn test_execute_completes() {
        let call = executor()
            .execute(ToolCall::from_json("echo", json!({"text": "hi"})))
            .await;
        assert_eq!(call.status, ToolCallStatus::Completed);
        assert_eq!(call.result.unwrap().data["text"], "hi");
        assert!(call.elapsed.is_some());
        assert!(call.error.is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool_fails() {
        let call = executor()
            .execute(ToolCall::from_json("missing", json!({})))
            .await;
        assert_eq!(call.status, ToolCallStatus::Failed);
        assert!(call.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_bad_params_fail_before_running() {
        let call = executor().execute(ToolCall::from_json("echo", json!({}))).await;
        assert_eq!(call.status, ToolCallStatus::Failed);
        assert!(call.error.unwrap().contains("text"));
    }

    #[tokio::test]
    async fn test_soft_failure_is_completed_with_result() {
        let call = executor()
            .execute(ToolCall::from_json("soft_fail", json!({})))
            .await;
        assert_eq!(call.status, ToolCallStatus::Completed);
        let result = call.result.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("nothing to do"));
    }

    #[tokio::test]
    async fn test_terminal_call_untouched() {
        let mut call = ToolCall::from_json("echo", json!({"text": "x"}));
        call.status = ToolCallStatus::Failed;
        let call = executor().execute(call).await;
        assert_eq!(call.status, ToolCallStatus::Failed);
        assert!(call.result.is_none());
    }

    #[tokio::test]
    async fn test_sequential_batch_preserves_order() {
        let calls = vec![
            ToolCall::with_id("a", "echo", json!({"text": "1"}).as_object().unwrap().clone()),
            ToolCall::with_id("b", "missing", Params::new()),
            ToolCall::with_id("c", "echo", json!({"text": "3"}).as_object().unwrap().clone()),
        ];
        let done = executor().execute_batch(calls, false).await;
        let ids: Vec<_> = done.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(done[1].status, ToolCallStatus::Failed);
    }

    #[test]
    fn test_status_terminality() {
        assert!(!ToolCallStatus::Pending.is_terminal());
        assert!(!ToolCallStatus::Running.is_terminal());
        assert!(ToolCallStatus::Timeout.is_terminal());
    }
}
