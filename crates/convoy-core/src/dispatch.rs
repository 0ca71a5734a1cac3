//! Execution of one assistant turn's tool calls.
//!
//! Every request yields exactly one `ToolCallResult`, in request order. Bad
//! arguments, unknown tools and handler failures are reported on the result
//! and never abort the batch.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use crate::core_types::{ToolCallRequest, ToolCallResult};
use crate::errors::DispatchError;
use crate::tools::arguments::decode_arguments;
use crate::tools::ToolRegistry;

#[derive(Clone)]
pub struct DispatchLoop {
    registry: Arc<ToolRegistry>,
    parallel: bool,
    tool_timeout: Option<Duration>,
}

impl DispatchLoop {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            parallel: false,
            tool_timeout: None,
        }
    }

    /// Run the handlers of one batch concurrently. Result order is unchanged.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub async fn dispatch(&self, requests: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        log::debug!(
            "Dispatching {} tool calls ({})",
            requests.len(),
            if self.parallel { "parallel" } else { "sequential" }
        );

        if self.parallel {
            return join_all(requests.iter().map(|request| self.dispatch_one(request))).await;
        }

        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.dispatch_one(request).await);
        }
        results
    }

    pub async fn dispatch_one(&self, request: &ToolCallRequest) -> ToolCallResult {
        match self.execute(request).await {
            Ok(output) => {
                log::info!("Tool '{}' ({}) succeeded", request.name, request.id);
                ToolCallResult::success(request, output)
            }
            Err(e) => {
                log::warn!("Tool '{}' ({}) failed: {}", request.name, request.id, e);
                if let DispatchError::ArgumentDecode { details } = &e {
                    log::debug!("Raw arguments for {} did not decode: {}", request.id, details);
                }
                ToolCallResult::failure(request, e)
            }
        }
    }

    async fn execute(&self, request: &ToolCallRequest) -> Result<serde_json::Value, DispatchError> {
        let arguments = decode_arguments(&request.raw_arguments)?;
        let handler = self.registry.resolve(&request.name)?;
        let arguments = self.registry.prepare_arguments(&request.name, arguments)?;

        let invocation = handler.invoke(arguments);
        let output = match self.tool_timeout {
            Some(limit) => tokio::time::timeout(limit, invocation).await.map_err(|_| {
                DispatchError::HandlerExecution(format!("tool call timed out after {}s", limit.as_secs()))
            })??,
            None => invocation.await?,
        };
        Ok(output)
    }
}
