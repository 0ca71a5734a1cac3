use async_trait::async_trait;
use convoy_core::core_types::{ModelTurn, Role, ToolCallRequest};
use convoy_core::errors::AgentError;
use convoy_core::llm::ScriptedModelClient;
use convoy_core::tools::{handler_fn, McpToolFactory, MockToolTransport, ToolFactory, ToolRegistry, ToolSpec};
use convoy_core::{
    ConversationSession, DispatchLoop, SessionConfig, SessionState, StopReason, TerminationPolicy, ToolChoice,
};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn travel_registry() -> Arc<ToolRegistry> {
    Arc::new(ToolFactory::create_travel_registry().unwrap())
}

#[tokio::test]
async fn test_travel_conversation_with_mixed_tool_results() {
    let llm = Arc::new(ScriptedModelClient::new(vec![
        ModelTurn::with_tool_calls(
            "",
            vec![
                ToolCallRequest::new("call_1", "getWeather", r#"{"location":"Paris"}"#),
                ToolCallRequest::new("call_2", "searchFlight", "not json"),
                ToolCallRequest::new("call_3", "rentCar", "{}"),
                ToolCallRequest::new(
                    "call_4",
                    "bookHotel",
                    r#"{"city":"Paris","check_in":"2025-06-01","check_out":"2025-06-05"}"#,
                ),
            ],
        ),
        ModelTurn::text("Paris is 25 degrees and your hotel is booked (HOTEL123)."),
    ]));

    let config = SessionConfig {
        tool_choice: ToolChoice::Auto,
        ..SessionConfig::default()
    };
    let mut session = ConversationSession::new(llm.clone(), travel_registry(), config, "Plan my Paris trip");
    let outcome = session.run().await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::NoToolCalls);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(session.state(), SessionState::Terminated);

    let tool_messages: Vec<_> = session.history().iter().filter(|m| m.role == Role::Tool).collect();
    let ids: Vec<_> = tool_messages.iter().map(|m| m.tool_call_id.as_deref().unwrap()).collect();
    assert_eq!(ids, vec!["call_1", "call_2", "call_3", "call_4"]);

    let weather: Value = serde_json::from_str(&tool_messages[0].content).unwrap();
    assert_eq!(weather["location"], "Paris");
    assert_eq!(weather["unit"], "celsius");
    assert_eq!(tool_messages[1].content, "invalid arguments");
    assert_eq!(tool_messages[2].content, "unknown tool");
    assert!(tool_messages[3].content.contains("HOTEL123"));

    // The second model call sees every tool result.
    let second = &llm.requests()[1];
    assert_eq!(second.messages.iter().filter(|m| m.role == Role::Tool).count(), 4);
    assert_eq!(second.tools.len(), 3);
}

#[tokio::test]
async fn test_forced_booking_then_keyword_termination() {
    let llm = Arc::new(ScriptedModelClient::new(vec![
        ModelTurn::with_tool_calls(
            "",
            vec![ToolCallRequest::new(
                "c1",
                "bookHotel",
                r#"{"city":"Rome","check_in":"2025-07-01","check_out":"2025-07-03"}"#,
            )],
        ),
        ModelTurn::with_tool_calls(
            "Booked. TERMINATE",
            vec![ToolCallRequest::new("c2", "getWeather", r#"{"location":"Rome"}"#)],
        ),
        ModelTurn::text("never requested"),
    ]));

    let config = SessionConfig {
        tool_choice: ToolChoice::Forced("bookHotel".to_string()),
        ..SessionConfig::default()
    };
    let mut session = ConversationSession::new(llm.clone(), travel_registry(), config, "Book me a hotel in Rome")
        .with_termination(TerminationPolicy::KeywordMatch("TERMINATE".to_string()));
    let outcome = session.run().await.unwrap();

    assert!(matches!(outcome.stop_reason, StopReason::Termination(ref reason) if reason == "Text 'TERMINATE' mentioned"));
    assert_eq!(llm.call_count(), 2);
    assert_eq!(llm.remaining(), 1);
    assert_eq!(llm.requests()[0].tool_choice, ToolChoice::Forced("bookHotel".to_string()));
    assert_eq!(llm.requests()[1].tool_choice, ToolChoice::Auto);
}

#[tokio::test]
async fn test_model_failure_surfaces_to_caller() {
    let llm = Arc::new(ScriptedModelClient::with_results(vec![Err(AgentError::ModelCall(
        "connection refused".to_string(),
    ))]));
    let mut session = ConversationSession::new(llm, travel_registry(), SessionConfig::default(), "hello");

    let err = session.run().await.unwrap_err();
    assert!(matches!(err, AgentError::ModelCall(_)));
    assert_eq!(session.state(), SessionState::Terminated);
    assert!(matches!(session.stop_reason(), Some(StopReason::ModelCallFailed(_))));
    assert!(matches!(session.run().await, Err(AgentError::SessionTerminated(_))));
}

#[tokio::test]
async fn test_session_over_mcp_backed_tools() {
    let transport = Arc::new(MockToolTransport::new());
    let registry = McpToolFactory::new(transport.clone()).create_registry().await.unwrap();

    let llm = Arc::new(ScriptedModelClient::new(vec![
        ModelTurn::with_tool_calls(
            "",
            vec![
                ToolCallRequest::new("c1", "add", r#"{"a": 40, "b": 2}"#),
                ToolCallRequest::new("c2", "get_weather", r#"{"city": "Chicago"}"#),
            ],
        ),
        ModelTurn::text("42, and Chicago is windy."),
    ]));
    let mut session = ConversationSession::new(llm, Arc::new(registry), SessionConfig::default(), "add and weather");
    let outcome = session.run().await.unwrap();

    assert_eq!(outcome.final_response.as_deref(), Some("42, and Chicago is windy."));
    assert_eq!(transport.calls().len(), 2);
}

struct CountingHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl convoy_core::tools::ToolHandler for CountingHandler {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"echo": arguments}))
    }
}

#[tokio::test]
async fn test_dispatch_returns_one_result_per_request() {
    let counter = Arc::new(CountingHandler {
        calls: AtomicUsize::new(0),
    });
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolSpec::new("echo", "Echo", json!({"type": "object", "properties": {"text": {"type": "string"}}})),
            counter.clone(),
        )
        .unwrap();
    registry
        .register(
            ToolSpec::new("fail", "Always fails", json!({"type": "object", "properties": {}})),
            handler_fn(|_| async {
                Err(AgentError::ToolError {
                    tool_name: "fail".to_string(),
                    message: "boom".to_string(),
                })
            }),
        )
        .unwrap();

    let requests: Vec<ToolCallRequest> = (0..6)
        .map(|i| {
            let name = if i % 3 == 2 { "fail" } else { "echo" };
            ToolCallRequest::new(format!("r{i}"), name, format!(r#"{{"text":"{i}"}}"#))
        })
        .collect();

    let dispatcher = DispatchLoop::new(Arc::new(registry)).with_parallelism(true);
    let results = dispatcher.dispatch(&requests).await;

    assert_eq!(results.len(), requests.len());
    for (request, result) in requests.iter().zip(&results) {
        assert_eq!(result.request_id, request.id);
        assert_eq!(result.is_error(), request.name == "fail");
    }
    assert_eq!(counter.calls.load(Ordering::SeqCst), 4);
    assert_eq!(results[0].output["echo"]["text"], "0");
}
