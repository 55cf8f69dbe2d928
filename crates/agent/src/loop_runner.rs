//! The agent loop.
//!
//! One invocation per user turn: load the recent history prefix, append the
//! query, then iterate stream → dispatch tools → feed results back, up to
//! `max_iterations`. Events stream out live; the turn is persisted as one
//! assistant message (plus one synthetic tool-result message when tools
//! ran) only on natural stop. Cancellation is checked at every stream
//! event, after every tool dispatch, and before the persistence write; a
//! cancelled turn drains its provider stream and persists nothing.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use voxtask_core::{
    ChatMessage, Error, EventStream, HistoryMessage, HistoryRole, LlmProvider, ProviderError,
    StopReason, StreamEvent, StreamRequest, TokenUsage, ToolInvocation, ToolOutcome, ToolRegistry,
};
use voxtask_store::{CostEntry, CostLog, HistoryStore};
use voxtask_telemetry::PricingTable;

use crate::stream_event::AgentEvent;
use crate::system_prompt::build_system_prompt;

/// How an invocation ended (errors are returned separately).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Cancelled,
}

/// Token/iteration accounting, accumulated across retries.
#[derive(Debug, Default)]
struct TurnStats {
    usage: TokenUsage,
    iterations: u32,
    tool_calls: u32,
}

pub struct AgentLoop {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    history: HistoryStore,
    costs: CostLog,
    pricing: Arc<PricingTable>,
    history_window: usize,
    max_iterations: u32,
    max_output_tokens: u32,
    turn_timeout: Duration,
    retry_backoff: Duration,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        history: HistoryStore,
        costs: CostLog,
        pricing: Arc<PricingTable>,
    ) -> Self {
        Self {
            provider,
            tools,
            history,
            costs,
            pricing,
            history_window: 3,
            max_iterations: 3,
            max_output_tokens: 1024,
            turn_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Process one user query. Emits [`AgentEvent`]s on `events`; respects
    /// `cancel` at every suspension point. A transient failure retries once
    /// silently; the second failure clears history (a half-written turn
    /// would poison the next prompt), emits an `error` event, and returns
    /// the error.
    pub async fn run(
        &self,
        query: &str,
        events: &mpsc::Sender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, Error> {
        info!(query = %query, "Agent invocation starting");

        let prefix = self.load_prefix().await?;
        self.history
            .append(HistoryRole::User, query, None, None)
            .await?;

        let mut base = prefix;
        base.push(ChatMessage::user(query));

        let _ = events
            .send(AgentEvent::Thinking {
                content: "Processing your request...".into(),
            })
            .await;

        let mut stats = TurnStats::default();
        let mut last_error: Option<Error> = None;

        for attempt in 0..2u32 {
            if attempt > 0 {
                tokio::time::sleep(self.retry_backoff).await;
            }
            if cancel.is_cancelled() {
                return Ok(TurnOutcome::Cancelled);
            }

            let turn = tokio::time::timeout(
                self.turn_timeout,
                self.run_turn(&base, events, cancel, &mut stats),
            )
            .await;

            match turn {
                Ok(Ok(TurnOutcome::Completed)) => {
                    self.record_cost(query, &stats).await;
                    return Ok(TurnOutcome::Completed);
                }
                Ok(Ok(TurnOutcome::Cancelled)) => return Ok(TurnOutcome::Cancelled),
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "Agent turn failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(attempt, timeout_secs = self.turn_timeout.as_secs(), "Agent turn timed out");
                    last_error = Some(
                        ProviderError::Timeout(format!("{}s", self.turn_timeout.as_secs())).into(),
                    );
                }
            }
        }

        // Retries exhausted.
        if stats.usage.total() > 0 {
            self.record_cost(query, &stats).await;
        }
        let error = last_error.unwrap_or_else(|| Error::Internal("agent turn failed".into()));
        let _ = self.history.clear().await;
        let _ = events
            .send(AgentEvent::Error {
                message: error.to_string(),
            })
            .await;
        Err(error)
    }

    /// Load the prompt prefix from history. A structurally invalid window —
    /// an assistant tool call with no recorded result — clears the whole
    /// log and starts over with an empty prefix.
    async fn load_prefix(&self) -> Result<Vec<ChatMessage>, Error> {
        let messages = self.history.tail(self.history_window).await?;
        match to_chat_messages(&messages) {
            Ok(chat) => Ok(chat),
            Err(reason) => {
                warn!(%reason, "Corrupted history; clearing and proceeding with empty prefix");
                self.history.clear().await?;
                Ok(Vec::new())
            }
        }
    }

    async fn run_turn(
        &self,
        base: &[ChatMessage],
        events: &mpsc::Sender<AgentEvent>,
        cancel: &CancellationToken,
        stats: &mut TurnStats,
    ) -> Result<TurnOutcome, Error> {
        let mut messages = base.to_vec();
        let system = build_system_prompt(Utc::now(), &self.tools.names());
        let tool_defs = self.tools.definitions();

        let mut assistant_text = String::new();
        let mut all_calls: Vec<ToolInvocation> = Vec::new();
        let mut all_results: Vec<ToolOutcome> = Vec::new();
        let mut iteration = 0u32;

        loop {
            iteration += 1;
            stats.iterations += 1;
            debug!(iteration, "Agent loop iteration");

            let request = StreamRequest {
                messages: messages.clone(),
                tools: tool_defs.clone(),
                system: system.clone(),
                max_output_tokens: self.max_output_tokens,
            };
            let mut stream = self.provider.stream(request).await?;

            let mut iteration_text = String::new();
            let mut iter_calls: Vec<ToolInvocation> = Vec::new();
            let mut iter_results: Vec<ToolOutcome> = Vec::new();
            let mut stop_reason: Option<StopReason> = None;

            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => {
                        drain(&mut stream).await;
                        return Ok(TurnOutcome::Cancelled);
                    }
                    event = stream.recv() => event,
                };
                let Some(event) = event else {
                    return Err(ProviderError::StreamInterrupted(
                        "provider stream closed before stop".into(),
                    )
                    .into());
                };

                match event? {
                    StreamEvent::TextDelta { text } => {
                        iteration_text.push_str(&text);
                        let _ = events.send(AgentEvent::Text { content: text }).await;
                    }
                    StreamEvent::ToolCallStart { name, .. } => {
                        let _ = events.send(AgentEvent::ToolUseStart { tool: name }).await;
                    }
                    StreamEvent::ToolCallArgsDelta { .. } => {}
                    StreamEvent::ToolCallComplete { id, name, input } => {
                        let _ = events
                            .send(AgentEvent::ToolUse {
                                tool: name.clone(),
                                input: input.clone(),
                            })
                            .await;

                        let envelope = self.tools.dispatch(&name, input.clone()).await;
                        stats.tool_calls += 1;
                        if cancel.is_cancelled() {
                            drain(&mut stream).await;
                            return Ok(TurnOutcome::Cancelled);
                        }

                        info!(tool = %name, success = envelope.success, "Tool dispatched");
                        let result = envelope.to_value();
                        let _ = events
                            .send(AgentEvent::ToolResult {
                                tool: name.clone(),
                                result: result.clone(),
                            })
                            .await;

                        iter_calls.push(ToolInvocation {
                            id: id.clone(),
                            name,
                            input,
                        });
                        iter_results.push(ToolOutcome {
                            tool_use_id: id,
                            content: result.to_string(),
                        });
                    }
                    StreamEvent::Usage { usage } => stats.usage.absorb(&usage),
                    StreamEvent::Stop { reason } => {
                        stop_reason = Some(reason);
                        break;
                    }
                }
            }

            assistant_text.push_str(&iteration_text);
            if !iter_calls.is_empty() {
                messages.push(ChatMessage::assistant_with_tools(
                    iteration_text,
                    iter_calls.clone(),
                ));
                messages.push(ChatMessage::tool_results(iter_results.clone()));
                all_calls.extend(iter_calls);
                all_results.extend(iter_results);
            }

            match stop_reason {
                Some(StopReason::ToolUse) if iteration < self.max_iterations => continue,
                Some(StopReason::ToolUse) => {
                    warn!(
                        max_iterations = self.max_iterations,
                        "Iteration cap reached; surfacing accumulated text"
                    );
                    break;
                }
                Some(StopReason::Error) => {
                    return Err(ProviderError::StreamInterrupted(
                        "provider reported an error stop".into(),
                    )
                    .into());
                }
                _ => break,
            }
        }

        if cancel.is_cancelled() {
            return Ok(TurnOutcome::Cancelled);
        }

        // Persist the turn: one assistant message, one tool-result carrier
        // iff any tool executed.
        self.history
            .append(
                HistoryRole::Assistant,
                &assistant_text,
                Some(&all_calls),
                None,
            )
            .await?;
        if !all_results.is_empty() {
            self.history
                .append(HistoryRole::User, "", None, Some(&all_results))
                .await?;
        }

        let _ = events.send(AgentEvent::Done).await;
        Ok(TurnOutcome::Completed)
    }

    async fn record_cost(&self, query: &str, stats: &TurnStats) {
        let cost = self
            .pricing
            .compute_cost(self.provider.model(), &stats.usage);
        self.costs
            .record(CostEntry {
                user_query: query.into(),
                model: self.provider.model().into(),
                usage: stats.usage,
                input_cost: cost.input_cost,
                output_cost: cost.output_cost,
                total_cost: cost.total_cost,
                iterations: stats.iterations,
                tool_calls_count: stats.tool_calls,
            })
            .await;
    }
}

/// Read the remainder of a stream so the remote connection is released,
/// discarding every event.
async fn drain(stream: &mut EventStream) {
    while stream.recv().await.is_some() {}
}

/// Convert a history window into provider messages.
///
/// A tool-result message at the head of the window whose pairing assistant
/// was cut off by the boundary is dropped. Any other mismatch — a dangling
/// tool call or an unmatched mid-window result — is corruption.
fn to_chat_messages(messages: &[HistoryMessage]) -> Result<Vec<ChatMessage>, String> {
    let mut chat = Vec::new();
    let mut pending: HashSet<String> = HashSet::new();

    for (index, msg) in messages.iter().enumerate() {
        if msg.is_tool_result() {
            let results = msg.tool_results.clone().unwrap_or_default();
            let mut all_known = true;
            for result in &results {
                if !pending.remove(&result.tool_use_id) {
                    all_known = false;
                }
            }
            if all_known {
                chat.push(ChatMessage::tool_results(results));
            } else if index == 0 {
                continue; // window boundary artifact
            } else {
                return Err(format!(
                    "tool result without matching tool call (message {})",
                    msg.id
                ));
            }
        } else {
            match msg.role {
                HistoryRole::User => chat.push(ChatMessage::user(&msg.content)),
                HistoryRole::Assistant => {
                    let calls = msg.tool_calls.clone().unwrap_or_default();
                    for call in &calls {
                        pending.insert(call.id.clone());
                    }
                    if calls.is_empty() {
                        chat.push(ChatMessage::assistant(&msg.content));
                    } else {
                        chat.push(ChatMessage::assistant_with_tools(&msg.content, calls));
                    }
                }
            }
        }
    }

    if !pending.is_empty() {
        return Err("assistant tool call without matching tool result".into());
    }
    Ok(chat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use voxtask_store::Database;

    // --- scripted provider ---

    enum Script {
        Events(Vec<Result<StreamEvent, ProviderError>>),
        Fail(ProviderError),
        Hang,
    }

    struct MockProvider {
        scripts: Mutex<VecDeque<Script>>,
        // Keeps hung channels open so recv() never resolves.
        hang_guards: Mutex<Vec<mpsc::Sender<Result<StreamEvent, ProviderError>>>>,
    }

    impl MockProvider {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                hang_guards: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        fn model(&self) -> &str {
            "claude-sonnet-4-20250514"
        }

        async fn stream(&self, _request: StreamRequest) -> Result<EventStream, ProviderError> {
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .expect("mock script exhausted");
            match script {
                Script::Fail(e) => Err(e),
                Script::Hang => {
                    let (tx, rx) = mpsc::channel(8);
                    self.hang_guards.lock().unwrap().push(tx);
                    Ok(rx)
                }
                Script::Events(events) => {
                    let (tx, rx) = mpsc::channel(64);
                    tokio::spawn(async move {
                        for event in events {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    });
                    Ok(rx)
                }
            }
        }
    }

    fn usage(input: u64, output: u64) -> StreamEvent {
        StreamEvent::Usage {
            usage: TokenUsage {
                input_tokens: input,
                output_tokens: output,
                ..TokenUsage::default()
            },
        }
    }

    fn text_turn(text: &str) -> Script {
        Script::Events(vec![
            Ok(StreamEvent::TextDelta { text: text.into() }),
            Ok(usage(100, 5)),
            Ok(StreamEvent::Stop {
                reason: StopReason::EndTurn,
            }),
        ])
    }

    fn tool_turn(id: &str, name: &str, input: serde_json::Value) -> Script {
        Script::Events(vec![
            Ok(StreamEvent::ToolCallStart {
                id: id.into(),
                name: name.into(),
            }),
            Ok(StreamEvent::ToolCallComplete {
                id: id.into(),
                name: name.into(),
                input,
            }),
            Ok(usage(200, 30)),
            Ok(StreamEvent::Stop {
                reason: StopReason::ToolUse,
            }),
        ])
    }

    struct Harness {
        agent: AgentLoop,
        db: Database,
        events_rx: mpsc::Receiver<AgentEvent>,
        events_tx: mpsc::Sender<AgentEvent>,
    }

    async fn harness(scripts: Vec<Script>) -> Harness {
        let db = Database::in_memory().await.unwrap();
        let tools = Arc::new(voxtask_tools::default_registry(db.tasks(), db.history()));
        let agent = AgentLoop::new(
            MockProvider::new(scripts),
            tools,
            db.history(),
            db.costs(),
            Arc::new(PricingTable::with_defaults()),
        )
        .with_retry_backoff(Duration::from_millis(5));
        let (events_tx, events_rx) = mpsc::channel(256);
        Harness {
            agent,
            db,
            events_rx,
            events_tx,
        }
    }

    fn collect(rx: &mut mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn text_only_turn_persists_one_assistant_message() {
        let mut h = harness(vec![text_turn("Done")]).await;
        let outcome = h
            .agent
            .run("Hello", &h.events_tx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);

        let events = collect(&mut h.events_rx);
        assert!(matches!(events[0], AgentEvent::Thinking { .. }));
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::Text { content } if content == "Done")));
        assert!(matches!(events.last(), Some(AgentEvent::Done)));

        let log = h.db.history().tail(10).await.unwrap();
        assert_eq!(log.len(), 2); // user query + assistant
        assert_eq!(log[0].role, HistoryRole::User);
        assert_eq!(log[1].role, HistoryRole::Assistant);
        assert_eq!(log[1].content, "Done");

        // Cost recorded against the model's pricing.
        let costs = h.db.costs().recent(1).await.unwrap();
        assert_eq!(costs.len(), 1);
        assert_eq!(costs[0].input_tokens, 100);
        assert!(costs[0].total_cost > 0.0);
    }

    #[tokio::test]
    async fn tool_turn_executes_and_persists_both_messages() {
        let mut h = harness(vec![
            tool_turn("toolu_1", "create_task", json!({"title": "Call the dentist"})),
            text_turn("Done"),
        ])
        .await;

        let outcome = h
            .agent
            .run("Add a task to call the dentist", &h.events_tx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);

        // The tool really ran.
        let tasks = h.db.tasks().list(&Default::default()).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Call the dentist");

        // Event ordering: tool_use_start < tool_use < tool_result < done.
        let events = collect(&mut h.events_rx);
        let pos = |pred: &dyn Fn(&AgentEvent) -> bool| events.iter().position(|e| pred(e)).unwrap();
        let start = pos(&|e| matches!(e, AgentEvent::ToolUseStart { .. }));
        let used = pos(&|e| matches!(e, AgentEvent::ToolUse { .. }));
        let result = pos(&|e| matches!(e, AgentEvent::ToolResult { .. }));
        let done = pos(&|e| matches!(e, AgentEvent::Done));
        assert!(start < used && used < result && result < done);

        // Exactly one assistant message and one tool-result carrier.
        let log = h.db.history().tail(10).await.unwrap();
        assert_eq!(log.len(), 3);
        assert!(log[1].has_tool_calls());
        assert!(log[2].is_tool_result());
        assert_eq!(
            log[1].tool_calls.as_ref().unwrap()[0].id,
            log[2].tool_results.as_ref().unwrap()[0].tool_use_id
        );

        // Cost aggregates both iterations.
        let costs = h.db.costs().recent(1).await.unwrap();
        assert_eq!(costs[0].iterations, 2);
        assert_eq!(costs[0].input_tokens, 300);
        assert_eq!(costs[0].tool_calls_count, 1);
    }

    #[tokio::test]
    async fn iteration_cap_is_honored() {
        // The model keeps asking for tools; the loop must stop at 3.
        let h = harness(vec![
            tool_turn("t1", "get_task_stats", json!({})),
            tool_turn("t2", "get_task_stats", json!({})),
            tool_turn("t3", "get_task_stats", json!({})),
        ])
        .await;

        let outcome = h
            .agent
            .run("Stats forever", &h.events_tx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);

        let log = h.db.history().tail(10).await.unwrap();
        // user + assistant + tool results
        assert_eq!(log.len(), 3);
        assert_eq!(log[1].tool_calls.as_ref().unwrap().len(), 3);

        let costs = h.db.costs().recent(1).await.unwrap();
        assert_eq!(costs[0].iterations, 3);
    }

    #[tokio::test]
    async fn cancelled_invocation_appends_only_the_user_query() {
        let h = harness(vec![text_turn("never seen")]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = h.agent.run("Turn A", &h.events_tx, &cancel).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Cancelled);

        // The user query from step 2 remains; nothing else was persisted.
        let log = h.db.history().tail(10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].role, HistoryRole::User);
        assert_eq!(log[0].content, "Turn A");

        assert!(h.db.costs().recent(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_failure_retries_silently_then_succeeds() {
        let mut h = harness(vec![
            Script::Fail(ProviderError::Network("connection reset".into())),
            text_turn("Recovered"),
        ])
        .await;

        let outcome = h
            .agent
            .run("Hello", &h.events_tx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);

        let events = collect(&mut h.events_rx);
        assert!(!events.iter().any(|e| matches!(e, AgentEvent::Error { .. })));

        let log = h.db.history().tail(10).await.unwrap();
        assert_eq!(log.len(), 2, "one query, one assistant turn despite retry");
    }

    #[tokio::test]
    async fn second_failure_clears_history_and_emits_error() {
        let mut h = harness(vec![
            Script::Fail(ProviderError::Network("reset".into())),
            Script::Fail(ProviderError::Network("reset again".into())),
        ])
        .await;
        // Pre-existing context that the failure path must wipe.
        h.db.history()
            .append(HistoryRole::User, "earlier turn", None, None)
            .await
            .unwrap();

        let err = h
            .agent
            .run("Hello", &h.events_tx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("reset"));

        let events = collect(&mut h.events_rx);
        assert!(events.iter().any(|e| matches!(e, AgentEvent::Error { .. })));
        assert!(!events.iter().any(|e| matches!(e, AgentEvent::Done)));

        assert_eq!(h.db.history().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn hung_provider_times_out_and_surfaces() {
        let h = harness(vec![Script::Hang, Script::Hang]).await;
        let agent = h.agent.with_turn_timeout(Duration::from_millis(50));

        let err = agent
            .run("Hello", &h.events_tx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out") || err.to_string().contains("0s"));
        assert_eq!(h.db.history().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupted_history_is_cleared_then_turn_completes() {
        let h = harness(vec![text_turn("Fresh start")]).await;

        // Poison: an assistant tool call with no matching tool result.
        let calls = vec![ToolInvocation {
            id: "toolu_zombie".into(),
            name: "create_task".into(),
            input: json!({"title": "half-written"}),
        }];
        h.db.history()
            .append(HistoryRole::Assistant, "", Some(&calls), None)
            .await
            .unwrap();

        let outcome = h
            .agent
            .run("Hello again", &h.events_tx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);

        // The log now holds exactly the new turn.
        let log = h.db.history().tail(10).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].content, "Hello again");
        assert_eq!(log[1].content, "Fresh start");
    }

    #[tokio::test]
    async fn tool_validation_failure_is_visible_to_the_model_not_fatal() {
        // create_task without its required title: the dispatcher returns a
        // failure envelope and the turn still completes.
        let mut h = harness(vec![
            tool_turn("t1", "create_task", json!({})),
            text_turn("Missing title"),
        ])
        .await;

        let outcome = h
            .agent
            .run("Create something", &h.events_tx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);

        let events = collect(&mut h.events_rx);
        let result = events
            .iter()
            .find_map(|e| match e {
                AgentEvent::ToolResult { result, .. } => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(result["success"], false);
        assert!(h.db.tasks().list(&Default::default()).await.unwrap().is_empty());
    }

    // --- window conversion ---

    fn history_msg(
        id: i64,
        role: HistoryRole,
        content: &str,
        calls: Option<Vec<ToolInvocation>>,
        results: Option<Vec<ToolOutcome>>,
    ) -> HistoryMessage {
        HistoryMessage {
            id,
            role,
            content: content.into(),
            tool_calls: calls,
            tool_results: results,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn window_conversion_accepts_paired_turns() {
        let calls = vec![ToolInvocation {
            id: "t1".into(),
            name: "delete_task".into(),
            input: json!({"task_id": 9}),
        }];
        let results = vec![ToolOutcome {
            tool_use_id: "t1".into(),
            content: "{}".into(),
        }];
        let window = [
            history_msg(1, HistoryRole::User, "delete it", None, None),
            history_msg(2, HistoryRole::Assistant, "", Some(calls), None),
            history_msg(3, HistoryRole::User, "", None, Some(results)),
        ];
        let chat = to_chat_messages(&window).unwrap();
        assert_eq!(chat.len(), 3);
    }

    #[test]
    fn window_conversion_drops_leading_orphan_result() {
        let results = vec![ToolOutcome {
            tool_use_id: "cut_off".into(),
            content: "{}".into(),
        }];
        let window = [
            history_msg(3, HistoryRole::User, "", None, Some(results)),
            history_msg(4, HistoryRole::User, "next question", None, None),
        ];
        let chat = to_chat_messages(&window).unwrap();
        assert_eq!(chat.len(), 1);
        assert_eq!(chat[0].content, "next question");
    }

    #[test]
    fn window_conversion_flags_dangling_tool_call() {
        let calls = vec![ToolInvocation {
            id: "t9".into(),
            name: "create_task".into(),
            input: json!({}),
        }];
        let window = [history_msg(5, HistoryRole::Assistant, "", Some(calls), None)];
        assert!(to_chat_messages(&window).is_err());
    }
}
