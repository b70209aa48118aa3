//! Tests for the conversation turn-processing state machine
//!
//! The NLU collaborator is replaced by a scripted service that replays a
//! fixed sequence of results and records every query it receives, and the
//! hosting framework by a host that records posted replies.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use nlu_dialog::{
    ActionBinding, ActionHandler, ConversationDialog, DialogError, DialogHost, ErrorDisposition,
    HandlerRegistry, InboundMessage, NluResult, NluService, SessionState, TurnContext, TurnState,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
struct RecordedQuery {
    text: String,
    session_id: String,
    context_json: String,
}

/// Replays a fixed script of NLU results and records incoming queries.
struct ScriptedNluService {
    script: Mutex<Vec<NluResult>>,
    queries: Mutex<Vec<RecordedQuery>>,
}

impl ScriptedNluService {
    fn new(script: Vec<NluResult>) -> Self {
        let mut script = script;
        script.reverse();
        Self {
            script: Mutex::new(script),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl NluService for ScriptedNluService {
    async fn query(
        &self,
        text: &str,
        session_id: &str,
        context_json: &str,
    ) -> Result<NluResult, DialogError> {
        self.queries.lock().unwrap().push(RecordedQuery {
            text: text.to_string(),
            session_id: session_id.to_string(),
            context_json: context_json.to_string(),
        });

        let next = self.script.lock().unwrap().pop();
        Ok(next.unwrap_or_else(|| panic!("the dialog queried past the end of the script")))
    }
}

/// Records replies posted through the host channel.
#[derive(Default)]
struct RecordingHost {
    replies: Mutex<Vec<String>>,
}

impl RecordingHost {
    fn replies(&self) -> Vec<String> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl DialogHost for RecordingHost {
    async fn post_reply(&self, text: &str) -> anyhow::Result<()> {
        self.replies.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Posts the dispatched action name back through the host.
struct PostActionName;

#[async_trait]
impl ActionHandler for PostActionName {
    async fn handle(&self, turn: &TurnContext<'_>, result: &NluResult) -> anyhow::Result<()> {
        turn.host
            .post_reply(result.action.as_deref().unwrap_or(""))
            .await
    }
}

/// Counts invocations without doing anything else.
#[derive(Default)]
struct CountingHandler {
    invocations: AtomicUsize,
}

#[async_trait]
impl ActionHandler for CountingHandler {
    async fn handle(&self, _turn: &TurnContext<'_>, _result: &NluResult) -> anyhow::Result<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn registry_with(bindings: Vec<ActionBinding>) -> HandlerRegistry {
    HandlerRegistry::from_bindings(bindings).unwrap()
}

fn message() -> InboundMessage {
    InboundMessage::new("conv-1", "execute action one, then say test, then stop")
}

#[tokio::test]
async fn test_action_then_message_then_stop() {
    // Setup: the service scripts an action, a message, and a stop
    let service = ScriptedNluService::new(vec![
        NluResult::action("ActionOne"),
        NluResult::message("test"),
        NluResult::stop(),
    ]);
    let registry = registry_with(vec![
        ActionBinding::new(["ActionOne"], Arc::new(PostActionName)),
        ActionBinding::new(["ActionTwo"], Arc::new(PostActionName)),
    ]);
    let mut dialog = ConversationDialog::with_service(service, registry);
    let host = RecordingHost::default();

    // Execute
    let state = dialog
        .start_turn(&host, &message(), &CancellationToken::new())
        .await
        .unwrap();

    // Verify: handler ran, reply was posted, loop halted after the stop
    assert_eq!(host.replies(), vec!["ActionOne".to_string(), "test".to_string()]);
    let queries = dialog.service().queries();
    assert_eq!(queries.len(), 3);
    // Every iteration re-queries with the original message's text
    for query in &queries {
        assert_eq!(query.text, message().text);
    }
    assert_eq!(dialog.state(), TurnState::Idle);
    assert!(state.context.is_empty());
}

#[tokio::test]
async fn test_unsupported_kind_fails_without_dispatch() {
    let weird = NluResult {
        kind: "weird".to_string(),
        ..NluResult::default()
    };
    let service = ScriptedNluService::new(vec![weird]);
    let counter = Arc::new(CountingHandler::default());
    let registry = registry_with(vec![ActionBinding::default_handler(counter.clone())]);
    let mut dialog = ConversationDialog::with_service(service, registry);
    let host = RecordingHost::default();

    let err = dialog
        .start_turn(&host, &message(), &CancellationToken::new())
        .await
        .err()
        .expect("an unrecognized kind should be fatal");

    match err {
        DialogError::UnsupportedAction(kind) => assert_eq!(kind, "weird"),
        other => panic!("expected UnsupportedAction, got {other:?}"),
    }
    assert_eq!(counter.invocations.load(Ordering::SeqCst), 0);
    assert_eq!(dialog.state(), TurnState::Failed);
}

#[tokio::test]
async fn test_nlu_error_is_fatal_by_default() {
    let service = ScriptedNluService::new(vec![NluResult::error()]);
    let mut dialog = ConversationDialog::with_service(service, HandlerRegistry::new());
    let host = RecordingHost::default();

    let result = dialog
        .start_turn(&host, &message(), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(DialogError::Nlu)));
    assert_eq!(dialog.state(), TurnState::Failed);
}

#[tokio::test]
async fn test_error_hook_can_recover_and_resume_the_loop() {
    let service = ScriptedNluService::new(vec![NluResult::error(), NluResult::stop()]);
    let mut dialog = ConversationDialog::with_service(service, HandlerRegistry::new())
        .with_error_hook(|_| ErrorDisposition::Recover);
    let host = RecordingHost::default();

    dialog
        .start_turn(&host, &message(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(dialog.service().queries().len(), 2);
    assert_eq!(dialog.state(), TurnState::Idle);
}

#[tokio::test]
async fn test_stop_resets_the_session() {
    let service = ScriptedNluService::new(vec![NluResult::stop()]);
    let mut dialog = ConversationDialog::with_service(service, HandlerRegistry::new());
    dialog.context().set("stale", "value");
    let before = dialog.session_id().to_string();
    let host = RecordingHost::default();

    let state = dialog
        .start_turn(&host, &message(), &CancellationToken::new())
        .await
        .unwrap();

    // The persisted snapshot already holds the fresh session
    assert_ne!(state.session_id, before);
    assert!(state.context.is_empty());
    assert_eq!(dialog.session_id(), state.session_id);
    assert!(dialog.context().is_empty());
}

#[tokio::test]
async fn test_handler_context_mutations_reach_the_next_query() {
    struct StoreLocation;

    #[async_trait]
    impl ActionHandler for StoreLocation {
        async fn handle(&self, turn: &TurnContext<'_>, _result: &NluResult) -> anyhow::Result<()> {
            turn.context.set("Location", "paris");
            Ok(())
        }
    }

    let service = ScriptedNluService::new(vec![
        NluResult::action("SetLocation"),
        NluResult::stop(),
    ]);
    let registry = registry_with(vec![ActionBinding::new(["SetLocation"], Arc::new(StoreLocation))]);
    let mut dialog = ConversationDialog::with_service(service, registry);
    let host = RecordingHost::default();

    dialog
        .start_turn(&host, &message(), &CancellationToken::new())
        .await
        .unwrap();

    let queries = dialog.service().queries();
    let first: Value = serde_json::from_str(&queries[0].context_json).unwrap();
    let second: Value = serde_json::from_str(&queries[1].context_json).unwrap();
    assert_eq!(first, json!({}));
    assert_eq!(second, json!({"location": "paris"}));
}

#[tokio::test]
async fn test_resume_turn_restores_persisted_session() {
    let mut context = BTreeMap::new();
    context.insert("forecast".to_string(), json!(21));
    let previous = SessionState {
        session_id: "previous-session".to_string(),
        context,
        started_at: Utc::now(),
    };

    let service = ScriptedNluService::new(vec![NluResult::stop()]);
    let mut dialog = ConversationDialog::with_service(service, HandlerRegistry::new());
    let host = RecordingHost::default();

    let state = dialog
        .resume_turn(previous, &host, &message(), &CancellationToken::new())
        .await
        .unwrap();

    let queries = dialog.service().queries();
    assert_eq!(queries[0].session_id, "previous-session");
    let restored: Value = serde_json::from_str(&queries[0].context_json).unwrap();
    assert_eq!(restored, json!({"forecast": 21}));
    // The stop reset the session before suspension
    assert_ne!(state.session_id, "previous-session");
}

#[tokio::test]
async fn test_cancellation_abandons_the_turn() {
    let service = ScriptedNluService::new(vec![]);
    let mut dialog = ConversationDialog::with_service(service, HandlerRegistry::new());
    let host = RecordingHost::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = dialog.start_turn(&host, &message(), &cancel).await;

    assert!(matches!(result, Err(DialogError::Cancelled)));
    assert!(dialog.service().queries().is_empty());
}

#[tokio::test]
async fn test_unregistered_action_falls_back_to_default() {
    let service = ScriptedNluService::new(vec![
        NluResult::action("neverDeclared"),
        NluResult::stop(),
    ]);
    let counter = Arc::new(CountingHandler::default());
    let registry = registry_with(vec![ActionBinding::default_handler(counter.clone())]);
    let mut dialog = ConversationDialog::with_service(service, registry);
    let host = RecordingHost::default();

    dialog
        .start_turn(&host, &message(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(counter.invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_handler_without_default_is_fatal() {
    let service = ScriptedNluService::new(vec![NluResult::action("nope")]);
    let mut dialog = ConversationDialog::with_service(service, HandlerRegistry::new());
    let host = RecordingHost::default();

    let err = dialog
        .start_turn(&host, &message(), &CancellationToken::new())
        .await
        .err()
        .expect("dispatch without any handler should fail");

    match err {
        DialogError::HandlerNotFound(name) => assert_eq!(name, "nope"),
        other => panic!("expected HandlerNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handler_failure_aborts_without_undoing_replies() {
    struct Failing;

    #[async_trait]
    impl ActionHandler for Failing {
        async fn handle(&self, _turn: &TurnContext<'_>, _result: &NluResult) -> anyhow::Result<()> {
            anyhow::bail!("downstream api unavailable")
        }
    }

    let service = ScriptedNluService::new(vec![
        NluResult::message("working on it"),
        NluResult::action("Fetch"),
    ]);
    let registry = registry_with(vec![ActionBinding::new(["Fetch"], Arc::new(Failing))]);
    let mut dialog = ConversationDialog::with_service(service, registry);
    let host = RecordingHost::default();

    let result = dialog
        .start_turn(&host, &message(), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(DialogError::Handler(_))));
    // Replies posted before the failure stay posted
    assert_eq!(host.replies(), vec!["working on it".to_string()]);
}

#[tokio::test]
async fn test_query_text_derivation_is_overridable() {
    let service = ScriptedNluService::new(vec![NluResult::stop()]);
    let mut dialog = ConversationDialog::with_service(service, HandlerRegistry::new())
        .with_query_text(|message| message.text.to_uppercase());
    let host = RecordingHost::default();

    dialog
        .start_turn(&host, &InboundMessage::new("conv-1", "hello"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(dialog.service().queries()[0].text, "HELLO");
}

#[test]
fn test_builder_requires_exactly_one_model() {
    use nlu_dialog::NluModel;

    let none = ConversationDialog::builder().build();
    assert!(matches!(none, Err(DialogError::Configuration(_))));

    let two = ConversationDialog::builder()
        .model(NluModel::new("token-a"))
        .model(NluModel::new("token-b"))
        .build();
    assert!(matches!(two, Err(DialogError::Configuration(_))));

    let one = ConversationDialog::builder()
        .model(NluModel::new("token"))
        .build();
    assert!(one.is_ok());
}
