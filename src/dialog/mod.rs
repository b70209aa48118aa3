//! Conversation dialog - the turn-processing state machine
//!
//! For each inbound user message the dialog repeatedly queries the NLU
//! service and branches on the result kind: `action` dispatches a registered
//! handler, `msg` posts the reply text, `stop` ends the loop, `error` runs
//! the overridable error hook, and anything else is a fatal unsupported
//! result. The service drives the chain - one user utterance can trigger a
//! run of actions and replies before the loop suspends to await the next
//! message, with no extra round-trips to the end user.
//!
//! Persistence policy: session state is snapshotted only at loop suspension
//! and returned to the host from `start_turn`/`resume_turn`. Each loop
//! iteration re-queries with the query text derived from the original
//! inbound message (the derivation is overridable). A `stop` result resets
//! the session before suspension, so the persisted state already holds the
//! fresh identifier and empty context.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::context::ConversationContext;
use crate::error::DialogError;
use crate::handlers::{ActionBinding, HandlerRegistry, TurnContext};
use crate::host::{DialogHost, InboundMessage};
use crate::model::{NluResult, ResultKind};
use crate::service::{HttpNluService, NluModel, NluService};
use crate::session::{Session, SessionState};

/// Position of the turn loop within one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    /// No turn in progress; awaiting an external message.
    Idle,
    /// Awaiting an NLU response.
    Querying,
    /// Running a resolved action handler.
    Dispatching,
    /// Branching on a received result.
    Deciding,
    /// The current turn ended in a fatal error.
    Failed,
}

/// What the error hook decided about an NLU `error` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDisposition {
    /// Abort the turn with [`DialogError::Nlu`].
    Fail,
    /// Swallow the error and continue the loop.
    Recover,
}

type ErrorHook = Box<dyn Fn(&NluResult) -> ErrorDisposition + Send + Sync>;
type QueryTextFn = Box<dyn Fn(&InboundMessage) -> String + Send + Sync>;

fn default_error_hook(_result: &NluResult) -> ErrorDisposition {
    ErrorDisposition::Fail
}

fn default_query_text(message: &InboundMessage) -> String {
    message.text.clone()
}

/// Builder for a [`ConversationDialog`] backed by the HTTP NLU service.
#[derive(Default)]
pub struct DialogBuilder {
    models: Vec<NluModel>,
    bindings: Vec<ActionBinding>,
    error_hook: Option<ErrorHook>,
    query_text: Option<QueryTextFn>,
}

impl DialogBuilder {
    /// Declare the NLU model credentials. Declaring more than one model is a
    /// configuration error at build time.
    pub fn model(mut self, model: NluModel) -> Self {
        self.models.push(model);
        self
    }

    /// Add a declarative action binding.
    pub fn action(mut self, binding: ActionBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Replace the default NLU-error policy (fail the turn).
    pub fn on_nlu_error(
        mut self,
        hook: impl Fn(&NluResult) -> ErrorDisposition + Send + Sync + 'static,
    ) -> Self {
        self.error_hook = Some(Box::new(hook));
        self
    }

    /// Replace how query text is derived from the inbound message.
    pub fn query_text(
        mut self,
        derive: impl Fn(&InboundMessage) -> String + Send + Sync + 'static,
    ) -> Self {
        self.query_text = Some(Box::new(derive));
        self
    }

    /// Validate the configuration and build the dialog.
    pub fn build(self) -> Result<ConversationDialog<HttpNluService>, DialogError> {
        if self.models.len() > 1 {
            return Err(DialogError::Configuration(
                "a dialog does not support more than one NLU model".to_string(),
            ));
        }
        let model = self.models.into_iter().next().ok_or_else(|| {
            DialogError::Configuration("an NLU model is required".to_string())
        })?;

        let registry = HandlerRegistry::from_bindings(self.bindings)?;
        let mut dialog = ConversationDialog::with_service(HttpNluService::new(model), registry);
        if let Some(hook) = self.error_hook {
            dialog.error_hook = hook;
        }
        if let Some(derive) = self.query_text {
            dialog.query_text = derive;
        }
        Ok(dialog)
    }
}

/// The turn-processing state machine for one conversation.
///
/// Each conversation owns its own dialog instance; independent conversations
/// run their loops concurrently without shared mutable state. Within one
/// conversation, handlers run one at a time.
pub struct ConversationDialog<S: NluService> {
    service: S,
    registry: HandlerRegistry,
    session: Session,
    state: TurnState,
    error_hook: ErrorHook,
    query_text: QueryTextFn,
}

impl ConversationDialog<HttpNluService> {
    /// Start configuring a dialog backed by the HTTP NLU service.
    pub fn builder() -> DialogBuilder {
        DialogBuilder::default()
    }
}

impl<S: NluService> ConversationDialog<S> {
    /// Dialog over a custom service implementation, starting a fresh session.
    pub fn with_service(service: S, registry: HandlerRegistry) -> Self {
        Self {
            service,
            registry,
            session: Session::new(),
            state: TurnState::Idle,
            error_hook: Box::new(default_error_hook),
            query_text: Box::new(default_query_text),
        }
    }

    /// Replace the default NLU-error policy.
    pub fn with_error_hook(
        mut self,
        hook: impl Fn(&NluResult) -> ErrorDisposition + Send + Sync + 'static,
    ) -> Self {
        self.error_hook = Box::new(hook);
        self
    }

    /// Replace how query text is derived from the inbound message.
    pub fn with_query_text(
        mut self,
        derive: impl Fn(&InboundMessage) -> String + Send + Sync + 'static,
    ) -> Self {
        self.query_text = Box::new(derive);
        self
    }

    /// The NLU service this dialog queries.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Identifier of the active session.
    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    /// The conversation context of the active session.
    pub fn context(&self) -> &ConversationContext {
        self.session.context()
    }

    /// Current position of the turn loop.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Process the first turn of a fresh conversation.
    ///
    /// On suspension returns the session snapshot for the host to persist.
    /// A fatal error aborts the loop without rolling back context mutations
    /// already applied by earlier handler invocations in this turn.
    pub async fn start_turn(
        &mut self,
        host: &dyn DialogHost,
        message: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<SessionState, DialogError> {
        self.run_turn(host, message, cancel).await
    }

    /// Restore previously persisted session state, then process a turn.
    pub async fn resume_turn(
        &mut self,
        previous: SessionState,
        host: &dyn DialogHost,
        message: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<SessionState, DialogError> {
        self.session = Session::restore(previous);
        self.run_turn(host, message, cancel).await
    }

    async fn run_turn(
        &mut self,
        host: &dyn DialogHost,
        message: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<SessionState, DialogError> {
        match self.turn_loop(host, message, cancel).await {
            Ok(()) => {
                self.transition(TurnState::Idle);
                Ok(self.session.snapshot())
            }
            Err(err) => {
                self.transition(TurnState::Failed);
                error!(error = %err, conversation = %message.conversation_id, "turn aborted");
                Err(err)
            }
        }
    }

    /// The loop terminates only on `stop`, `error`, or an unrecognized kind.
    async fn turn_loop(
        &mut self,
        host: &dyn DialogHost,
        message: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<(), DialogError> {
        loop {
            if cancel.is_cancelled() {
                return Err(DialogError::Cancelled);
            }

            self.transition(TurnState::Querying);
            let text = (self.query_text)(message);
            let context_json = self.session.context().to_json()?;

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(DialogError::Cancelled),
                result = self.service.query(&text, self.session.id(), &context_json) => result?,
            };

            self.transition(TurnState::Deciding);
            match result.result_kind() {
                ResultKind::Action => {
                    let handler = self.registry.resolve(result.action.as_deref())?;
                    if cancel.is_cancelled() {
                        return Err(DialogError::Cancelled);
                    }
                    self.transition(TurnState::Dispatching);
                    debug!(
                        action = result.action.as_deref().unwrap_or(""),
                        session = self.session.id(),
                        "dispatching action handler"
                    );
                    let turn = TurnContext {
                        context: self.session.context(),
                        host,
                        message,
                        session_id: self.session.id(),
                    };
                    handler
                        .handle(&turn, &result)
                        .await
                        .map_err(DialogError::Handler)?;
                }
                ResultKind::Message => {
                    let reply = result.message.as_deref().unwrap_or_default();
                    host.post_reply(reply).await.map_err(DialogError::Host)?;
                }
                ResultKind::Stop => {
                    debug!(session = self.session.id(), "conversation stopped, resetting session");
                    self.session.reset();
                    return Ok(());
                }
                ResultKind::Error => match (self.error_hook)(&result) {
                    ErrorDisposition::Recover => {
                        warn!(session = self.session.id(), "NLU error result recovered by hook");
                    }
                    ErrorDisposition::Fail => return Err(DialogError::Nlu),
                },
                ResultKind::Unknown(kind) => {
                    return Err(DialogError::UnsupportedAction(kind));
                }
            }
        }
    }

    fn transition(&mut self, next: TurnState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "turn state");
            self.state = next;
        }
    }
}
