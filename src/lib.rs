//! NLU conversation dialog adapter
//!
//! This crate drives multi-turn conversations against an external
//! natural-language-understanding (NLU) service. For every inbound user
//! message it repeatedly sends the utterance together with the accumulated
//! conversation context, classifies the structured result, and routes control
//! to action handlers registered by the hosting application. It provides:
//! - A thread-safe, case-insensitive conversation context sent with each query
//! - Explicit registration and resolution of named action handlers
//! - The turn-processing loop that chains `action`/`msg` results until the
//!   service ends the exchange with `stop`
//! - Session lifecycle (stable identifier until a terminal result) with
//!   serializable snapshots the host persists between turns
//!
//! The hosting framework, the HTTP transport, and the NLU service itself are
//! collaborators behind the `host` and `service` boundaries.

pub mod context;
pub mod dialog;
pub mod error;
pub mod handlers;
pub mod host;
pub mod model;
pub mod service;
pub mod session;

// Re-export main types
pub use context::ConversationContext;

pub use dialog::{
    ConversationDialog, DialogBuilder, ErrorDisposition, TurnState,
};

pub use error::DialogError;

pub use handlers::{
    ActionBinding, ActionHandler, HandlerRegistry, TurnContext, DEFAULT_ACTION,
};

pub use host::{DialogHost, InboundMessage};

pub use model::{NluEntity, NluResult, ResultKind};

pub use service::{HttpNluService, NluModel, NluService, DEFAULT_ENDPOINT};

pub use session::{Session, SessionState};
