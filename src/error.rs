//! Error taxonomy for configuration, dispatch, and the NLU boundary

use thiserror::Error;

/// Errors surfaced by the dialog engine.
///
/// Configuration errors are detected when a dialog or registry is built;
/// everything else is fatal for the current turn only. The engine never
/// retries internally and never rolls back context mutations already applied
/// by earlier handler invocations in the same turn.
#[derive(Debug, Error)]
pub enum DialogError {
    /// Invalid dialog or registry configuration, detected at build time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An `action` result named an unregistered action and no default handler
    /// is registered.
    #[error("no handler registered for action `{0}` and no default handler")]
    HandlerNotFound(String),

    /// The NLU service returned a result kind this engine does not understand.
    #[error("result kind `{0}` is not supported")]
    UnsupportedAction(String),

    /// The NLU service reported an `error` result and the error hook did not
    /// recover.
    #[error("NLU service returned an error result")]
    Nlu,

    /// The NLU service could not be reached or the transport failed.
    #[error("NLU transport failure")]
    Transport(#[from] reqwest::Error),

    /// The NLU response body could not be decoded into a result.
    #[error("unable to deserialize the NLU response")]
    Deserialization(#[from] serde_json::Error),

    /// An action handler returned an error.
    #[error("action handler failed")]
    Handler(#[source] anyhow::Error),

    /// The host's reply channel failed while posting a message.
    #[error("host reply channel failed")]
    Host(#[source] anyhow::Error),

    /// The host cancelled the in-flight turn.
    #[error("turn cancelled by host")]
    Cancelled,
}
