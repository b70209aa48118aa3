//! NLU service boundary: model configuration and the HTTP client
//!
//! The dialog core only depends on the [`NluService`] trait; the shipped
//! implementation talks to the hosted converse API over HTTP. Transport
//! failures and malformed responses surface as turn-level errors and are
//! never retried here - retry policy belongs to the collaborator.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::DialogError;
use crate::model::NluResult;

/// Default hosted endpoint for the NLU converse API.
pub const DEFAULT_ENDPOINT: &str = "https://api.wit.ai/converse?v=20160526";

/// Connection settings for one NLU model.
///
/// A dialog is built from exactly one model; declaring more than one is a
/// configuration error at build time.
#[derive(Debug, Clone)]
pub struct NluModel {
    auth_token: String,
    endpoint: Url,
}

impl NluModel {
    /// Model credentials pointed at the default hosted endpoint.
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            // The constant is a valid URL; parse failure is unreachable.
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid url"),
        }
    }

    /// Point the model at a different endpoint, e.g. a self-hosted instance.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Bearer token sent with every query.
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// Endpoint queries are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Boundary to the NLU collaborator.
#[async_trait]
pub trait NluService: Send + Sync {
    /// Send one utterance with its session id and serialized context, and
    /// return the classified result.
    async fn query(
        &self,
        text: &str,
        session_id: &str,
        context_json: &str,
    ) -> Result<NluResult, DialogError>;
}

/// HTTP implementation of [`NluService`].
///
/// Issues a POST with `session_id` and `q` in the query string and the
/// serialized context as the JSON body. Query parameters are percent-encoded
/// from the UTF-8 bytes of the text; escaping an already-escaped intermediate
/// form would corrupt non-ASCII utterances.
#[derive(Debug, Clone)]
pub struct HttpNluService {
    client: Client,
    model: NluModel,
}

impl HttpNluService {
    /// Client for the given model.
    pub fn new(model: NluModel) -> Self {
        Self {
            client: Client::new(),
            model,
        }
    }

    /// The model this client was built from.
    pub fn model(&self) -> &NluModel {
        &self.model
    }

    /// Request URL for an utterance, exposed so encoding is verifiable
    /// without a network.
    pub fn build_url(&self, text: &str, session_id: &str) -> Url {
        let mut url = self.model.endpoint.clone();
        url.query_pairs_mut().append_pair("session_id", session_id);
        if !text.is_empty() {
            url.query_pairs_mut().append_pair("q", text);
        }
        url
    }
}

#[async_trait]
impl NluService for HttpNluService {
    async fn query(
        &self,
        text: &str,
        session_id: &str,
        context_json: &str,
    ) -> Result<NluResult, DialogError> {
        let url = self.build_url(text, session_id);
        debug!(%url, "querying NLU service");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.model.auth_token)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(context_json.to_string())
            .send()
            .await?;

        let body = response.text().await?;
        let result = serde_json::from_str(&body)?;
        Ok(result)
    }
}
