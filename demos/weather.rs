//! Weather bot sample
//!
//! Registers a forecast action that reads the `location` entity extracted by
//! the NLU service, stores it in the conversation context, and writes a
//! temperature back for the service to phrase a reply around. Requires a
//! real model token in `NLU_TOKEN`.

use std::sync::Arc;

use async_trait::async_trait;
use nlu_dialog::{
    ActionBinding, ActionHandler, ConversationDialog, DialogHost, InboundMessage, NluModel,
    NluResult, TurnContext,
};
use tokio_util::sync::CancellationToken;

struct GetForecast;

#[async_trait]
impl ActionHandler for GetForecast {
    async fn handle(&self, turn: &TurnContext<'_>, result: &NluResult) -> anyhow::Result<()> {
        let location = result
            .first_entity("location")
            .map(|entity| entity.value.clone())
            .unwrap_or_else(|| "unknown".to_string());
        turn.context.set("location", location.clone());

        // A real application would call a weather API with the location here
        let temperature = 21;
        turn.context.set("forecast", temperature);
        Ok(())
    }
}

struct StdoutHost;

#[async_trait]
impl DialogHost for StdoutHost {
    async fn post_reply(&self, text: &str) -> anyhow::Result<()> {
        println!("bot> {text}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let token = std::env::var("NLU_TOKEN")?;
    let mut dialog = ConversationDialog::builder()
        .model(NluModel::new(token))
        .action(ActionBinding::new(["getMyForecast"], Arc::new(GetForecast)))
        .build()?;

    let message = InboundMessage::new("demo", "What's the weather in Paris?");
    let state = dialog
        .start_turn(&StdoutHost, &message, &CancellationToken::new())
        .await?;

    println!("suspended with session {}", state.session_id);
    Ok(())
}
