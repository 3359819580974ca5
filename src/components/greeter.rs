//! Demo lobby bot: greets, then routes pizza and drink orders to small
//! sub-dialogues. Anything else falls through to a fixed fallback line.

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

use crate::conversation::{ConversationState, Outputs, SayFallback};
use crate::intent::{Intent, KeywordIntent};

const FALLBACK_LINE: &str = "I can only help you order a pizza or a drink";

pub async fn greeter(state: Arc<ConversationState>, _config: Option<Value>) -> Result<Outputs> {
    state.say("Welcome to sample bot").await?;
    let _fallback = state.out_of_context(Arc::new(SayFallback::new(FALLBACK_LINE)));

    let first = state.user_input().await?;
    let greeting = KeywordIntent::keywords(&["hi", "hello", "hey"])?;
    if greeting.matches(&first) {
        state.say("hello back, how can I help").await?;
    } else {
        state.say("How can I help?").await?;
    }

    lobby(&state).await
}

async fn lobby(state: &ConversationState) -> Result<Outputs> {
    loop {
        let text = state.user_input().await?;
        if text.contains("pizza") {
            pizza(state).await?;
        } else if text.contains("drink") {
            drink(state).await?;
        } else {
            state.escalate_out_of_context(&text).await?;
        }
    }
}

async fn pizza(state: &ConversationState) -> Result<()> {
    state.say("what kind of pizza do you want?").await?;
    let choice = state.user_input().await?;
    let reply = if choice.contains("regular") {
        "ok one regular"
    } else if choice.contains("pan") {
        "ok one pan"
    } else {
        "I don't have that"
    };
    state.say(reply).await
}

async fn drink(state: &ConversationState) -> Result<()> {
    state.say("what drink do you want?").await?;
    let choice = state.user_input().await?;
    let reply = if choice.contains("espresso") {
        "ok one espresso"
    } else {
        "I don't have that"
    };
    state.say(reply).await
}
