//! Standard building-block components: one-turn utterances, followup
//! matching, navigation branches and memory helpers.

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::conversation::{ConversationState, Outputs};
use crate::intent::{self, clean_keywords, Intent, KeywordIntent};

const DEFAULT_LINE: &str = "This is a line";

/// Deserialize a component config, falling back to defaults when absent.
pub fn parse_config<T>(component: &str, config: Option<Value>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match config {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .with_context(|| format!("invalid configuration for component {component}")),
    }
}

// ── Say ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SayConfig {
    #[serde(default)]
    pub line: Option<String>,
    /// When non-empty, one entry is picked at random instead of `line`.
    #[serde(default)]
    pub lines: Vec<String>,
}

impl SayConfig {
    fn pick_line(&self) -> String {
        self.lines
            .choose(&mut rand::thread_rng())
            .or(self.line.as_ref())
            .cloned()
            .unwrap_or_else(|| DEFAULT_LINE.to_string())
    }
}

pub async fn echo(state: Arc<ConversationState>, _config: Option<Value>) -> Result<Outputs> {
    let text = state.user_input().await?;
    state.say(&text).await?;
    Ok(Outputs::new())
}

pub async fn oneturn_say(state: Arc<ConversationState>, config: Option<Value>) -> Result<Outputs> {
    let config: SayConfig = parse_config("oneturn_say", config)?;
    state.say(&config.pick_line()).await?;
    Ok(Outputs::new())
}

// ── Followups ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Followup {
    #[serde(default)]
    pub intent_name: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub followup_response: String,
}

impl Followup {
    fn on_intent(intent: &str, response: &str) -> Self {
        Self {
            intent_name: Some(intent.to_string()),
            keywords: Vec::new(),
            followup_response: response.to_string(),
        }
    }
}

fn default_followups() -> Vec<Followup> {
    vec![
        Followup::on_intent("yes", "good"),
        Followup::on_intent("no", "but why?!"),
        Followup::on_intent("stop", "ok bye!"),
        Followup {
            intent_name: None,
            keywords: vec!["vanilla".into()],
            followup_response: "good choice".into(),
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowupConfig {
    #[serde(default = "default_followups", alias = "oneturn_followups")]
    pub followups: Vec<Followup>,
}

impl Default for FollowupConfig {
    fn default() -> Self {
        Self {
            followups: default_followups(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SayFollowupConfig {
    #[serde(flatten)]
    pub say: SayConfig,
    #[serde(flatten)]
    pub followup: FollowupConfig,
}

/// Control label for `text` if it matches the given built-in intent or any
/// of the keywords. Unknown intent names are an error.
fn match_label(intent_name: Option<&str>, keywords: &[String], text: &str) -> Result<Option<String>> {
    if let Some(name) = intent_name {
        let intent = intent::builtin(name).with_context(|| format!("unknown intent: {name}"))?;
        if intent.matches(text) {
            return Ok(Some(name.to_string()));
        }
    }
    let keywords = clean_keywords(keywords);
    if let Some(first) = keywords.first() {
        if KeywordIntent::keywords(keywords.as_slice())?.matches(text) {
            return Ok(Some(first.clone()));
        }
    }
    Ok(None)
}

async fn run_followups(state: &ConversationState, followups: &[Followup]) -> Result<Outputs> {
    let text = state.user_input().await?;
    for followup in followups {
        if let Some(control) = match_label(followup.intent_name.as_deref(), &followup.keywords, &text)? {
            state.say(&followup.followup_response).await?;
            return Ok(Outputs::control(control));
        }
    }
    state.escalate_out_of_context(&text).await?;
    Ok(Outputs::new())
}

pub async fn oneturn_followup(state: Arc<ConversationState>, config: Option<Value>) -> Result<Outputs> {
    let config: FollowupConfig = parse_config("oneturn_followup", config)?;
    run_followups(&state, &config.followups).await
}

pub async fn say_followup(state: Arc<ConversationState>, config: Option<Value>) -> Result<Outputs> {
    let config: SayFollowupConfig = parse_config("say_followup", config)?;
    state.say(&config.say.pick_line()).await?;
    run_followups(&state, &config.followup.followups).await
}

// ── Navigation ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub branch_id: String,
    #[serde(default)]
    pub intent_name: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Pre-supplied utterance; the next user input is read when absent.
    #[serde(default)]
    pub user_input: Option<String>,
    #[serde(default)]
    pub branches: Vec<Branch>,
}

pub async fn navigation(state: Arc<ConversationState>, config: Option<Value>) -> Result<Outputs> {
    let config: NavigationConfig = parse_config("navigation", config)?;
    let text = match config.user_input.filter(|t| !t.is_empty()) {
        Some(text) => text,
        None => state.user_input().await?,
    };

    for branch in &config.branches {
        let intent_name = match branch.intent_name.as_deref() {
            Some(name) if intent::builtin(name).is_none() => {
                tracing::warn!(branch = %branch.branch_id, intent = %name, "skipping unknown intent");
                None
            }
            other => other,
        };
        if match_label(intent_name, &branch.keywords, &text)?.is_some() {
            return Ok(Outputs::control(branch.branch_id.clone()));
        }
    }

    state.escalate_out_of_context(&text).await?;
    Ok(Outputs::new())
}

// ── Memory helpers ──────────────────────────────────────────────

/// Parameters of a memory helper: the config object minus its `blueprint_id`.
fn config_params(config: Option<Value>) -> serde_json::Map<String, Value> {
    let mut params = match config {
        Some(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    params.remove("blueprint_id");
    params
}

pub async fn save_to_context(state: Arc<ConversationState>, config: Option<Value>) -> Result<Outputs> {
    state.memory_merge(config_params(config));
    Ok(Outputs::new())
}

pub async fn aggregate_context(state: Arc<ConversationState>, config: Option<Value>) -> Result<Outputs> {
    let params = config_params(config);
    state.with_memory(|memory| {
        for (key, value) in params {
            let slot = memory.entry(key).or_insert_with(|| Value::Array(Vec::new()));
            if !slot.is_array() {
                *slot = Value::Array(vec![slot.take()]);
            }
            if let Value::Array(items) = slot {
                items.push(value);
            }
        }
    });
    Ok(Outputs::new())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_target_param")]
    pub target_param: String,
}

fn default_target_param() -> String {
    "agg_inputs".into()
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            target_param: default_target_param(),
        }
    }
}

pub async fn input_aggregator(state: Arc<ConversationState>, config: Option<Value>) -> Result<Outputs> {
    let config: AggregatorConfig = parse_config("input_aggregator", config)?;
    let text = state.user_input().await?;
    state.with_memory(|memory| {
        let slot = memory
            .entry(config.target_param)
            .or_insert_with(|| Value::Array(Vec::new()));
        match slot {
            Value::Array(items) => items.push(Value::String(text)),
            other => *other = Value::Array(vec![other.take(), Value::String(text)]),
        }
    });
    Ok(Outputs::new())
}
