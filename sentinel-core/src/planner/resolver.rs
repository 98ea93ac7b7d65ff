//! LLM-backed intent resolver
//!
//! The model's only job is to say WHAT the user wants. It never chooses a
//! tool, never writes arguments, never assigns risk; any response that
//! tries is rejected at this boundary. One constrained call, no prompt
//! retries.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::planner::registry::ALLOWED_BINARIES;
use crate::planner::{Intent, IntentKind};
use crate::providers::{CompletionRequest, LlmProvider, Message};
use crate::{Error, Result};

static FENCED_JSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```(?:json)?\s*(\{[\s\S]*?\})\s*```").expect("valid fenced json regex")
});

/// Resolves free-text requests into typed intents via the LLM collaborator.
pub struct IntentResolver {
    provider: Arc<dyn LlmProvider>,
}

#[derive(Debug, Deserialize)]
struct WireIntent {
    intent_type: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    params: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    rationale: Option<String>,
    // Forbidden keys: a response naming tools or argv is rejected outright
    #[serde(default)]
    tool: Option<serde_json::Value>,
    #[serde(default)]
    arguments: Option<serde_json::Value>,
}

impl IntentResolver {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Resolve user text into an Intent. `target_hint` carries a target the
    /// UI already knows about (selected host, configured scope).
    pub async fn resolve(&self, user_text: &str, target_hint: Option<&str>) -> Result<Intent> {
        let context = match target_hint {
            Some(hint) => format!("[Known target: {hint}]\n{user_text}"),
            None => user_text.to_string(),
        };

        let request = CompletionRequest::new(vec![Message::user(context)])
            .with_system(system_prompt())
            .with_max_tokens(300)
            .with_temperature(0.1);

        let response = self.provider.complete(request).await?;
        parse_intent(&response.content)
    }

    /// Whether the underlying provider is reachable.
    pub async fn check_available(&self) -> bool {
        self.provider.is_available().await
    }
}

fn system_prompt() -> String {
    let vocabulary = IntentKind::all()
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are an intent resolver for a security testing assistant.\n\
         Classify the user's request as exactly one intent kind.\n\n\
         RULES:\n\
         1. NEVER name a tool (nmap, gobuster, ...) or produce arguments.\n\
         2. NEVER assign risk levels or privilege requirements.\n\
         3. Set target only when the user names a concrete IP, CIDR range,\n\
            domain, or URL; otherwise leave it null.\n\
         4. Put extra details (ports, wordlist, count) into params as strings.\n\
         5. Reply with a single JSON object and nothing else.\n\n\
         INTENT KINDS: {vocabulary}\n\n\
         OUTPUT FORMAT:\n\
         {{\"intent_type\": \"...\", \"target\": \"... or null\",\n\
           \"params\": {{}}, \"rationale\": \"one short sentence\"}}\n\n\
         EXAMPLES:\n\
         Input: scan the 192.168.1.0/24 network\n\
         Output: {{\"intent_type\": \"host_discovery\", \"target\": \"192.168.1.0/24\", \"params\": {{}}, \"rationale\": \"User wants live hosts on the range\"}}\n\
         Input: find open ports on 192.168.1.10\n\
         Output: {{\"intent_type\": \"port_scan\", \"target\": \"192.168.1.10\", \"params\": {{}}, \"rationale\": \"User wants a port scan\"}}\n\
         Input: ping 192.168.1.1 four times\n\
         Output: {{\"intent_type\": \"ping\", \"target\": \"192.168.1.1\", \"params\": {{\"count\": \"4\"}}, \"rationale\": \"Reachability check\"}}\n\
         Input: what is a SYN scan?\n\
         Output: {{\"intent_type\": \"info_query\", \"target\": null, \"params\": {{}}, \"rationale\": \"Informational question\"}}"
    )
}

/// Parse and validate the model's reply into a typed Intent.
pub fn parse_intent(raw: &str) -> Result<Intent> {
    let json_str = extract_json(raw).ok_or_else(|| {
        Error::IntentSchemaViolation("response contains no JSON object".to_string())
    })?;

    let wire: WireIntent = serde_json::from_str(&json_str)
        .map_err(|e| Error::IntentSchemaViolation(format!("malformed intent JSON: {e}")))?;

    if wire.tool.is_some() || wire.arguments.is_some() {
        return Err(Error::IntentSchemaViolation(
            "response attempted to choose a tool or arguments".to_string(),
        ));
    }

    let kind = IntentKind::from_str(&wire.intent_type)
        .ok_or_else(|| Error::UnknownIntent(wire.intent_type.clone()))?;

    let mut params = BTreeMap::new();
    for (key, value) in wire.params {
        let value = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => continue,
            other => {
                return Err(Error::IntentSchemaViolation(format!(
                    "param '{key}' is not a scalar: {other}"
                )))
            }
        };
        reject_tool_smuggling(&key, &value)?;
        params.insert(key, value);
    }

    Ok(Intent {
        kind,
        target: wire.target.filter(|t| !t.is_empty() && t != "null"),
        params,
        rationale: wire.rationale.unwrap_or_default(),
    })
}

/// A param naming an allowlisted binary or shaped like a CLI flag is the
/// model trying to plan the command itself.
fn reject_tool_smuggling(key: &str, value: &str) -> Result<()> {
    let lowered = value.to_lowercase();
    if value.starts_with('-') {
        return Err(Error::IntentSchemaViolation(format!(
            "param '{key}' looks like an argv flag: {value}"
        )));
    }
    if ALLOWED_BINARIES
        .iter()
        .any(|binary| lowered.split(|c: char| !c.is_alphanumeric()).any(|t| t == *binary))
    {
        return Err(Error::IntentSchemaViolation(format!(
            "param '{key}' names a tool binary: {value}"
        )));
    }
    Ok(())
}

fn extract_json(text: &str) -> Option<String> {
    if let Some(caps) = FENCED_JSON_RE.captures(text) {
        return Some(caps[1].trim().to_string());
    }

    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
