use moa_core::*;
use moa_engine::Action;
use moa_engine::ActionEnvelope;
use moa_engine::ActionName;
use moa_engine::DecisionPoint;
use serde_json::Value;
use serde_json::json;

/// The model's structured selection: a tool name and its raw arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedToolCall {
    pub name: String,
    pub arguments: Value,
}

impl ParsedToolCall {
    pub fn to_value(&self) -> Value {
        json!({"name": self.name, "arguments": self.arguments})
    }
}

/// Extracts the first tool call from a chat-completion response,
/// falling back to the legacy `function_call` field.
pub fn parse_tool_call(response_json: &Value) -> Result<ParsedToolCall, String> {
    let choices = response_json["choices"]
        .as_array()
        .filter(|choices| !choices.is_empty())
        .ok_or_else(|| "No choices in response".to_string())?;
    let message = &choices[0]["message"];
    let function = message["tool_calls"]
        .as_array()
        .and_then(|calls| calls.first())
        .map(|call| &call["function"])
        .or_else(|| message.get("function_call"))
        .ok_or_else(|| "No tool call found".to_string())?;
    let name = function["name"]
        .as_str()
        .ok_or_else(|| "Tool call missing name".to_string())?
        .to_string();
    Ok(ParsedToolCall {
        name,
        arguments: function["arguments"].clone(),
    })
}

/// Maps a parsed tool call onto an action envelope for the decision.
/// Arguments may be a JSON string, an object, or absent; the optional
/// message fields are lifted out of the args.
pub fn tool_call_to_action(
    decision: &DecisionPoint,
    tool_call: &ParsedToolCall,
) -> Option<ActionEnvelope> {
    let action = resolve_action_name(&tool_call.name)?;
    let args_payload = match &tool_call.arguments {
        Value::String(raw) if raw.trim().is_empty() => json!({}),
        Value::String(raw) => serde_json::from_str::<Value>(raw).ok()?,
        Value::Object(map) => Value::Object(map.clone()),
        Value::Null => json!({}),
        _ => return None,
    };
    let mut args = args_payload.as_object().cloned()?;
    let public_message = args
        .remove("public_message")
        .and_then(|v| v.as_str().map(str::to_string));
    let private_thought = args
        .remove("private_thought")
        .and_then(|v| v.as_str().map(str::to_string));
    let mut envelope =
        ActionEnvelope::new(&decision.decision_id, action).with_args(Value::Object(args));
    envelope.public_message = public_message;
    envelope.private_thought = private_thought;
    Some(envelope)
}

/// Maps a tool name to a known action name. Legality against the
/// decision is a separate, later check so that a known-but-illegal
/// action reports `invalid_action` rather than `invalid_tool_call`.
fn resolve_action_name(tool_name: &str) -> Option<ActionName> {
    let candidates = [tool_name.to_string(), tool_name.trim().to_lowercase()];
    for candidate in candidates {
        if let Ok(name) = serde_json::from_value::<ActionName>(json!(candidate)) {
            return Some(name);
        }
    }
    None
}

/// Stage one: structural validation of the action payload itself.
pub fn validate_action_payload(envelope: &ActionEnvelope) -> Vec<String> {
    let mut errors = Vec::new();
    if envelope.schema_version != SCHEMA_VERSION {
        errors.push(format!(
            "$.schema_version: expected \"{}\"",
            SCHEMA_VERSION
        ));
    }
    if envelope.decision_id.is_empty() {
        errors.push("$.decision_id: must be a non-empty string".to_string());
    }
    match envelope.args.as_object() {
        None => errors.push("$.args: must be an object".to_string()),
        Some(args) => {
            if let Err(error) = Action::parse(envelope) {
                errors.push(format!("$.args: {}", error));
            } else if argless(envelope.action) && !args.is_empty() {
                errors.push("$.args: additionalProperties are not allowed".to_string());
            }
        }
    }
    errors
}

/// Actions whose args descriptor accepts only `{}`.
fn argless(action: ActionName) -> bool {
    matches!(
        action,
        ActionName::BuyProperty
            | ActionName::StartAuction
            | ActionName::PayJailFine
            | ActionName::RollForDoubles
            | ActionName::UseGetOutOfJailCard
            | ActionName::DropOut
            | ActionName::AcceptTrade
            | ActionName::RejectTrade
            | ActionName::EndTurn
            | ActionName::DeclareBankruptcy
    )
}

/// Both validation stages: payload structure, then decision legality.
pub fn validate_decision_action(decision: &DecisionPoint, envelope: &ActionEnvelope) -> Vec<String> {
    let mut errors = validate_action_payload(envelope);
    if envelope.decision_id != decision.decision_id {
        errors.push("Decision id mismatch".to_string());
    }
    if !decision.allows(envelope.action) {
        errors.push("Action not in legal_actions".to_string());
    }
    errors
}
