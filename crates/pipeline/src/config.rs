use moa_core::PlayerId;
use serde_json::Value;
use serde_json::json;

/// System prompt handed to every model unless a player overrides it.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an expert Monopoly player controlling EXACTLY ONE player in an ongoing 4-player Monopoly game.
Your only objective is to win the game. Win.

You will repeatedly receive the latest situation. Do NOT assume you remember prior turns unless it appears in the provided memory.
The engine is authoritative: it enforces rules, applies forced payments, and rejects illegal actions. You decide only when prompted.

You will receive:

* full_state: the latest compact game state (authoritative)
* decision: the current decision id/type and legal actions (authoritative)
* decision_focus: scenario-specific context for this decision (authoritative)
* memory: recent public chat, recent actions, and your recent private thoughts (authoritative)

Rules:

1. You MUST respond with exactly one tool call that matches one of the legal actions.
2. Never invent tools, actions, or arguments. Obey the args schema.
3. If the chosen tool supports public_message and private_thought fields, include BOTH (short, relevant).
4. Be strategic, consistent, and concise. You may adopt any personality/strategy (aggressive, deceptive, cooperative, etc.) as long as your goal is to win.
";

/// Per-player model configuration for a run.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerConfig {
    pub player_id: PlayerId,
    pub name: String,
    pub model_id: String,
    pub model_display_name: String,
    pub system_prompt: String,
    /// Provider reasoning parameters, forwarded verbatim when present.
    pub reasoning: Option<Value>,
}

impl PlayerConfig {
    pub fn new(
        player_id: impl Into<PlayerId>,
        name: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        let model_id = model_id.into();
        Self {
            player_id: player_id.into(),
            name: name.into(),
            model_display_name: derive_model_display_name(&model_id),
            model_id,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            reasoning: None,
        }
    }
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }
    pub fn with_reasoning(mut self, reasoning: Value) -> Self {
        self.reasoning = Some(reasoning);
        self
    }
    /// Public status view, safe to expose to subscribers.
    pub fn to_status(&self) -> Value {
        json!({
            "player_id": self.player_id,
            "name": self.name,
            "model_id": self.model_id,
            "model_display_name": self.model_display_name,
        })
    }
}

/// The short display form of a provider-scoped model id.
pub fn derive_model_display_name(model_id: &str) -> String {
    model_id
        .rsplit('/')
        .next()
        .unwrap_or(model_id)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_strips_provider() {
        assert_eq!(derive_model_display_name("openai/gpt-oss-120b"), "gpt-oss-120b");
        assert_eq!(derive_model_display_name("plainmodel"), "plainmodel");
    }

    #[test]
    fn config_defaults_to_shared_system_prompt() {
        let config = PlayerConfig::new("p1", "P1", "openai/gpt-oss-120b");
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert!(config.reasoning.is_none());
        assert_eq!(config.to_status()["model_display_name"], "gpt-oss-120b");
    }
}
