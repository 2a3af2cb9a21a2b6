use super::config::PlayerConfig;
use super::focus::build_decision_focus;
use super::focus::with_retry_notes;
use super::memory::PromptMemory;
use moa_core::*;
use moa_engine::DecisionPoint;
use moa_engine::PlayerState;
use moa_engine::Snapshot;
use serde_json::Value;
use serde_json::json;

/// Everything one attempt sends over the wire, plus the raw payload
/// persisted for replayable audits.
#[derive(Clone, Debug)]
pub struct PromptBundle {
    pub system_prompt: String,
    pub user_payload: Value,
    pub user_content: String,
    pub messages: Vec<Value>,
}

/// Serializes to canonical JSON: stable key order (maps are sorted),
/// no whitespace, and ASCII-only output with `\u` escapes.
pub fn canonical_json(value: &Value) -> String {
    let raw = serde_json::to_string(value).expect("serialize canonical payload");
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut buffer = [0u16; 2];
            for unit in c.encode_utf16(&mut buffer) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

/// The compact per-player view of the whole game: the acting player,
/// the three opponents, bank counts, and the rolling memory window.
pub fn build_full_state(
    snapshot: &Snapshot,
    you_player_id: &str,
    memory: &PromptMemory,
) -> anyhow::Result<Value> {
    if snapshot.players.len() != N_PLAYERS {
        anyhow::bail!("exactly {} players are required for LLM prompts", N_PLAYERS);
    }
    if snapshot.active_player_id != you_player_id {
        anyhow::bail!("prompt player_id must match active_player_id");
    }
    let you = snapshot
        .players
        .iter()
        .find(|p| p.player_id == you_player_id)
        .unwrap_or(&snapshot.players[0]);

    let others: Vec<Value> = snapshot
        .players
        .iter()
        .filter(|p| p.player_id != you.player_id)
        .map(|p| player_view(snapshot, p))
        .collect();

    Ok(json!({
        "schema_version": SCHEMA_VERSION,
        "metadata": {
            "run_id": snapshot.run_id,
            "turn_index": snapshot.turn_index,
            "phase": snapshot.phase,
            "active_player_id": snapshot.active_player_id,
            "you_player_id": you.player_id,
        },
        "you": player_view(snapshot, you),
        "others": others,
        "bank": {
            "houses_remaining": snapshot.bank.houses_remaining,
            "hotels_remaining": snapshot.bank.hotels_remaining,
        },
        "memory": memory.snapshot_for_player(&you.player_id),
    }))
}

fn player_view(snapshot: &Snapshot, player: &PlayerState) -> Value {
    let mut owned = Vec::new();
    let mut mortgaged = Vec::new();
    for space in &snapshot.board {
        if space.owner_id.as_deref() != Some(player.player_id.as_str()) {
            continue;
        }
        let space_key = moa_board::space_key(space.index);
        owned.push(json!({
            "space_key": space_key,
            "houses": space.houses,
            "hotel": space.hotel,
            "mortgaged": space.mortgaged,
        }));
        if space.mortgaged {
            mortgaged.push(json!({"space_key": space_key}));
        }
    }
    json!({
        "player_id": player.player_id,
        "name": player.name,
        "cash": player.cash,
        "position": moa_board::space_key(player.position),
        "in_jail": player.in_jail,
        "has_get_out_of_jail_card": player.get_out_of_jail_cards > 0,
        "holdings": {"owned": owned, "mortgaged": mortgaged},
    })
}

/// The decision block: id, type, actor, and legal actions with args
/// schemas augmented to always accept the optional message fields.
pub fn build_compact_decision(decision: &DecisionPoint) -> Value {
    let legal_actions: Vec<Value> = decision
        .legal_actions
        .iter()
        .map(|entry| {
            json!({
                "action": entry.action,
                "args_schema": augment_args_schema(&entry.args_schema),
            })
        })
        .collect();
    json!({
        "schema_version": SCHEMA_VERSION,
        "decision_id": decision.decision_id,
        "decision_type": decision.decision_type,
        "player_id": decision.player_id,
        "legal_actions": legal_actions,
    })
}

/// Adds the always-permitted optional `public_message` and
/// `private_thought` string properties to an args schema.
pub fn augment_args_schema(args_schema: &Value) -> Value {
    let mut schema = args_schema.clone();
    if !schema.is_object() {
        schema = json!({"type": "object", "additionalProperties": false});
    }
    let object = schema.as_object_mut().expect("schema object");
    let properties = object
        .entry("properties")
        .or_insert_with(|| json!({}));
    if let Some(properties) = properties.as_object_mut() {
        properties
            .entry("public_message")
            .or_insert_with(|| json!({"type": "string"}));
        properties
            .entry("private_thought")
            .or_insert_with(|| json!({"type": "string"}));
    }
    schema
}

/// One tool per legal action, in decision order.
pub fn build_tools(compact_decision: &Value) -> Vec<Value> {
    compact_decision["legal_actions"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let action = entry["action"].as_str()?;
                    Some(json!({
                        "type": "function",
                        "function": {
                            "name": action,
                            "description": describe_action(action),
                            "parameters": entry["args_schema"].clone(),
                        },
                    }))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Canonical one-sentence description per action name.
pub fn describe_action(action_name: &str) -> String {
    match action_name {
        "buy_property" => "Buy the property at the current space.".to_string(),
        "start_auction" => {
            "Decline purchase and start an auction for the current space.".to_string()
        }
        "pay_jail_fine" => "Pay the jail fine to leave jail.".to_string(),
        "roll_for_doubles" => "Roll for doubles to attempt to leave jail.".to_string(),
        "use_get_out_of_jail_card" => "Use a Get Out of Jail Free card.".to_string(),
        "bid_auction" => "Place a bid in the current auction.".to_string(),
        "drop_out" => "Drop out of the current auction.".to_string(),
        "propose_trade" => "Propose a trade to another player.".to_string(),
        "accept_trade" => "Accept the current trade offer.".to_string(),
        "reject_trade" => "Reject the current trade offer.".to_string(),
        "counter_trade" => "Counter the current trade offer.".to_string(),
        "mortgage_property" => "Mortgage one of your properties.".to_string(),
        "unmortgage_property" => "Pay off the mortgage on one of your properties.".to_string(),
        "build_houses_or_hotel" => "Build houses or a hotel on a monopoly you own.".to_string(),
        "sell_houses_or_hotel" => "Sell houses or a hotel back to the bank.".to_string(),
        "end_turn" => "End your turn.".to_string(),
        "declare_bankruptcy" => "Declare bankruptcy.".to_string(),
        "NOOP" => "Take no action.".to_string(),
        other => format!("Take the {} action.", other),
    }
}

/// Assembles the full prompt for one attempt. Retry attempts carry the
/// previous validation errors inside the decision focus notes.
pub fn build_prompt_bundle(
    decision: &DecisionPoint,
    player: &PlayerConfig,
    memory: &PromptMemory,
    retry_errors: Option<&[String]>,
) -> anyhow::Result<PromptBundle> {
    let full_state = build_full_state(&decision.state, &decision.player_id, memory)?;
    let compact_decision = build_compact_decision(decision);
    let mut decision_focus = build_decision_focus(decision);
    if let Some(errors) = retry_errors {
        decision_focus = with_retry_notes(decision_focus, errors);
    }
    let mut payload = json!({
        "schema_version": SCHEMA_VERSION,
        "full_state": full_state,
        "decision": compact_decision,
        "decision_focus": decision_focus,
    });
    if let Some(reasoning) = &player.reasoning {
        payload["llm"] = json!({"reasoning": reasoning});
    }
    let user_content = canonical_json(&payload);
    let messages = vec![
        json!({"role": "system", "content": player.system_prompt}),
        json!({"role": "user", "content": user_content}),
    ];
    Ok(PromptBundle {
        system_prompt: player.system_prompt.clone(),
        user_payload: payload,
        user_content,
        messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use moa_engine::Engine;
    use moa_engine::EngineConfig;

    fn four_players() -> Vec<(PlayerId, String)> {
        vec![
            ("p1".into(), "P1".into()),
            ("p2".into(), "P2".into()),
            ("p3".into(), "P3".into()),
            ("p4".into(), "P4".into()),
        ]
    }

    fn buy_decision() -> DecisionPoint {
        let mut engine = Engine::new(
            EngineConfig::new(123, "run-prompt", four_players()).with_timestamps(0, 1),
        );
        engine.state_mut().player_mut("p1").unwrap().position = 10;
        engine.force_rolls(&[(1, 3)]);
        engine.advance_until_decision(1).decision.expect("decision")
    }

    #[test]
    fn canonical_json_is_compact_sorted_ascii() {
        let value = json!({"b": 1, "a": "naïve"});
        let encoded = canonical_json(&value);
        assert_eq!(encoded, "{\"a\":\"na\\u00efve\",\"b\":1}");
    }

    #[test]
    fn full_state_shapes_you_and_others() {
        let decision = buy_decision();
        let memory = PromptMemory::new();
        let state = build_full_state(&decision.state, "p1", &memory).unwrap();
        assert_eq!(state["you"]["player_id"], "p1");
        assert_eq!(state["others"].as_array().unwrap().len(), 3);
        assert_eq!(state["you"]["position"], "VIRGINIA_AVENUE");
        assert_eq!(state["bank"]["houses_remaining"], 32);
        assert!(state["memory"]["public_chat_last_20"].as_array().unwrap().is_empty());
    }

    #[test]
    fn full_state_rejects_wrong_actor() {
        let decision = buy_decision();
        let memory = PromptMemory::new();
        assert!(build_full_state(&decision.state, "p2", &memory).is_err());
    }

    #[test]
    fn augmented_schemas_accept_message_fields() {
        let decision = buy_decision();
        let compact = build_compact_decision(&decision);
        for entry in compact["legal_actions"].as_array().unwrap() {
            let properties = &entry["args_schema"]["properties"];
            assert_eq!(properties["public_message"]["type"], "string");
            assert_eq!(properties["private_thought"]["type"], "string");
        }
    }

    #[test]
    fn tools_mirror_legal_actions() {
        let decision = buy_decision();
        let compact = build_compact_decision(&decision);
        let tools = build_tools(&compact);
        assert_eq!(tools.len(), decision.legal_actions.len());
        assert_eq!(tools[0]["function"]["name"], "buy_property");
        assert_eq!(
            tools[0]["function"]["description"],
            "Buy the property at the current space."
        );
    }

    #[test]
    fn reasoning_block_only_when_configured() {
        let decision = buy_decision();
        let memory = PromptMemory::new();
        let plain = PlayerConfig::new("p1", "P1", "openai/gpt-oss-120b");
        let bundle = build_prompt_bundle(&decision, &plain, &memory, None).unwrap();
        assert!(bundle.user_payload.get("llm").is_none());

        let reasoning = plain.clone().with_reasoning(json!({"effort": "low"}));
        let bundle = build_prompt_bundle(&decision, &reasoning, &memory, None).unwrap();
        assert_eq!(bundle.user_payload["llm"]["reasoning"]["effort"], "low");
    }

    #[test]
    fn retry_bundle_carries_previous_errors() {
        let decision = buy_decision();
        let memory = PromptMemory::new();
        let player = PlayerConfig::new("p1", "P1", "openai/gpt-oss-120b");
        let errors = vec!["Action not in legal_actions".to_string()];
        let bundle = build_prompt_bundle(&decision, &player, &memory, Some(&errors)).unwrap();
        assert!(bundle.user_content.contains("Previous validation errors"));
        assert!(bundle
            .user_content
            .contains("Respond with a valid tool call only"));
    }
}
