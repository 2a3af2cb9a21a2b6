use super::jsonl::read_jsonl;
use super::run_files::RunFiles;
use moa_core::*;
use serde_json::Value;
use serde_json::json;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Derives the final run summary purely from the persisted logs:
/// per-player balances and net worth, decision statistics, token usage,
/// and the property acquisition timeline.
pub fn build_summary(run_files: &RunFiles) -> Value {
    let events = read_jsonl(&run_files.events_path);
    let decisions = read_jsonl(&run_files.decisions_path);
    let actions = read_jsonl(&run_files.actions_path);
    build_summary_from_logs(&run_files.run_id, &events, &decisions, &actions)
}

fn build_summary_from_logs(
    run_id: &str,
    events: &[Value],
    decisions: &[Value],
    actions: &[Value],
) -> Value {
    let player_names = collect_player_names(decisions);
    let player_ids = collect_player_ids(events, decisions, actions, &player_names);

    let mut cash: BTreeMap<String, Cash> = player_ids
        .iter()
        .map(|id| (id.clone(), STARTING_CASH))
        .collect();
    let mut bankrupt: BTreeMap<String, bool> =
        player_ids.iter().map(|id| (id.clone(), false)).collect();
    let mut owned: BTreeMap<String, BTreeSet<SpaceIndex>> = player_ids
        .iter()
        .map(|id| (id.clone(), BTreeSet::new()))
        .collect();
    let mut owner_by_index: BTreeMap<SpaceIndex, Option<String>> = BTreeMap::new();
    let mut mortgaged_by_index: BTreeMap<SpaceIndex, bool> = BTreeMap::new();
    let mut turns_played: BTreeMap<String, u64> =
        player_ids.iter().map(|id| (id.clone(), 0)).collect();
    let mut turn_first_actor: BTreeMap<u64, String> = BTreeMap::new();
    let mut pending_purchases: BTreeMap<String, Vec<(SpaceIndex, u64)>> = BTreeMap::new();
    let mut timeline: Vec<Value> = Vec::new();

    let mut winner_id: Option<String> = None;
    let mut stop_reason: Option<String> = None;
    let mut turn_count: u64 = 0;

    for event in events {
        let event_type = event["type"].as_str().unwrap_or_default();
        let payload = &event["payload"];
        let turn_index = event["turn_index"].as_u64().unwrap_or(0);
        turn_count = turn_count.max(turn_index);

        match event_type {
            "LLM_DECISION_REQUESTED" => {
                if let Some(player_id) = payload["player_id"].as_str() {
                    turn_first_actor.entry(turn_index).or_insert_with(|| {
                        if let Some(count) = turns_played.get_mut(player_id) {
                            *count += 1;
                        }
                        player_id.to_string()
                    });
                }
            }
            "CASH_CHANGED" => {
                let player_id = payload["player_id"].as_str().unwrap_or_default().to_string();
                if let Some(delta) = payload["delta"].as_i64() {
                    *cash.entry(player_id.clone()).or_insert(STARTING_CASH) += delta;
                }
                let reason = payload["reason"].as_str().unwrap_or_default();
                if reason.starts_with("BANKRUPTCY") {
                    bankrupt.insert(player_id.clone(), true);
                }
                if reason == "BANKRUPTCY_ASSETS_TO_BANK" {
                    let released: Vec<SpaceIndex> = owner_by_index
                        .iter()
                        .filter(|(_, owner)| owner.as_deref() == Some(player_id.as_str()))
                        .map(|(index, _)| *index)
                        .collect();
                    for index in released {
                        owner_by_index.insert(index, None);
                        mortgaged_by_index.insert(index, false);
                        if let Some(set) = owned.get_mut(&player_id) {
                            set.remove(&index);
                        }
                    }
                }
                if matches!(reason, "buy_property" | "auction_bid") {
                    if let Some(queue) = pending_purchases.get_mut(&player_id) {
                        if !queue.is_empty() {
                            let (space_index, purchase_turn) = queue.remove(0);
                            let method = if reason == "buy_property" { "BUY" } else { "AUCTION" };
                            timeline.push(json!({
                                "turn_index": purchase_turn,
                                "player_id": player_id,
                                "space_key": moa_board::space_key(space_index),
                                "method": method,
                            }));
                        }
                    }
                }
            }
            "PROPERTY_PURCHASED" => {
                let Some(space_index) = payload["space_index"].as_u64().map(|i| i as SpaceIndex)
                else {
                    continue;
                };
                if let Some(previous) = owner_by_index.get(&space_index).cloned().flatten() {
                    if let Some(set) = owned.get_mut(&previous) {
                        set.remove(&space_index);
                    }
                }
                if let Some(player_id) = payload["player_id"].as_str() {
                    owner_by_index.insert(space_index, Some(player_id.to_string()));
                    owned
                        .entry(player_id.to_string())
                        .or_default()
                        .insert(space_index);
                    if payload["price"].as_i64().unwrap_or(0) > 0 {
                        pending_purchases
                            .entry(player_id.to_string())
                            .or_default()
                            .push((space_index, turn_index));
                    }
                }
            }
            "PROPERTY_TRANSFERRED" => {
                let Some(space_index) = payload["space_index"].as_u64().map(|i| i as SpaceIndex)
                else {
                    continue;
                };
                if let Some(from) = payload["from_player_id"].as_str() {
                    if let Some(set) = owned.get_mut(from) {
                        set.remove(&space_index);
                    }
                }
                if let Some(to) = payload["to_player_id"].as_str() {
                    owner_by_index.insert(space_index, Some(to.to_string()));
                    owned.entry(to.to_string()).or_default().insert(space_index);
                    timeline.push(json!({
                        "turn_index": turn_index,
                        "player_id": to,
                        "space_key": moa_board::space_key(space_index),
                        "method": "TRADE",
                    }));
                }
            }
            "PROPERTY_MORTGAGED" => {
                if let Some(space_index) = payload["space_index"].as_u64() {
                    mortgaged_by_index.insert(space_index as SpaceIndex, true);
                }
            }
            "PROPERTY_UNMORTGAGED" => {
                if let Some(space_index) = payload["space_index"].as_u64() {
                    mortgaged_by_index.insert(space_index as SpaceIndex, false);
                }
            }
            "GAME_ENDED" => {
                winner_id = payload["winner_player_id"].as_str().map(str::to_string);
                stop_reason = payload["reason"].as_str().map(str::to_string);
            }
            _ => {}
        }
    }

    let (decision_stats, token_usage) = build_decision_stats(decisions);

    let mut players_summary = serde_json::Map::new();
    for player_id in &player_ids {
        let balance = cash.get(player_id).copied().unwrap_or(STARTING_CASH);
        let holdings = owned.get(player_id).cloned().unwrap_or_default();
        let mut property_value = 0;
        let mut mortgage_value = 0;
        for index in &holdings {
            let price = moa_board::BOARD
                .get(*index)
                .and_then(|spec| spec.price)
                .unwrap_or(0);
            property_value += price;
            if mortgaged_by_index.get(index).copied().unwrap_or(false) {
                mortgage_value += price / 2;
            }
        }
        players_summary.insert(
            player_id.clone(),
            json!({
                "name": player_names.get(player_id),
                "cash": balance,
                "net_worth_estimate": balance + property_value - mortgage_value,
                "bankrupt": bankrupt.get(player_id).copied().unwrap_or(false),
                "turns_played": turns_played.get(player_id).copied().unwrap_or(0),
            }),
        );
    }

    let mut summary = json!({
        "run_id": run_id,
        "winner_player_id": winner_id,
        "turn_count": turn_count,
        "reason": stop_reason,
        "players": players_summary,
        "decision_stats": decision_stats,
        "property_acquisition_timeline": timeline,
    });
    if let Some(token_usage) = token_usage {
        summary["token_usage"] = token_usage;
    }
    summary
}

fn build_decision_stats(decisions: &[Value]) -> (Value, Option<Value>) {
    let resolved: Vec<&Value> = decisions
        .iter()
        .filter(|entry| entry["phase"] == "decision_resolved")
        .collect();
    let total = resolved.len();
    let fallbacks = resolved
        .iter()
        .filter(|entry| entry["fallback_used"].as_bool().unwrap_or(false))
        .count();

    let mut invalid_attempts = 0;
    let mut latencies: Vec<i64> = Vec::new();
    let mut tokens = BTreeMap::from([
        ("prompt_tokens", 0i64),
        ("completion_tokens", 0i64),
        ("total_tokens", 0i64),
    ]);
    let mut tokens_seen = false;
    let mut cost_total = 0.0;
    let mut cost_seen = false;

    for entry in &resolved {
        if let Some(attempts) = entry["attempts"].as_array() {
            for attempt in attempts {
                let errors = attempt["validation_errors"].as_array();
                if errors.map(|e| !e.is_empty()).unwrap_or(false) {
                    invalid_attempts += 1;
                }
                let raw = &attempt["raw_response"];
                if let Some(usage) = raw["usage"].as_object() {
                    for key in ["prompt_tokens", "completion_tokens", "total_tokens"] {
                        if let Some(value) = usage.get(key).and_then(Value::as_i64) {
                            *tokens.get_mut(key).expect("token key") += value;
                            tokens_seen = true;
                        }
                    }
                    if let Some(cost) = usage.get("cost").and_then(Value::as_f64) {
                        cost_total += cost;
                        cost_seen = true;
                    }
                }
                for key in ["cost", "total_cost"] {
                    if let Some(cost) = raw[key].as_f64() {
                        cost_total += cost;
                        cost_seen = true;
                    }
                }
            }
        }
        if let Some(latency) = entry["latency_ms"].as_i64() {
            latencies.push(latency);
        }
    }

    let avg = (!latencies.is_empty())
        .then(|| latencies.iter().sum::<i64>() / latencies.len() as i64);
    let median = median(&latencies);
    let stats = json!({
        "total_decisions": total,
        "invalid_attempts": invalid_attempts,
        "fallbacks": fallbacks,
        "avg_latency_ms": avg,
        "median_latency_ms": median,
    });

    let token_usage = (tokens_seen || cost_seen).then(|| {
        let mut usage = serde_json::Map::new();
        if tokens_seen {
            for (key, value) in &tokens {
                usage.insert(key.to_string(), json!(value));
            }
        }
        if cost_seen {
            usage.insert(
                "total_cost".to_string(),
                json!((cost_total * 1e6).round() / 1e6),
            );
        }
        Value::Object(usage)
    });
    (stats, token_usage)
}

fn median(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2)
    }
}

fn collect_player_names(decisions: &[Value]) -> BTreeMap<String, String> {
    let mut names = BTreeMap::new();
    for entry in decisions {
        if let (Some(id), Some(name)) = (entry["player_id"].as_str(), entry["player_name"].as_str())
        {
            names.insert(id.to_string(), name.to_string());
        }
    }
    names
}

fn collect_player_ids(
    events: &[Value],
    decisions: &[Value],
    actions: &[Value],
    player_names: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut ids: BTreeSet<String> = player_names.keys().cloned().collect();
    for entry in decisions {
        if let Some(id) = entry["player_id"].as_str() {
            ids.insert(id.to_string());
        }
    }
    for entry in actions {
        if let Some(id) = entry["actor_player_id"].as_str() {
            ids.insert(id.to_string());
        }
    }
    for event in events {
        if let Some(id) = event["actor"]["player_id"].as_str() {
            ids.insert(id.to_string());
        }
        for key in [
            "player_id",
            "from_player_id",
            "to_player_id",
            "winner_player_id",
            "initiator_player_id",
            "counterparty_player_id",
        ] {
            if let Some(id) = event["payload"][key].as_str() {
                ids.insert(id.to_string());
            }
        }
    }
    ids.into_iter().collect()
}
