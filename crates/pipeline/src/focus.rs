use moa_core::*;
use moa_engine::DecisionPoint;
use moa_engine::DecisionType;
use serde_json::Value;
use serde_json::json;

/// Builds the per-decision-type scenario payload. The focus is the one
/// part of the prompt tailored to the immediate choice; everything it
/// references uses space_keys.
pub fn build_decision_focus(decision: &DecisionPoint) -> Value {
    match decision.decision_type {
        DecisionType::BuyOrAuctionDecision => buy_or_auction_focus(decision),
        DecisionType::JailDecision => jail_focus(decision),
        DecisionType::AuctionBidDecision => auction_bid_focus(decision),
        DecisionType::TradeResponseDecision | DecisionType::TradeProposeDecision => {
            trade_focus(decision)
        }
        DecisionType::PostTurnActionDecision => post_turn_focus(decision),
        DecisionType::LiquidationDecision => liquidation_focus(decision),
    }
}

/// Appends a retry notes block naming the previous validation errors.
pub fn with_retry_notes(mut focus: Value, errors: &[String]) -> Value {
    let target = if focus["scenario"].is_object() {
        &mut focus["scenario"]
    } else {
        &mut focus
    };
    let object = target.as_object_mut().expect("focus object");
    let notes = object.entry("notes").or_insert_with(|| json!([]));
    if let Some(notes) = notes.as_array_mut() {
        notes.push(json!(format!(
            "Previous validation errors: {}",
            errors.join(", ")
        )));
        notes.push(json!("Respond with a valid tool call only. No freeform text."));
    }
    focus
}

fn header(decision: &DecisionPoint) -> Value {
    json!({
        "schema_version": SCHEMA_VERSION,
        "decision_id": decision.decision_id,
        "decision_type": decision.decision_type,
        "actor_player_id": decision.player_id,
    })
}

fn legal_tools(decision: &DecisionPoint) -> Value {
    let tools: Vec<Value> = decision
        .legal_actions
        .iter()
        .map(|entry| {
            json!({
                "tool_name": entry.action,
                "requires": ["public_message", "private_thought"],
            })
        })
        .collect();
    json!(tools)
}

fn buy_or_auction_focus(decision: &DecisionPoint) -> Value {
    let state = &decision.state;
    let position = state
        .players
        .iter()
        .find(|p| p.player_id == decision.player_id)
        .map(|p| p.position)
        .unwrap_or(0);
    let space = &state.board[position];
    let rent: Vec<Cash> = match space.kind {
        moa_board::SpaceKind::Property => moa_board::rent_table(position)
            .map(|table| table.to_vec())
            .unwrap_or_default(),
        moa_board::SpaceKind::Railroad => moa_board::RAILROAD_RENTS.to_vec(),
        moa_board::SpaceKind::Utility => vec![
            moa_board::utility_multiplier(1),
            moa_board::utility_multiplier(2),
        ],
        _ => Vec::new(),
    };
    let house_cost = match (space.kind, space.group) {
        (moa_board::SpaceKind::Property, Some(group)) => moa_board::house_cost(group),
        _ => 0,
    };
    let group_progress = match space.group {
        Some(group) => {
            let indices = moa_board::group_indices(group);
            let owned = indices
                .iter()
                .filter(|&&i| state.board[i].owner_id.as_deref() == Some(&decision.player_id))
                .count();
            json!({"you_own_in_group": owned, "total_in_group": indices.len()})
        }
        None => json!({"you_own_in_group": 0, "total_in_group": 0}),
    };
    let mut focus = header(decision);
    focus["scenario"] = json!({
        "landed_space": moa_board::space_key(position),
        "space_kind": space.kind,
        "group": space.group,
        "price": space.price,
        "house_cost": house_cost,
        "rent": rent,
        "group_progress": group_progress,
    });
    focus["legal_tools"] = legal_tools(decision);
    focus
}

fn jail_focus(decision: &DecisionPoint) -> Value {
    let allows = |name: moa_engine::ActionName| decision.allows(name);
    let mut focus = header(decision);
    focus["scenario"] = json!({
        "jail_fine": JAIL_FINE,
        "options": {
            "can_pay_fine": allows(moa_engine::ActionName::PayJailFine),
            "can_roll_for_doubles": allows(moa_engine::ActionName::RollForDoubles),
            "can_use_jail_card": allows(moa_engine::ActionName::UseGetOutOfJailCard),
        },
        "notes": ["If you roll doubles, you immediately leave jail and move normally."],
    });
    focus["legal_tools"] = legal_tools(decision);
    focus
}

fn auction_bid_focus(decision: &DecisionPoint) -> Value {
    let mut focus = header(decision);
    if let Some(auction) = &decision.auction {
        focus["scenario"] = json!({
            "space_key": auction.space_key,
            "current_high_bid": auction.current_high_bid,
            "min_next_bid": auction.min_next_bid,
            "current_leader_player_id": auction.current_leader_player_id,
        });
    }
    focus["legal_tools"] = legal_tools(decision);
    focus
}

fn trade_focus(decision: &DecisionPoint) -> Value {
    let mut focus = header(decision);
    match &decision.trade {
        Some(trade) => {
            focus["scenario"] = json!({
                "initiator_player_id": trade.initiator_player_id,
                "counterparty_player_id": trade.counterparty_player_id,
                "exchange_index": trade.exchange_index,
                "max_exchanges": trade.max_exchanges,
                "offer": trade.offer,
                "request": trade.request,
            });
        }
        None => {
            // Propose path: name the eligible counterparties instead.
            let counterparties: Vec<&PlayerId> = decision
                .state
                .players
                .iter()
                .filter(|p| p.player_id != decision.player_id && !p.bankrupt)
                .map(|p| &p.player_id)
                .collect();
            focus["scenario"] = json!({"can_trade_with": counterparties});
        }
    }
    focus["legal_tools"] = legal_tools(decision);
    focus
}

fn post_turn_focus(decision: &DecisionPoint) -> Value {
    let mut focus = header(decision);
    if let Some(context) = &decision.post_turn {
        let options = &context.options;
        focus["scenario"] = json!({
            "can_trade_with": options.can_trade_with,
            "mortgageable_space_keys": keys_of(&options.mortgageable_space_indices),
            "unmortgageable_space_keys": keys_of(&options.unmortgageable_space_indices),
            "buildable_space_keys": keys_of(&options.buildable_space_indices),
            "sellable_building_space_keys": keys_of(&options.sellable_building_space_indices),
        });
    }
    focus["legal_tools"] = legal_tools(decision);
    focus
}

fn liquidation_focus(decision: &DecisionPoint) -> Value {
    let mut focus = header(decision);
    if let Some(context) = &decision.liquidation {
        focus["scenario"] = json!({
            "owed_amount": context.owed_amount,
            "owed_to_player_id": context.owed_to_player_id,
            "reason": context.reason,
            "shortfall": context.shortfall,
            "mortgageable_space_keys": keys_of(&context.options.mortgageable_space_indices),
            "sellable_building_space_keys": keys_of(&context.options.sellable_building_space_indices),
        });
    }
    focus["legal_tools"] = legal_tools(decision);
    focus
}

fn keys_of(indices: &[SpaceIndex]) -> Vec<SpaceKey> {
    indices.iter().map(|&i| moa_board::space_key(i)).collect()
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

    #[test]
    fn buy_focus_names_the_landed_space() {
        let mut engine = Engine::new(
            EngineConfig::new(123, "run-focus", four_players()).with_timestamps(0, 1),
        );
        engine.state_mut().player_mut("p1").unwrap().position = 10;
        engine.state_mut().board[11].owner_id = Some("p1".into());
        engine.force_rolls(&[(1, 3)]);
        let decision = engine.advance_until_decision(1).decision.expect("decision");

        let focus = build_decision_focus(&decision);
        assert_eq!(focus["scenario"]["landed_space"], "VIRGINIA_AVENUE");
        assert_eq!(focus["scenario"]["price"], 160);
        assert_eq!(focus["scenario"]["house_cost"], 100);
        assert_eq!(focus["scenario"]["rent"][0], 12);
        assert_eq!(focus["scenario"]["group_progress"]["you_own_in_group"], 1);
        assert_eq!(focus["scenario"]["group_progress"]["total_in_group"], 3);
    }

    #[test]
    fn jail_focus_reports_option_flags() {
        let mut engine = Engine::new(
            EngineConfig::new(7, "run-jail-focus", four_players()).with_timestamps(0, 1),
        );
        {
            let state = engine.state_mut();
            state.active_player_id = "p1".into();
            let player = state.player_mut("p1").unwrap();
            player.in_jail = true;
            player.position = 10;
            player.cash = 20;
        }
        let decision = engine.advance_until_decision(1).decision.expect("decision");
        let focus = build_decision_focus(&decision);
        assert_eq!(focus["scenario"]["jail_fine"], 50);
        assert_eq!(focus["scenario"]["options"]["can_pay_fine"], false);
        assert_eq!(focus["scenario"]["options"]["can_roll_for_doubles"], true);
        assert_eq!(focus["scenario"]["options"]["can_use_jail_card"], false);
    }

    #[test]
    fn retry_notes_append_to_scenario() {
        let focus = json!({"scenario": {"jail_fine": 50, "notes": ["existing"]}});
        let focus = with_retry_notes(focus, &["bad action".to_string()]);
        let notes = focus["scenario"]["notes"].as_array().unwrap();
        assert_eq!(notes.len(), 3);
        assert!(notes[1].as_str().unwrap().contains("bad action"));
    }
}
