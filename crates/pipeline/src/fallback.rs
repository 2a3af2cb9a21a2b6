use moa_core::*;
use moa_engine::ActionEnvelope;
use moa_engine::ActionName;
use moa_engine::DecisionPoint;
use moa_engine::DecisionType;
use serde_json::json;

/// Synthesizes a deterministic, always-legal action for a decision the
/// model could not resolve. Policy by decision type:
/// buy when affordable else auction; jail card > fine > roll; minimum
/// auction bid if solvent else drop; reject trades; end the turn; and
/// in liquidation mortgage first, then sell, then declare bankruptcy.
pub fn fallback_action(decision: &DecisionPoint) -> ActionEnvelope {
    let id = &decision.decision_id;
    match decision.decision_type {
        DecisionType::AuctionBidDecision => auction_fallback(decision),
        DecisionType::TradeResponseDecision => {
            for name in [
                ActionName::RejectTrade,
                ActionName::AcceptTrade,
            ] {
                if decision.allows(name) {
                    return ActionEnvelope::new(id, name);
                }
            }
            if decision.allows(ActionName::CounterTrade) {
                return ActionEnvelope::new(id, ActionName::CounterTrade)
                    .with_args(json!({"offer": empty_bundle(), "request": empty_bundle()}));
            }
            noop(decision)
        }
        DecisionType::TradeProposeDecision => {
            if decision.allows(ActionName::ProposeTrade) {
                if let Some(target) = first_counterparty(decision) {
                    return ActionEnvelope::new(id, ActionName::ProposeTrade).with_args(json!({
                        "to_player_id": target,
                        "offer": empty_bundle(),
                        "request": empty_bundle(),
                    }));
                }
            }
            noop(decision)
        }
        _ => general_fallback(decision),
    }
}

fn auction_fallback(decision: &DecisionPoint) -> ActionEnvelope {
    let id = &decision.decision_id;
    let min_next_bid = decision
        .auction
        .as_ref()
        .map(|auction| auction.min_next_bid)
        .unwrap_or(1);
    let cash = decision
        .state
        .players
        .iter()
        .find(|p| p.player_id == decision.player_id)
        .map(|p| p.cash)
        .unwrap_or(0);
    if decision.allows(ActionName::BidAuction) && cash >= min_next_bid {
        return ActionEnvelope::new(id, ActionName::BidAuction)
            .with_args(json!({"bid_amount": min_next_bid}));
    }
    if decision.allows(ActionName::DropOut) {
        return ActionEnvelope::new(id, ActionName::DropOut);
    }
    noop(decision)
}

fn general_fallback(decision: &DecisionPoint) -> ActionEnvelope {
    let id = &decision.decision_id;
    for name in [
        ActionName::BuyProperty,
        ActionName::StartAuction,
        ActionName::EndTurn,
    ] {
        if decision.allows(name) {
            return ActionEnvelope::new(id, name);
        }
    }
    // Jail: card beats fine beats rolling.
    for name in [
        ActionName::UseGetOutOfJailCard,
        ActionName::PayJailFine,
        ActionName::RollForDoubles,
    ] {
        if decision.allows(name) {
            return ActionEnvelope::new(id, name);
        }
    }
    // Liquidation: raise cash before giving up.
    if decision.allows(ActionName::MortgageProperty) {
        if let Some(space_key) = first_mortgageable(decision) {
            return ActionEnvelope::new(id, ActionName::MortgageProperty)
                .with_args(json!({"space_key": space_key}));
        }
    }
    if decision.allows(ActionName::SellHousesOrHotel) {
        if let Some(plan) = first_sell_plan(decision) {
            return ActionEnvelope::new(id, ActionName::SellHousesOrHotel)
                .with_args(json!({"sell_plan": [plan]}));
        }
    }
    if decision.allows(ActionName::DeclareBankruptcy) {
        return ActionEnvelope::new(id, ActionName::DeclareBankruptcy);
    }
    if let Some(entry) = decision.legal_actions.first() {
        if entry.action == ActionName::BidAuction {
            return auction_fallback(decision);
        }
        return ActionEnvelope::new(id, entry.action);
    }
    noop(decision)
}

fn noop(decision: &DecisionPoint) -> ActionEnvelope {
    ActionEnvelope::new(&decision.decision_id, ActionName::Noop)
        .with_args(json!({"reason": "fallback"}))
}

fn empty_bundle() -> serde_json::Value {
    json!({"cash": 0, "properties": [], "get_out_of_jail_cards": 0})
}

fn first_counterparty(decision: &DecisionPoint) -> Option<PlayerId> {
    decision
        .state
        .players
        .iter()
        .find(|p| p.player_id != decision.player_id && !p.bankrupt)
        .map(|p| p.player_id.clone())
}

fn first_mortgageable(decision: &DecisionPoint) -> Option<SpaceKey> {
    let indices = decision
        .liquidation
        .as_ref()
        .map(|c| &c.options.mortgageable_space_indices)
        .or_else(|| {
            decision
                .post_turn
                .as_ref()
                .map(|c| &c.options.mortgageable_space_indices)
        })?;
    indices.first().map(|&index| moa_board::space_key(index))
}

fn first_sell_plan(decision: &DecisionPoint) -> Option<serde_json::Value> {
    let indices = decision
        .liquidation
        .as_ref()
        .map(|c| &c.options.sellable_building_space_indices)
        .or_else(|| {
            decision
                .post_turn
                .as_ref()
                .map(|c| &c.options.sellable_building_space_indices)
        })?;
    let index = *indices.first()?;
    let hotel = decision
        .state
        .board
        .get(index)
        .map(|space| space.hotel)
        .unwrap_or(false);
    let kind = if hotel { "HOTEL" } else { "HOUSE" };
    Some(json!({
        "space_key": moa_board::space_key(index),
        "kind": kind,
        "count": 1,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use moa_engine::Engine;
    use moa_engine::EngineConfig;

    fn players(n: usize) -> Vec<(PlayerId, String)> {
        (1..=n)
            .map(|i| (format!("p{}", i), format!("P{}", i)))
            .collect()
    }

    fn buy_decision(cash: Cash) -> DecisionPoint {
        let mut engine = Engine::new(
            EngineConfig::new(123, "run-fallback", players(4)).with_timestamps(0, 1),
        );
        engine.state_mut().player_mut("p1").unwrap().position = 10;
        engine.state_mut().player_mut("p1").unwrap().cash = cash;
        engine.force_rolls(&[(1, 3)]);
        engine.advance_until_decision(1).decision.expect("decision")
    }

    #[test]
    fn buys_when_affordable() {
        let decision = buy_decision(1500);
        assert_eq!(fallback_action(&decision).action, ActionName::BuyProperty);
    }

    #[test]
    fn auctions_when_broke() {
        let decision = buy_decision(100);
        assert_eq!(fallback_action(&decision).action, ActionName::StartAuction);
    }

    #[test]
    fn jail_prefers_card_then_fine() {
        let mut engine = Engine::new(
            EngineConfig::new(7, "run-fallback-jail", players(4)).with_timestamps(0, 1),
        );
        {
            let state = engine.state_mut();
            state.active_player_id = "p1".into();
            let player = state.player_mut("p1").unwrap();
            player.in_jail = true;
            player.position = 10;
            player.get_out_of_jail_cards = 1;
        }
        let decision = engine.advance_until_decision(1).decision.expect("decision");
        assert_eq!(
            fallback_action(&decision).action,
            ActionName::UseGetOutOfJailCard
        );
    }

    #[test]
    fn auction_bids_minimum_or_drops() {
        let mut engine = Engine::new(
            EngineConfig::new(44, "run-fallback-auction", players(2)).with_timestamps(0, 1),
        );
        engine.state_mut().player_mut("p1").unwrap().position = 10;
        engine.force_rolls(&[(1, 3)]);
        let decision = engine.advance_until_decision(1).decision.expect("decision");
        let start = ActionEnvelope::new(&decision.decision_id, ActionName::StartAuction);
        let auction_decision = engine
            .apply_action(&start, None)
            .unwrap()
            .decision
            .expect("auction decision");

        let action = fallback_action(&auction_decision);
        assert_eq!(action.action, ActionName::BidAuction);
        assert_eq!(action.args["bid_amount"], 1);
    }

    #[test]
    fn post_turn_ends_turn() {
        let mut engine = Engine::new(
            EngineConfig::new(123, "run-fallback-post", players(4)).with_timestamps(0, 1),
        );
        engine.state_mut().player_mut("p1").unwrap().position = 10;
        engine.state_mut().board[14].owner_id = Some("p2".into());
        engine.force_rolls(&[(1, 3)]);
        let decision = engine.advance_until_decision(1).decision.expect("decision");
        assert_eq!(decision.decision_type, DecisionType::PostTurnActionDecision);
        assert_eq!(fallback_action(&decision).action, ActionName::EndTurn);
    }

    #[test]
    fn liquidation_mortgages_first_then_declares() {
        let mut engine = Engine::new(
            EngineConfig::new(31, "run-fallback-liq", players(2)).with_timestamps(0, 1),
        );
        {
            let state = engine.state_mut();
            state.player_mut("p1").unwrap().position = 10;
            state.player_mut("p1").unwrap().cash = 5;
            state.board[1].owner_id = Some("p1".into());
            state.board[14].owner_id = Some("p2".into());
        }
        engine.force_rolls(&[(2, 2)]);
        let decision = engine.advance_until_decision(1).decision.expect("decision");
        let action = fallback_action(&decision);
        assert_eq!(action.action, ActionName::MortgageProperty);
        assert_eq!(action.args["space_key"], "MEDITERRANEAN_AVENUE");

        // With nothing left to raise, bankruptcy is the only move.
        let mut engine = Engine::new(
            EngineConfig::new(31, "run-fallback-broke", players(2)).with_timestamps(0, 1),
        );
        {
            let state = engine.state_mut();
            state.player_mut("p1").unwrap().position = 10;
            state.player_mut("p1").unwrap().cash = 5;
            state.board[14].owner_id = Some("p2".into());
        }
        engine.force_rolls(&[(2, 2)]);
        let decision = engine.advance_until_decision(1).decision.expect("decision");
        assert_eq!(
            fallback_action(&decision).action,
            ActionName::DeclareBankruptcy
        );
    }

    #[test]
    fn trade_response_rejects() {
        let mut engine = Engine::new(
            EngineConfig::new(77, "run-fallback-trade", players(2)).with_timestamps(0, 1),
        );
        engine.state_mut().player_mut("p1").unwrap().position = 10;
        engine.state_mut().board[14].owner_id = Some("p1".into());
        engine.force_rolls(&[(1, 3)]);
        let decision = engine.advance_until_decision(1).decision.expect("post turn");
        let propose = ActionEnvelope::new(&decision.decision_id, ActionName::ProposeTrade)
            .with_args(json!({
                "to_player_id": "p2",
                "offer": {"cash": 0, "properties": [], "get_out_of_jail_cards": 0},
                "request": {"cash": 0, "properties": [], "get_out_of_jail_cards": 0},
            }));
        let trade_decision = engine
            .apply_action(&propose, None)
            .unwrap()
            .decision
            .expect("trade decision");
        assert_eq!(
            fallback_action(&trade_decision).action,
            ActionName::RejectTrade
        );
    }
}
