//! Engine invariants checked across whole driven games, plus the
//! boundary behaviors that are awkward to reach from unit tests.
use moa_core::*;
use moa_engine::*;
use serde_json::json;
use std::collections::HashSet;

fn four_players() -> Vec<(PlayerId, String)> {
    vec![
        ("p1".into(), "P1".into()),
        ("p2".into(), "P2".into()),
        ("p3".into(), "P3".into()),
        ("p4".into(), "P4".into()),
    ]
}

fn engine(seed: u64, max_turns: TurnIndex) -> Engine {
    Engine::new(
        EngineConfig::new(seed, format!("run-inv-{}", seed), four_players())
            .with_max_turns(max_turns)
            .with_timestamps(0, 1),
    )
}

/// A policy that deliberately varies its choices so auctions, jail
/// options, and liquidation paths all get exercised.
fn varied_policy(decision: &DecisionPoint, step: usize) -> ActionEnvelope {
    let id = &decision.decision_id;
    match decision.decision_type {
        DecisionType::BuyOrAuctionDecision => {
            if step % 3 == 0 && decision.allows(ActionName::StartAuction) {
                ActionEnvelope::new(id, ActionName::StartAuction)
            } else if decision.allows(ActionName::BuyProperty) {
                ActionEnvelope::new(id, ActionName::BuyProperty)
            } else {
                ActionEnvelope::new(id, ActionName::StartAuction)
            }
        }
        DecisionType::AuctionBidDecision => {
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
            if step % 2 == 0 && cash >= min_next_bid {
                ActionEnvelope::new(id, ActionName::BidAuction)
                    .with_args(json!({"bid_amount": min_next_bid}))
            } else {
                ActionEnvelope::new(id, ActionName::DropOut)
            }
        }
        DecisionType::JailDecision => {
            for name in [
                ActionName::RollForDoubles,
                ActionName::UseGetOutOfJailCard,
                ActionName::PayJailFine,
            ] {
                if decision.allows(name) {
                    return ActionEnvelope::new(id, name);
                }
            }
            ActionEnvelope::new(id, decision.legal_actions[0].action)
        }
        DecisionType::LiquidationDecision => {
            let context = decision.liquidation.as_ref().expect("liquidation context");
            if let Some(&index) = context.options.mortgageable_space_indices.first() {
                return ActionEnvelope::new(id, ActionName::MortgageProperty)
                    .with_args(json!({"space_key": moa_board::space_key(index)}));
            }
            if let Some(&index) = context.options.sellable_building_space_indices.first() {
                let hotel = decision.state.board[index].hotel;
                let kind = if hotel { "HOTEL" } else { "HOUSE" };
                return ActionEnvelope::new(id, ActionName::SellHousesOrHotel).with_args(json!({
                    "sell_plan": [{"space_key": moa_board::space_key(index), "kind": kind, "count": 1}]
                }));
            }
            ActionEnvelope::new(id, ActionName::DeclareBankruptcy)
        }
        _ => {
            if decision.allows(ActionName::EndTurn) {
                ActionEnvelope::new(id, ActionName::EndTurn)
            } else if decision.allows(ActionName::RejectTrade) {
                ActionEnvelope::new(id, ActionName::RejectTrade)
            } else {
                ActionEnvelope::new(id, decision.legal_actions[0].action)
            }
        }
    }
}

fn assert_invariants(engine: &Engine, events: &[EventRecord]) {
    let state = engine.state();

    // Bank conservation: every house and hotel is either in the bank or
    // on the board.
    let houses_on_board: i64 = state.board.iter().map(|s| s.houses).sum();
    let hotels_on_board: i64 = state.board.iter().filter(|s| s.hotel).count() as i64;
    assert_eq!(state.bank.houses_remaining + houses_on_board, BANK_HOUSES);
    assert_eq!(state.bank.hotels_remaining + hotels_on_board, BANK_HOTELS);

    // Ownership partition: bankrupt players own nothing; bankrupt
    // players hold no cash and are never active.
    for player in &state.players {
        if player.bankrupt {
            assert_eq!(player.cash, 0, "{} bankrupt with cash", player.player_id);
            assert!(
                state
                    .board
                    .iter()
                    .all(|s| s.owner_id.as_deref() != Some(player.player_id.as_str())),
                "{} bankrupt but owns property",
                player.player_id
            );
        }
    }

    // Structural space invariants.
    for space in &state.board {
        assert!(space.houses >= 0 && space.houses <= HOUSE_LIMIT);
        if space.hotel {
            assert_eq!(space.houses, 0);
        }
        if space.has_buildings() {
            assert!(!space.mortgaged);
            assert_eq!(space.kind, moa_board::SpaceKind::Property);
        }
    }

    // Even building within groups (hotel counts as five).
    for group in moa_board::buildable_groups() {
        let values: Vec<i64> = moa_board::group_indices(group)
            .iter()
            .map(|&i| state.board[i].building_value())
            .collect();
        let max = values.iter().copied().max().unwrap_or(0);
        let min = values.iter().copied().min().unwrap_or(0);
        assert!(max - min <= 1, "uneven group {:?}", group);
    }

    // Cash conservation: per-player cash equals the event-log total.
    let mut deltas: std::collections::HashMap<&str, Cash> = Default::default();
    for event in events {
        if let EventBody::CashChanged {
            player_id, delta, ..
        } = &event.body
        {
            *deltas.entry(player_id.as_str()).or_default() += delta;
        }
    }
    for player in &state.players {
        assert_eq!(
            player.cash,
            STARTING_CASH + deltas.get(player.player_id.as_str()).copied().unwrap_or(0),
            "cash drift for {}",
            player.player_id
        );
    }
}

#[test]
fn invariants_hold_across_full_games() {
    for seed in [3, 17, 99, 123, 2024] {
        let mut engine = engine(seed, 60);
        let mut events: Vec<EventRecord> = Vec::new();
        let mut decision_ids: HashSet<String> = HashSet::new();
        let mut step = 0;

        while !engine.is_game_over() {
            let result = engine.advance_until_decision(1);
            let stalled = result.events.is_empty() && result.decision.is_none();
            events.extend(result.events);
            match result.decision {
                Some(decision) => {
                    // Decision ids are unique across the run.
                    assert!(decision_ids.insert(decision.decision_id.clone()));
                    let action = varied_policy(&decision, step);
                    step += 1;
                    // Legality closure: we only apply listed actions.
                    assert!(decision.allows(action.action));
                    let result = engine.apply_action(&action, None).expect("legal action");
                    events.extend(result.events);
                    assert_invariants(&engine, &events);
                }
                None if stalled => break,
                None => {}
            }
            assert_invariants(&engine, &events);
        }

        // Dense seq, monotonic synthetic timestamps.
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.seq, i as Seq, "seed {}", seed);
            assert_eq!(event.event_id, format!("run-inv-{}-evt-{:06}", seed, i));
            if i > 0 {
                assert!(event.ts_ms >= events[i - 1].ts_ms);
            }
        }
        assert!(events
            .iter()
            .any(|e| matches!(e.body, EventBody::GameEnded { .. })));
    }
}

#[test]
fn games_are_deterministic_per_seed() {
    let run = |seed: u64| -> Vec<String> {
        let mut engine = engine(seed, 25);
        let mut log = Vec::new();
        let mut step = 0;
        while !engine.is_game_over() {
            let result = engine.advance_until_decision(1);
            let stalled = result.events.is_empty() && result.decision.is_none();
            for event in &result.events {
                log.push(serde_json::to_string(event).unwrap());
            }
            match result.decision {
                Some(decision) => {
                    let action = varied_policy(&decision, step);
                    step += 1;
                    for event in engine.apply_action(&action, None).unwrap().events {
                        log.push(serde_json::to_string(&event).unwrap());
                    }
                }
                None if stalled => break,
                None => {}
            }
        }
        log
    };
    assert_eq!(run(41), run(41));
    assert_ne!(run(41), run(42));
}

#[test]
fn three_consecutive_doubles_jail_the_roller() {
    let mut engine = engine(7, 10);
    engine.force_rolls(&[(2, 2), (3, 3), (1, 1)]);

    let mut events: Vec<EventRecord> = Vec::new();
    // Doubles grant extra turns, so p1 rolls all three.
    while !engine.state().player("p1").unwrap().in_jail {
        let result = engine.advance_until_decision(1);
        events.extend(result.events);
        if let Some(decision) = result.decision {
            assert_eq!(decision.player_id, "p1");
            let action = varied_policy(&decision, 1);
            events.extend(engine.apply_action(&action, None).unwrap().events);
        }
    }

    let jailed = events
        .iter()
        .position(|e| {
            matches!(&e.body, EventBody::SentToJail { reason, .. } if reason == "THREE_DOUBLES")
        })
        .expect("jailed for three doubles");
    // The third roll is the one right before the jail event; it causes
    // no movement of its own.
    let third_roll = events[..jailed]
        .iter()
        .rposition(|e| matches!(e.body, EventBody::DiceRolled { .. }))
        .expect("third roll");
    assert!(events[third_roll..jailed]
        .iter()
        .all(|e| !matches!(e.body, EventBody::PlayerMoved { .. })));
    assert!(events[jailed..]
        .iter()
        .any(|e| matches!(e.body, EventBody::TurnEnded {})));
}

#[test]
fn go_to_jail_never_pays_go_salary() {
    let mut engine = engine(5, 3);
    engine.state_mut().player_mut("p1").unwrap().position = 23;
    engine.force_rolls(&[(3, 4)]);

    let result = engine.advance_until_decision(1);
    assert!(engine.state().player("p1").unwrap().in_jail);
    assert_eq!(engine.state().player("p1").unwrap().cash, STARTING_CASH);
    assert!(result.events.iter().all(|e| !matches!(
        &e.body,
        EventBody::CashChanged { reason, .. } if reason == "PASS_GO"
    )));
    // Two moves: onto GO_TO_JAIL, then into jail, neither passing GO.
    let moves: Vec<(SpaceIndex, bool)> = result
        .events
        .iter()
        .filter_map(|e| match &e.body {
            EventBody::PlayerMoved { to, passed_go, .. } => Some((*to, *passed_go)),
            _ => None,
        })
        .collect();
    assert_eq!(moves, vec![(30, false), (10, false)]);
}

#[test]
fn forward_movement_past_go_pays_exactly_once() {
    let mut engine = engine(5, 3);
    engine.state_mut().player_mut("p1").unwrap().position = 30;
    engine.force_rolls(&[(4, 6)]);

    let result = engine.advance_until_decision(1);
    let salary: Vec<Cash> = result
        .events
        .iter()
        .filter_map(|e| match &e.body {
            EventBody::CashChanged { delta, reason, .. } if reason == "PASS_GO" => Some(*delta),
            _ => None,
        })
        .collect();
    assert_eq!(salary, vec![200]);
    assert_eq!(engine.state().player("p1").unwrap().position, 0);
}

#[test]
fn trade_thread_survives_full_negotiation() {
    let mut engine = engine(77, 5);
    {
        let state = engine.state_mut();
        state.board[1].owner_id = Some("p1".into());
        state.board[3].owner_id = Some("p2".into());
        state.player_mut("p1").unwrap().position = 10;
        state.player_mut("p1").unwrap().cash = 500;
        state.player_mut("p2").unwrap().cash = 300;
        state.board[14].owner_id = Some("p1".into());
    }
    engine.force_rolls(&[(1, 3)]);
    // p1 lands on their own property, reaching the post-turn decision.
    let decision = engine.advance_until_decision(1).decision.expect("post turn");
    assert_eq!(decision.decision_type, DecisionType::PostTurnActionDecision);

    let propose = ActionEnvelope::new(&decision.decision_id, ActionName::ProposeTrade).with_args(
        json!({
            "to_player_id": "p2",
            "offer": {"cash": 100, "properties": ["MEDITERRANEAN_AVENUE"], "get_out_of_jail_cards": 0},
            "request": {"cash": 0, "properties": ["BALTIC_AVENUE"], "get_out_of_jail_cards": 0},
        }),
    );
    let result = engine.apply_action(&propose, None).unwrap();
    let trade_decision = result.decision.expect("trade response");
    assert_eq!(
        trade_decision.decision_type,
        DecisionType::TradeResponseDecision
    );
    assert_eq!(trade_decision.player_id, "p2");
    assert!(result
        .events
        .iter()
        .any(|e| matches!(e.body, EventBody::TradeProposed { .. })));

    let accept = ActionEnvelope::new(&trade_decision.decision_id, ActionName::AcceptTrade);
    let result = engine.apply_action(&accept, None).unwrap();

    assert_eq!(engine.state().board[1].owner_id.as_deref(), Some("p2"));
    assert_eq!(engine.state().board[3].owner_id.as_deref(), Some("p1"));
    assert_eq!(engine.state().player("p1").unwrap().cash, 400);
    assert_eq!(engine.state().player("p2").unwrap().cash, 400);
    assert!(result
        .events
        .iter()
        .any(|e| matches!(e.body, EventBody::TradeAccepted { .. })));
    assert_eq!(
        result
            .events
            .iter()
            .filter(|e| matches!(e.body, EventBody::PropertyTransferred { .. }))
            .count(),
        2
    );
    // The trade resolved the initiator's turn.
    assert!(result
        .events
        .iter()
        .any(|e| matches!(e.body, EventBody::TurnEnded {})));
    assert!(engine.state().trade.is_none());
}

#[test]
fn trade_counters_alternate_and_expire() {
    let mut engine = engine(78, 5);
    {
        let state = engine.state_mut();
        state.player_mut("p1").unwrap().position = 10;
        state.board[14].owner_id = Some("p1".into());
    }
    engine.force_rolls(&[(1, 3)]);
    let decision = engine.advance_until_decision(1).decision.expect("post turn");
    let empty = json!({"cash": 0, "properties": [], "get_out_of_jail_cards": 0});
    let propose = ActionEnvelope::new(&decision.decision_id, ActionName::ProposeTrade).with_args(
        json!({"to_player_id": "p2", "offer": empty.clone(), "request": empty.clone()}),
    );
    let mut next = engine
        .apply_action(&propose, None)
        .unwrap()
        .decision
        .expect("trade response");

    let mut expected_actor = "p1";
    for round in 0..5 {
        let counter = ActionEnvelope::new(&next.decision_id, ActionName::CounterTrade).with_args(
            json!({"offer": empty.clone(), "request": empty.clone()}),
        );
        let result = engine.apply_action(&counter, None).unwrap();
        if round < 4 {
            assert!(result
                .events
                .iter()
                .any(|e| matches!(e.body, EventBody::TradeCountered { .. })));
            next = result.decision.expect("continuing thread");
            assert_eq!(next.player_id, expected_actor);
            expected_actor = if expected_actor == "p1" { "p2" } else { "p1" };
        } else {
            assert!(result
                .events
                .iter()
                .any(|e| matches!(e.body, EventBody::TradeExpired { .. })));
            assert!(result.decision.is_none());
            assert!(engine.state().trade.is_none());
        }
    }
}

#[test]
fn mortgaged_property_in_trade_charges_interest_and_gates_accept() {
    let mut engine = engine(81, 5);
    {
        let state = engine.state_mut();
        state.player_mut("p1").unwrap().position = 10;
        state.board[14].owner_id = Some("p1".into());
        state.board[1].owner_id = Some("p1".into());
        state.board[1].mortgaged = true;
        state.player_mut("p2").unwrap().cash = 0;
    }
    engine.force_rolls(&[(1, 3)]);
    let decision = engine.advance_until_decision(1).decision.expect("post turn");
    let propose = ActionEnvelope::new(&decision.decision_id, ActionName::ProposeTrade).with_args(
        json!({
            "to_player_id": "p2",
            "offer": {"cash": 0, "properties": ["MEDITERRANEAN_AVENUE"], "get_out_of_jail_cards": 0},
            "request": {"cash": 0, "properties": [], "get_out_of_jail_cards": 0},
        }),
    );
    let trade_decision = engine
        .apply_action(&propose, None)
        .unwrap()
        .decision
        .expect("trade response");
    // p2 cannot cover the 10% interest on the mortgaged property.
    assert!(!trade_decision.allows(ActionName::AcceptTrade));
    assert!(trade_decision.allows(ActionName::RejectTrade));
}

#[test]
fn traded_buildings_are_refused() {
    let mut engine = engine(80, 5);
    {
        let state = engine.state_mut();
        state.player_mut("p1").unwrap().position = 10;
        state.board[14].owner_id = Some("p1".into());
        state.board[1].owner_id = Some("p1".into());
        state.board[3].owner_id = Some("p1".into());
        state.board[1].houses = 1;
        state.board[3].houses = 1;
    }
    engine.force_rolls(&[(1, 3)]);
    let decision = engine.advance_until_decision(1).decision.expect("post turn");
    let propose = ActionEnvelope::new(&decision.decision_id, ActionName::ProposeTrade).with_args(
        json!({
            "to_player_id": "p2",
            "offer": {"cash": 0, "properties": ["MEDITERRANEAN_AVENUE"], "get_out_of_jail_cards": 0},
            "request": {"cash": 0, "properties": [], "get_out_of_jail_cards": 0},
        }),
    );
    assert!(engine.apply_action(&propose, None).is_err());
}

#[test]
fn third_jail_turn_without_options_goes_bankrupt_to_bank() {
    let mut engine = engine(9, 6);
    {
        let state = engine.state_mut();
        state.active_player_id = "p1".into();
        let player = state.player_mut("p1").unwrap();
        player.in_jail = true;
        player.jail_turns = 3;
        player.position = 10;
        player.cash = 10;
    }
    let result = engine.advance_until_decision(1);
    assert!(result.decision.is_none());
    let p1 = engine.state().player("p1").unwrap();
    assert!(p1.bankrupt);
    assert!(p1.bankrupt_to.is_none());
}

#[test]
fn jail_card_remains_usable_on_the_third_turn() {
    let mut engine = engine(9, 6);
    {
        let state = engine.state_mut();
        state.active_player_id = "p1".into();
        let player = state.player_mut("p1").unwrap();
        player.in_jail = true;
        player.jail_turns = 3;
        player.position = 10;
        player.cash = 10;
        player.get_out_of_jail_cards = 1;
    }
    let decision = engine.advance_until_decision(1).decision.expect("jail decision");
    assert!(decision.allows(ActionName::UseGetOutOfJailCard));
    assert!(!decision.allows(ActionName::RollForDoubles));
    assert!(!decision.allows(ActionName::PayJailFine));
}
