use super::action::Action;
use super::action::ActionEnvelope;
use super::action::ActionName;
use super::decision::*;
use super::error::EngineError;
use super::event::Actor;
use super::event::EventBody;
use super::event::EventRecord;
use super::rng::Dice;
use super::state::*;
use moa_board::Card;
use moa_board::DeckType;
use moa_board::SpaceKind;
use moa_board::CHANCE_CARDS;
use moa_board::COMMUNITY_CHEST_CARDS;
use moa_core::*;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

/// Result of one engine operation: the events emitted since the call
/// began, the now-pending decision (if any), and a state snapshot.
#[derive(Clone, Debug)]
pub struct StepResult {
    pub events: Vec<EventRecord>,
    pub decision: Option<DecisionPoint>,
    pub snapshot: Option<Snapshot>,
}

/// Pipeline-reported metadata recorded on `LLM_DECISION_RESPONSE`.
#[derive(Clone, Debug)]
pub struct DecisionMeta {
    pub valid: bool,
    pub error: Option<String>,
}

impl Default for DecisionMeta {
    fn default() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }
}

/// Run configuration for a fresh engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub seed: u64,
    pub run_id: String,
    pub players: Vec<(PlayerId, String)>,
    pub max_turns: TurnIndex,
    pub start_ts_ms: u64,
    pub ts_step_ms: u64,
    pub allow_extra_turns: bool,
}

impl EngineConfig {
    pub fn new(seed: u64, run_id: impl Into<String>, players: Vec<(PlayerId, String)>) -> Self {
        Self {
            seed,
            run_id: run_id.into(),
            players,
            max_turns: DEFAULT_MAX_TURNS,
            start_ts_ms: 0,
            ts_step_ms: DEFAULT_TS_STEP_MS,
            allow_extra_turns: true,
        }
    }
    pub fn with_max_turns(mut self, max_turns: TurnIndex) -> Self {
        self.max_turns = max_turns;
        self
    }
    pub fn with_timestamps(mut self, start_ts_ms: u64, ts_step_ms: u64) -> Self {
        self.start_ts_ms = start_ts_ms;
        self.ts_step_ms = ts_step_ms;
        self
    }
    /// Disables the doubles extra-turn rule (strictly rotating harness runs).
    pub fn without_extra_turns(mut self) -> Self {
        self.allow_extra_turns = false;
        self
    }
}

/// Final run summary derived from engine state.
#[derive(Clone, Debug, Serialize)]
pub struct EngineSummary {
    pub run_id: String,
    pub winner_player_id: PlayerId,
    pub turn_count: TurnIndex,
    pub reason: String,
}

/// Internal bookkeeping for the turn a pending decision interrupted.
#[derive(Clone, Debug)]
pub(crate) struct PendingTurn {
    pub player_id: PlayerId,
    pub decision_type: DecisionType,
    pub space_index: Option<SpaceIndex>,
    pub rolled_double: bool,
}

/// Outcome of resolving a landing: either nothing further, or a decision
/// to surface together with the space it concerns.
pub(crate) type Landing = Option<(DecisionPoint, Option<SpaceIndex>)>;

/// The referee. A pure, single-threaded state machine over the game;
/// never suspends, never retries, and rejects without partial mutation.
pub struct Engine {
    pub(crate) state: GameState,
    pub(crate) dice: Dice,
    pub(crate) max_turns: TurnIndex,
    pub(crate) allow_extra_turns: bool,
    pub(crate) start_ts_ms: u64,
    pub(crate) ts_step_ms: u64,
    pub(crate) seq: Seq,
    pub(crate) started: bool,
    pub(crate) stop_reason: Option<String>,
    pub(crate) decision_seq: u64,
    pub(crate) pending_decision: Option<DecisionPoint>,
    pub(crate) pending_turn: Option<PendingTurn>,
    pub(crate) pending_payment: Option<PendingPayment>,
    pub(crate) applied_decision_ids: HashSet<String>,
    pub(crate) chance_deck: VecDeque<Card>,
    pub(crate) community_deck: VecDeque<Card>,
    pub(crate) jail_card_sources: HashMap<PlayerId, VecDeque<DeckType>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let mut dice = Dice::new(config.seed);
        let chance_deck = dice.shuffle(&CHANCE_CARDS).into_iter().collect();
        let community_deck = dice.shuffle(&COMMUNITY_CHEST_CARDS).into_iter().collect();
        let state = GameState::initial(config.run_id.clone(), config.seed, &config.players);
        Self {
            state,
            dice,
            max_turns: config.max_turns,
            allow_extra_turns: config.allow_extra_turns,
            start_ts_ms: config.start_ts_ms,
            ts_step_ms: config.ts_step_ms,
            seq: 0,
            started: false,
            stop_reason: None,
            decision_seq: 0,
            pending_decision: None,
            pending_turn: None,
            pending_payment: None,
            applied_decision_ids: HashSet::new(),
            chance_deck,
            community_deck,
            jail_card_sources: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.state.run_id
    }
    pub fn state(&self) -> &GameState {
        &self.state
    }
    /// Direct state access for scenario harnesses (forced positions,
    /// seeded ownership). Not part of the run-time protocol.
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }
    /// Queues fixed dice rolls ahead of the seeded stream (harness hook).
    pub fn force_rolls(&mut self, rolls: &[(u8, u8)]) {
        self.dice.force(rolls);
    }
    pub fn pending_decision(&self) -> Option<&DecisionPoint> {
        self.pending_decision.as_ref()
    }
    pub fn is_game_over(&self) -> bool {
        self.state.phase == Phase::GameOver
    }
    pub fn get_snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }
    /// Records a stop reason; the next advance transitions to GAME_OVER.
    pub fn request_stop(&mut self, reason: impl Into<String>) {
        self.stop_reason = Some(reason.into());
    }

    pub fn build_summary(&self) -> EngineSummary {
        EngineSummary {
            run_id: self.state.run_id.clone(),
            winner_player_id: self.determine_winner(),
            turn_count: self.state.turn_index,
            reason: self
                .stop_reason
                .clone()
                .unwrap_or_else(|| "TURN_LIMIT".to_string()),
        }
    }

    /// Runs internal turns until a decision point is produced, the game
    /// ends, or `max_steps` turns elapse with no decision required.
    pub fn advance_until_decision(&mut self, max_steps: usize) -> StepResult {
        let mut events = Vec::new();
        let mut snapshot = None;

        if max_steps == 0 {
            return StepResult {
                events,
                decision: self.pending_decision.clone(),
                snapshot,
            };
        }
        if !self.started {
            let event = self.event_at(Actor::engine(), EventBody::GameStarted {}, 0);
            events.push(event);
            self.started = true;
        }
        if self.pending_decision.is_some() {
            return StepResult {
                events,
                decision: self.pending_decision.clone(),
                snapshot: Some(self.get_snapshot()),
            };
        }
        if self.is_game_over() {
            return StepResult {
                events,
                decision: None,
                snapshot,
            };
        }

        let mut steps = 0;
        while steps < max_steps && !self.is_game_over() {
            if self.should_end_game() {
                self.finish_game(&mut events);
                snapshot = Some(self.get_snapshot());
                break;
            }
            let decision = self.run_turn(&mut events);
            snapshot = Some(self.get_snapshot());
            if decision.is_some() {
                return StepResult {
                    events,
                    decision,
                    snapshot,
                };
            }
            steps += 1;
            if self.should_end_game() {
                self.finish_game(&mut events);
                snapshot = Some(self.get_snapshot());
                break;
            }
        }
        StepResult {
            events,
            decision: None,
            snapshot,
        }
    }

    /// Consumes the pending decision: validates the envelope fully (no
    /// partial mutation on failure), then mutates state, emits events,
    /// and possibly chains straight into the next decision.
    pub fn apply_action(
        &mut self,
        envelope: &ActionEnvelope,
        meta: Option<DecisionMeta>,
    ) -> Result<StepResult, EngineError> {
        if self.applied_decision_ids.contains(&envelope.decision_id) {
            return Err(EngineError::illegal("decision already applied"));
        }
        let decision = self
            .pending_decision
            .as_ref()
            .ok_or_else(|| EngineError::illegal("no pending decision"))?;
        if envelope.schema_version != SCHEMA_VERSION {
            return Err(EngineError::illegal("invalid schema_version"));
        }
        if envelope.decision_id != decision.decision_id {
            return Err(EngineError::illegal("decision id mismatch"));
        }
        if !decision.allows(envelope.action) {
            return Err(EngineError::illegal("action not legal for decision"));
        }
        let action = Action::parse(envelope)?;
        self.validate_semantics(&action)?;

        let decision = self.pending_decision.take().expect("pending decision");
        let pending_turn = self.pending_turn.take().expect("pending turn");
        self.applied_decision_ids.insert(decision.decision_id.clone());
        log::debug!(
            "[engine] applying {} for {} ({})",
            envelope.action,
            decision.player_id,
            decision.decision_id
        );

        let mut events = Vec::new();
        let meta = meta.unwrap_or_default();
        let response = self.event(
            Actor::player(&decision.player_id),
            EventBody::LlmDecisionResponse {
                decision_id: decision.decision_id.clone(),
                player_id: decision.player_id.clone(),
                action_name: envelope.action.as_str().to_string(),
                valid: meta.valid,
                error: meta.error,
            },
        );
        events.push(response);
        if let Some(message) = &envelope.public_message {
            let event = self.event(
                Actor::player(&decision.player_id),
                EventBody::LlmPublicMessage {
                    player_id: decision.player_id.clone(),
                    message: message.clone(),
                    decision_id: decision.decision_id.clone(),
                },
            );
            events.push(event);
        }
        if let Some(thought) = &envelope.private_thought {
            let event = self.event(
                Actor::player(&decision.player_id),
                EventBody::LlmPrivateThought {
                    player_id: decision.player_id.clone(),
                    thought: thought.clone(),
                    decision_id: decision.decision_id.clone(),
                },
            );
            events.push(event);
        }

        let next = self.dispatch(action, &decision, &pending_turn, &mut events);
        if next.is_none() && !self.is_game_over() && self.should_end_game() {
            self.finish_game(&mut events);
        }
        Ok(StepResult {
            events,
            decision: next,
            snapshot: Some(self.get_snapshot()),
        })
    }

    /// Applies a fully validated action for its decision type.
    fn dispatch(
        &mut self,
        action: Action,
        decision: &DecisionPoint,
        pending: &PendingTurn,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        let player_id = decision.player_id.clone();
        match decision.decision_type {
            DecisionType::BuyOrAuctionDecision => {
                let space_index = pending.space_index.expect("buy decision space");
                match action {
                    Action::BuyProperty => {
                        self.apply_purchase(&player_id, space_index, events);
                        self.maybe_start_post_turn(&player_id, pending.rolled_double, events)
                    }
                    Action::StartAuction => {
                        self.start_auction(&player_id, space_index, pending, events)
                    }
                    _ => unreachable!("validated action for buy decision"),
                }
            }
            DecisionType::JailDecision => self.dispatch_jail(action, &player_id, events),
            DecisionType::PostTurnActionDecision => {
                self.dispatch_post_turn(action, &player_id, pending, events)
            }
            DecisionType::LiquidationDecision => {
                self.dispatch_liquidation(action, &player_id, events)
            }
            DecisionType::AuctionBidDecision => self.dispatch_auction(action, &player_id, events),
            DecisionType::TradeResponseDecision => self.dispatch_trade(action, &player_id, events),
            DecisionType::TradeProposeDecision => match action {
                Action::ProposeTrade {
                    to_player_id,
                    offer,
                    request,
                } => self.start_trade(
                    &player_id,
                    &to_player_id,
                    offer,
                    request,
                    pending.rolled_double,
                    events,
                ),
                _ => unreachable!("validated action for trade propose decision"),
            },
        }
    }

    fn dispatch_jail(
        &mut self,
        action: Action,
        player_id: &str,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        match action {
            Action::PayJailFine => {
                self.cash_delta(player_id, -JAIL_FINE, "JAIL_FINE", events);
                self.leave_jail(player_id);
                self.roll_and_move(player_id, events)
            }
            Action::UseGetOutOfJailCard => {
                self.return_jail_card(player_id);
                if let Some(player) = self.state.player_mut(player_id) {
                    player.get_out_of_jail_cards -= 1;
                }
                self.leave_jail(player_id);
                self.roll_and_move(player_id, events)
            }
            Action::RollForDoubles => {
                let (d1, d2) = self.dice.roll();
                let is_double = d1 == d2;
                self.state.phase = Phase::ResolvingMove;
                let event = self.event(
                    Actor::player(player_id),
                    EventBody::DiceRolled {
                        d1,
                        d2,
                        is_double,
                        reason: None,
                    },
                );
                events.push(event);
                if !is_double {
                    let player = self.state.player_mut(player_id).expect("jail player");
                    player.jail_turns += 1;
                    let (jail_turns, cash, cards) =
                        (player.jail_turns, player.cash, player.get_out_of_jail_cards);
                    if jail_turns >= MAX_JAIL_TURNS {
                        if cash < JAIL_FINE && cards == 0 {
                            self.handle_bankruptcy(player_id, None, events);
                            self.leave_jail(player_id);
                            self.end_turn(player_id, false, events);
                            return None;
                        }
                        let decision = self.build_jail_decision(player_id);
                        return Some(self.issue(decision, None, false, events));
                    }
                    self.end_turn(player_id, false, events);
                    return None;
                }
                // Doubles exit jail and move, but never grant an extra turn.
                self.leave_jail(player_id);
                if let Some(player) = self.state.player_mut(player_id) {
                    player.doubles_count = 0;
                }
                let total = (d1 + d2) as usize;
                match self.move_by(player_id, total, false, events) {
                    Some((decision, space_index)) => {
                        Some(self.issue(decision, space_index, false, events))
                    }
                    None => self.maybe_start_post_turn(player_id, false, events),
                }
            }
            _ => unreachable!("validated action for jail decision"),
        }
    }

    fn dispatch_post_turn(
        &mut self,
        action: Action,
        player_id: &str,
        pending: &PendingTurn,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        match action {
            Action::EndTurn => {}
            Action::MortgageProperty { space_key } => {
                self.apply_mortgage(player_id, &space_key, events);
            }
            Action::UnmortgageProperty { space_key } => {
                self.apply_unmortgage(player_id, &space_key, events);
            }
            Action::BuildHousesOrHotel { build_plan } => {
                self.apply_build_plan(player_id, &build_plan, events);
            }
            Action::SellHousesOrHotel { sell_plan } => {
                self.apply_sell_plan(player_id, &sell_plan, events);
            }
            Action::ProposeTrade {
                to_player_id,
                offer,
                request,
            } => {
                return self.start_trade(
                    player_id,
                    &to_player_id,
                    offer,
                    request,
                    pending.rolled_double,
                    events,
                );
            }
            _ => unreachable!("validated action for post-turn decision"),
        }
        let extra = pending.rolled_double && self.player_can_continue(player_id);
        self.end_turn(player_id, extra, events);
        None
    }

    fn dispatch_liquidation(
        &mut self,
        action: Action,
        player_id: &str,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        match action {
            Action::DeclareBankruptcy => {
                let creditor = self
                    .pending_payment
                    .as_ref()
                    .and_then(|p| p.payment.to_player_id.clone());
                self.handle_bankruptcy(player_id, creditor.as_deref(), events);
                self.pending_payment = None;
                self.end_turn(player_id, false, events);
                None
            }
            Action::MortgageProperty { space_key } => {
                self.apply_mortgage(player_id, &space_key, events);
                self.resolve_pending_payment(player_id, events)
            }
            Action::SellHousesOrHotel { sell_plan } => {
                self.apply_sell_plan(player_id, &sell_plan, events);
                self.resolve_pending_payment(player_id, events)
            }
            _ => unreachable!("validated action for liquidation decision"),
        }
    }

    /// One complete turn for the active player, unless the player is
    /// bankrupt (rotation only) or a decision interrupts it.
    fn run_turn(&mut self, events: &mut Vec<EventRecord>) -> Option<DecisionPoint> {
        let current_id = self.state.active_player_id.clone();
        let current = match self.state.player(&current_id) {
            Some(player) => player,
            None => return None,
        };
        if current.bankrupt {
            self.state.active_player_id = self.next_active_player_id(&current_id);
            return None;
        }

        self.state.phase = Phase::StartTurn;
        let event = self.event(Actor::engine(), EventBody::TurnStarted {});
        events.push(event);

        let player = self.state.player(&current_id).expect("active player");
        if player.in_jail {
            let (jail_turns, cash, cards) =
                (player.jail_turns, player.cash, player.get_out_of_jail_cards);
            if jail_turns >= MAX_JAIL_TURNS && cash < JAIL_FINE && cards == 0 {
                self.handle_bankruptcy(&current_id, None, events);
                self.leave_jail(&current_id);
                self.end_turn(&current_id, false, events);
                return None;
            }
            let decision = self.build_jail_decision(&current_id);
            return Some(self.issue(decision, None, false, events));
        }

        let (d1, d2) = self.dice.roll();
        let is_double = d1 == d2;
        let doubles_count = {
            let player = self.state.player_mut(&current_id).expect("active player");
            if is_double {
                player.doubles_count += 1;
            } else {
                player.doubles_count = 0;
            }
            player.doubles_count
        };
        self.state.phase = Phase::ResolvingMove;
        let event = self.event(
            Actor::player(&current_id),
            EventBody::DiceRolled {
                d1,
                d2,
                is_double,
                reason: None,
            },
        );
        events.push(event);

        if is_double && doubles_count >= MAX_DOUBLES_STREAK {
            self.send_to_jail(&current_id, "THREE_DOUBLES", events);
            self.end_turn(&current_id, false, events);
            return None;
        }

        match self.move_by(&current_id, (d1 + d2) as usize, is_double, events) {
            Some((decision, space_index)) => {
                // The landing space interrupts with a decision; remember
                // the doubles flag so the extra turn survives it.
                Some(self.issue(decision, space_index, is_double, events))
            }
            None => self.maybe_start_post_turn(&current_id, is_double, events),
        }
    }

    // ------------------------------------------------------------------
    // Movement and landing
    // ------------------------------------------------------------------

    pub(crate) fn move_by(
        &mut self,
        player_id: &str,
        steps: usize,
        rolled_double: bool,
        events: &mut Vec<EventRecord>,
    ) -> Landing {
        let from = self.state.player(player_id).expect("mover").position;
        let to = (from + steps) % BOARD_SIZE;
        let passed_go = to < from;
        self.state.player_mut(player_id).expect("mover").position = to;
        let event = self.event(
            Actor::player(player_id),
            EventBody::PlayerMoved {
                from,
                to,
                passed_go,
            },
        );
        events.push(event);
        if passed_go {
            self.cash_delta(player_id, GO_SALARY, "PASS_GO", events);
        }
        self.resolve_landing(player_id, to, steps as Cash, rolled_double, events)
    }

    /// Direct placement (card moves). Collects GO salary only when the
    /// card says so, then resolves the landing with dice total zero.
    pub(crate) fn move_to(
        &mut self,
        player_id: &str,
        target: SpaceIndex,
        collect_go: bool,
        rolled_double: bool,
        events: &mut Vec<EventRecord>,
    ) -> Landing {
        let landed = self.move_no_resolve(player_id, target, collect_go, events);
        self.resolve_landing(player_id, landed, 0, rolled_double, events)
    }

    pub(crate) fn move_no_resolve(
        &mut self,
        player_id: &str,
        target: SpaceIndex,
        collect_go: bool,
        events: &mut Vec<EventRecord>,
    ) -> SpaceIndex {
        let from = self.state.player(player_id).expect("mover").position;
        let to = target % BOARD_SIZE;
        let passed_go = collect_go && to < from;
        self.state.player_mut(player_id).expect("mover").position = to;
        let event = self.event(
            Actor::player(player_id),
            EventBody::PlayerMoved {
                from,
                to,
                passed_go,
            },
        );
        events.push(event);
        if passed_go {
            self.cash_delta(player_id, GO_SALARY, "PASS_GO", events);
        }
        to
    }

    pub(crate) fn send_to_jail(
        &mut self,
        player_id: &str,
        reason: &str,
        events: &mut Vec<EventRecord>,
    ) {
        let from = self.state.player(player_id).expect("jailed").position;
        {
            let player = self.state.player_mut(player_id).expect("jailed");
            player.position = moa_board::JAIL_INDEX;
            player.in_jail = true;
            player.jail_turns = 0;
            player.doubles_count = 0;
        }
        if from != moa_board::JAIL_INDEX {
            let event = self.event(
                Actor::player(player_id),
                EventBody::PlayerMoved {
                    from,
                    to: moa_board::JAIL_INDEX,
                    passed_go: false,
                },
            );
            events.push(event);
        }
        let event = self.event(
            Actor::player(player_id),
            EventBody::SentToJail {
                player_id: player_id.to_string(),
                reason: reason.to_string(),
            },
        );
        events.push(event);
    }

    fn leave_jail(&mut self, player_id: &str) {
        if let Some(player) = self.state.player_mut(player_id) {
            player.in_jail = false;
            player.jail_turns = 0;
        }
    }

    /// Roll-and-move after a jail exit purchased with a fine or a card.
    fn roll_and_move(
        &mut self,
        player_id: &str,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        let (d1, d2) = self.dice.roll();
        let is_double = d1 == d2;
        let doubles_count = {
            let player = self.state.player_mut(player_id).expect("mover");
            if is_double {
                player.doubles_count += 1;
            } else {
                player.doubles_count = 0;
            }
            player.doubles_count
        };
        self.state.phase = Phase::ResolvingMove;
        let event = self.event(
            Actor::player(player_id),
            EventBody::DiceRolled {
                d1,
                d2,
                is_double,
                reason: None,
            },
        );
        events.push(event);
        if is_double && doubles_count >= MAX_DOUBLES_STREAK {
            self.send_to_jail(player_id, "THREE_DOUBLES", events);
            self.end_turn(player_id, false, events);
            return None;
        }
        match self.move_by(player_id, (d1 + d2) as usize, is_double, events) {
            Some((decision, space_index)) => {
                Some(self.issue(decision, space_index, is_double, events))
            }
            None => self.maybe_start_post_turn(player_id, is_double, events),
        }
    }

    pub(crate) fn resolve_landing(
        &mut self,
        player_id: &str,
        space_index: SpaceIndex,
        dice_total: Cash,
        rolled_double: bool,
        events: &mut Vec<EventRecord>,
    ) -> Landing {
        let kind = self.state.board[space_index].kind;
        match kind {
            SpaceKind::Chance => self.draw_card(DeckType::Chance, player_id, rolled_double, events),
            SpaceKind::CommunityChest => self.draw_card(DeckType::CommunityChest, player_id, rolled_double, events),
            SpaceKind::Property | SpaceKind::Railroad | SpaceKind::Utility => {
                let (owner_id, mortgaged) = {
                    let space = &self.state.board[space_index];
                    (space.owner_id.clone(), space.mortgaged)
                };
                match owner_id {
                    None => {
                        let decision = self.build_buy_or_auction_decision(player_id, space_index);
                        Some((decision, Some(space_index)))
                    }
                    Some(owner_id) if owner_id == player_id => None,
                    Some(owner_id) => {
                        let owner_bankrupt = self
                            .state
                            .player(&owner_id)
                            .map(|p| p.bankrupt)
                            .unwrap_or(true);
                        if owner_bankrupt || mortgaged {
                            return None;
                        }
                        let rent = self.calculate_rent(space_index, &owner_id, dice_total);
                        if rent <= 0 {
                            return None;
                        }
                        let payment = PaymentEntry {
                            amount: rent,
                            to_player_id: Some(owner_id),
                            reason: "RENT".to_string(),
                            kind: PaymentKind::Rent,
                            space_index: Some(space_index),
                        };
                        self.request_payment(player_id, payment, Vec::new(), rolled_double, events)
                            .map(|decision| (decision, Some(space_index)))
                    }
                }
            }
            SpaceKind::Tax => {
                let Some((amount, reason)) = moa_board::tax_amount(space_index) else {
                    return None;
                };
                let payment = PaymentEntry {
                    amount,
                    to_player_id: None,
                    reason: reason.to_string(),
                    kind: PaymentKind::Tax,
                    space_index: None,
                };
                self.request_payment(player_id, payment, Vec::new(), rolled_double, events)
                    .map(|decision| (decision, Some(space_index)))
            }
            SpaceKind::GoToJail => {
                self.send_to_jail(player_id, "GO_TO_JAIL", events);
                None
            }
            SpaceKind::Go | SpaceKind::Jail | SpaceKind::FreeParking => None,
        }
    }

    /// Rent owed for landing on an owned, unmortgaged space.
    pub(crate) fn calculate_rent(
        &self,
        space_index: SpaceIndex,
        owner_id: &str,
        dice_total: Cash,
    ) -> Cash {
        let space = &self.state.board[space_index];
        match space.kind {
            SpaceKind::Utility => {
                let owned = self.state.count_owned(owner_id, SpaceKind::Utility);
                dice_total * moa_board::utility_multiplier(owned)
            }
            SpaceKind::Railroad => {
                let owned = self.state.count_owned(owner_id, SpaceKind::Railroad);
                if owned == 0 {
                    return 0;
                }
                moa_board::RAILROAD_RENTS[owned.min(4) - 1]
            }
            _ => {
                let Some(table) = moa_board::rent_table(space_index) else {
                    return 0;
                };
                if space.hotel {
                    return table[5];
                }
                if space.houses > 0 {
                    return table[space.houses as usize];
                }
                let base = table[0];
                match space.group {
                    Some(group) if self.state.has_monopoly(owner_id, group) => base * 2,
                    _ => base,
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Decision plumbing
    // ------------------------------------------------------------------

    fn next_decision_id(&mut self) -> String {
        let id = format!("{}-dec-{:06}", self.state.run_id, self.decision_seq);
        self.decision_seq += 1;
        id
    }

    pub(crate) fn decision_header(
        &mut self,
        player_id: &str,
        decision_type: DecisionType,
    ) -> DecisionPoint {
        self.state.phase = Phase::AwaitingDecision;
        DecisionPoint {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: self.state.run_id.clone(),
            decision_id: self.next_decision_id(),
            turn_index: self.state.turn_index,
            player_id: player_id.to_string(),
            decision_type,
            state: self.state.snapshot(),
            post_turn: None,
            liquidation: None,
            auction: None,
            trade: None,
            legal_actions: Vec::new(),
        }
    }

    pub(crate) fn build_buy_or_auction_decision(
        &mut self,
        player_id: &str,
        space_index: SpaceIndex,
    ) -> DecisionPoint {
        let mut decision = self.decision_header(player_id, DecisionType::BuyOrAuctionDecision);
        let price = self.state.board[space_index].price;
        let cash = self.state.player(player_id).map(|p| p.cash).unwrap_or(0);
        if matches!(price, Some(price) if cash >= price) {
            decision.legal_actions.push(
                LegalAction::new(ActionName::BuyProperty).with_highlight(vec![space_index]),
            );
        }
        decision
            .legal_actions
            .push(LegalAction::new(ActionName::StartAuction));
        decision
    }

    pub(crate) fn build_jail_decision(&mut self, player_id: &str) -> DecisionPoint {
        let (jail_turns, cash, cards) = {
            let player = self.state.player(player_id).expect("jail player");
            (player.jail_turns, player.cash, player.get_out_of_jail_cards)
        };
        let mut decision = self.decision_header(player_id, DecisionType::JailDecision);
        if cash >= JAIL_FINE {
            decision
                .legal_actions
                .push(LegalAction::new(ActionName::PayJailFine));
        }
        if jail_turns < MAX_JAIL_TURNS {
            decision
                .legal_actions
                .push(LegalAction::new(ActionName::RollForDoubles));
        }
        if cards > 0 {
            decision
                .legal_actions
                .push(LegalAction::new(ActionName::UseGetOutOfJailCard));
        }
        decision
    }

    pub(crate) fn build_post_turn_decision(&mut self, player_id: &str) -> DecisionPoint {
        let options = self.post_turn_options(player_id);
        let mut decision = self.decision_header(player_id, DecisionType::PostTurnActionDecision);
        decision
            .legal_actions
            .push(LegalAction::new(ActionName::EndTurn));
        if !options.mortgageable_space_indices.is_empty() {
            decision.legal_actions.push(
                LegalAction::new(ActionName::MortgageProperty).with_schema(args_schema_space_key()),
            );
        }
        if !options.unmortgageable_space_indices.is_empty() {
            decision.legal_actions.push(
                LegalAction::new(ActionName::UnmortgageProperty)
                    .with_schema(args_schema_space_key()),
            );
        }
        if !options.buildable_space_indices.is_empty() {
            decision.legal_actions.push(
                LegalAction::new(ActionName::BuildHousesOrHotel)
                    .with_schema(args_schema_plan("build_plan")),
            );
        }
        if !options.sellable_building_space_indices.is_empty() {
            decision.legal_actions.push(
                LegalAction::new(ActionName::SellHousesOrHotel)
                    .with_schema(args_schema_plan("sell_plan")),
            );
        }
        if !options.can_trade_with.is_empty() {
            decision.legal_actions.push(
                LegalAction::new(ActionName::ProposeTrade)
                    .with_schema(args_schema_propose_trade()),
            );
        }
        decision.post_turn = Some(PostTurnContext { options });
        decision
    }

    pub(crate) fn build_liquidation_decision(
        &mut self,
        player_id: &str,
        payment: &PaymentEntry,
    ) -> DecisionPoint {
        let options = self.liquidation_options(player_id);
        let cash = self.state.player(player_id).map(|p| p.cash).unwrap_or(0);
        let mut decision = self.decision_header(player_id, DecisionType::LiquidationDecision);
        if !options.mortgageable_space_indices.is_empty() {
            decision.legal_actions.push(
                LegalAction::new(ActionName::MortgageProperty).with_schema(args_schema_space_key()),
            );
        }
        if !options.sellable_building_space_indices.is_empty() {
            decision.legal_actions.push(
                LegalAction::new(ActionName::SellHousesOrHotel)
                    .with_schema(args_schema_plan("sell_plan")),
            );
        }
        decision
            .legal_actions
            .push(LegalAction::new(ActionName::DeclareBankruptcy));
        decision.liquidation = Some(LiquidationContext {
            owed_amount: payment.amount,
            owed_to_player_id: payment.to_player_id.clone(),
            reason: payment.reason.clone(),
            shortfall: (payment.amount - cash).max(0),
            options,
        });
        decision
    }

    /// Stores a freshly built decision as pending and emits the request
    /// event. All decisions, chained or not, pass through here.
    pub(crate) fn issue(
        &mut self,
        decision: DecisionPoint,
        space_index: Option<SpaceIndex>,
        rolled_double: bool,
        events: &mut Vec<EventRecord>,
    ) -> DecisionPoint {
        let event = self.event(
            Actor::engine(),
            EventBody::LlmDecisionRequested {
                decision_id: decision.decision_id.clone(),
                player_id: decision.player_id.clone(),
                decision_type: decision.decision_type,
            },
        );
        events.push(event);
        self.pending_turn = Some(PendingTurn {
            player_id: decision.player_id.clone(),
            decision_type: decision.decision_type,
            space_index,
            rolled_double,
        });
        self.pending_decision = Some(decision.clone());
        decision
    }

    /// Ends the turn unless the player still owes a post-turn decision.
    pub(crate) fn maybe_start_post_turn(
        &mut self,
        player_id: &str,
        rolled_double: bool,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        let continues = self.player_can_continue(player_id);
        if !continues {
            self.end_turn(player_id, false, events);
            return None;
        }
        let decision = self.build_post_turn_decision(player_id);
        Some(self.issue(decision, None, rolled_double, events))
    }

    fn player_can_continue(&self, player_id: &str) -> bool {
        self.state
            .player(player_id)
            .map(|p| !p.bankrupt && !p.in_jail)
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Turn rotation and game end
    // ------------------------------------------------------------------

    pub(crate) fn end_turn(
        &mut self,
        player_id: &str,
        allow_extra_turn: bool,
        events: &mut Vec<EventRecord>,
    ) {
        self.state.phase = Phase::EndTurn;
        let event = self.event(Actor::engine(), EventBody::TurnEnded {});
        events.push(event);
        self.state.turn_index += 1;
        self.state.active_player_id = if allow_extra_turn && self.allow_extra_turns {
            player_id.to_string()
        } else {
            self.next_active_player_id(player_id)
        };
        self.state.phase = Phase::StartTurn;
    }

    fn next_active_player_id(&self, current_id: &str) -> PlayerId {
        let players = &self.state.players;
        if players.is_empty() {
            return String::new();
        }
        let start = players
            .iter()
            .position(|p| p.player_id == current_id)
            .unwrap_or(0);
        for offset in 1..=players.len() {
            let candidate = &players[(start + offset) % players.len()];
            if !candidate.bankrupt {
                return candidate.player_id.clone();
            }
        }
        current_id.to_string()
    }

    fn should_end_game(&mut self) -> bool {
        if self.stop_reason.is_some() {
            return true;
        }
        if self.state.turn_index >= self.max_turns {
            self.stop_reason = Some("TURN_LIMIT".to_string());
            return true;
        }
        if self.state.active_players().count() <= 1 && !self.state.players.is_empty() {
            self.stop_reason = Some("BANKRUPTCY".to_string());
            return true;
        }
        false
    }

    fn finish_game(&mut self, events: &mut Vec<EventRecord>) {
        if self.state.phase == Phase::GameOver {
            return;
        }
        let winner_id = self.determine_winner();
        self.state.phase = Phase::GameOver;
        self.state.active_player_id = winner_id.clone();
        log::info!("[engine {}] game over: {}", self.state.run_id, winner_id);
        let event = self.event(
            Actor::engine(),
            EventBody::GameEnded {
                winner_player_id: winner_id,
                reason: self
                    .stop_reason
                    .clone()
                    .unwrap_or_else(|| "TURN_LIMIT".to_string()),
            },
        );
        events.push(event);
    }

    fn determine_winner(&self) -> PlayerId {
        let mut pool: Vec<&PlayerState> = self.state.active_players().collect();
        if pool.is_empty() {
            pool = self.state.players.iter().collect();
        }
        // First player with the highest cash wins ties (seat order).
        pool.into_iter()
            .fold(None::<&PlayerState>, |best, player| match best {
                Some(best) if best.cash >= player.cash => Some(best),
                _ => Some(player),
            })
            .map(|p| p.player_id.clone())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Event plumbing
    // ------------------------------------------------------------------

    pub(crate) fn event(&mut self, actor: Actor, body: EventBody) -> EventRecord {
        let turn_index = self.state.turn_index;
        self.event_at(actor, body, turn_index)
    }

    pub(crate) fn event_at(
        &mut self,
        actor: Actor,
        body: EventBody,
        turn_index: TurnIndex,
    ) -> EventRecord {
        let seq = self.seq;
        self.seq += 1;
        EventRecord {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: self.state.run_id.clone(),
            event_id: format!("{}-evt-{:06}", self.state.run_id, seq),
            seq,
            turn_index,
            ts_ms: self.start_ts_ms + seq * self.ts_step_ms,
            actor,
            body,
        }
    }

    pub(crate) fn cash_delta(
        &mut self,
        player_id: &str,
        delta: Cash,
        reason: &str,
        events: &mut Vec<EventRecord>,
    ) {
        if let Some(player) = self.state.player_mut(player_id) {
            player.cash += delta;
        }
        let event = self.event(
            Actor::player(player_id),
            EventBody::CashChanged {
                player_id: player_id.to_string(),
                delta,
                reason: reason.to_string(),
            },
        );
        events.push(event);
    }

    pub(crate) fn apply_purchase(
        &mut self,
        player_id: &str,
        space_index: SpaceIndex,
        events: &mut Vec<EventRecord>,
    ) {
        let price = self.state.board[space_index].price.unwrap_or(0);
        self.state.board[space_index].owner_id = Some(player_id.to_string());
        if let Some(player) = self.state.player_mut(player_id) {
            player.cash -= price;
        }
        let event = self.event(
            Actor::player(player_id),
            EventBody::PropertyPurchased {
                player_id: player_id.to_string(),
                space_index,
                price,
            },
        );
        events.push(event);
        let event = self.event(
            Actor::player(player_id),
            EventBody::CashChanged {
                player_id: player_id.to_string(),
                delta: -price,
                reason: "buy_property".to_string(),
            },
        );
        events.push(event);
    }

    // ------------------------------------------------------------------
    // Semantic validation (pure; runs before any mutation)
    // ------------------------------------------------------------------

    fn validate_semantics(&self, action: &Action) -> Result<(), EngineError> {
        match action {
            Action::BuyProperty => {
                let pending = self.pending_turn.as_ref().expect("pending turn");
                let space_index = pending
                    .space_index
                    .ok_or_else(|| EngineError::illegal("missing pending space index"))?;
                let space = &self.state.board[space_index];
                if space.owner_id.is_some() {
                    return Err(EngineError::illegal("property is already owned"));
                }
                let price = space.price.unwrap_or(0);
                let cash = self
                    .state
                    .player(&pending.player_id)
                    .map(|p| p.cash)
                    .unwrap_or(0);
                if cash < price {
                    return Err(EngineError::illegal("insufficient cash to buy property"));
                }
                Ok(())
            }
            Action::PayJailFine => {
                let pending = self.pending_turn.as_ref().expect("pending turn");
                let cash = self
                    .state
                    .player(&pending.player_id)
                    .map(|p| p.cash)
                    .unwrap_or(0);
                if cash < JAIL_FINE {
                    return Err(EngineError::illegal("insufficient cash for jail fine"));
                }
                Ok(())
            }
            Action::UseGetOutOfJailCard => {
                let pending = self.pending_turn.as_ref().expect("pending turn");
                let cards = self
                    .state
                    .player(&pending.player_id)
                    .map(|p| p.get_out_of_jail_cards)
                    .unwrap_or(0);
                if cards == 0 {
                    return Err(EngineError::illegal("no get out of jail cards available"));
                }
                Ok(())
            }
            Action::BidAuction { bid_amount } => self.check_bid(*bid_amount),
            Action::MortgageProperty { space_key } => {
                let pending = self.pending_turn.as_ref().expect("pending turn");
                self.check_mortgage(&pending.player_id, space_key).map(|_| ())
            }
            Action::UnmortgageProperty { space_key } => {
                let pending = self.pending_turn.as_ref().expect("pending turn");
                self.check_unmortgage(&pending.player_id, space_key).map(|_| ())
            }
            Action::BuildHousesOrHotel { build_plan } => {
                let pending = self.pending_turn.as_ref().expect("pending turn");
                self.check_build_plan(&pending.player_id, build_plan).map(|_| ())
            }
            Action::SellHousesOrHotel { sell_plan } => {
                let pending = self.pending_turn.as_ref().expect("pending turn");
                self.check_sell_plan(&pending.player_id, sell_plan).map(|_| ())
            }
            Action::ProposeTrade {
                to_player_id,
                offer,
                request,
            } => {
                let pending = self.pending_turn.as_ref().expect("pending turn");
                self.check_trade_proposal(&pending.player_id, to_player_id, offer, request)
            }
            Action::CounterTrade { offer, request } => self.check_counter(offer, request),
            Action::AcceptTrade => self.check_accept(),
            Action::StartAuction
            | Action::RollForDoubles
            | Action::DropOut
            | Action::RejectTrade
            | Action::EndTurn
            | Action::DeclareBankruptcy
            | Action::Noop { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
            EngineConfig::new(seed, format!("run-{}", seed), four_players())
                .with_max_turns(max_turns)
                .with_timestamps(0, 1),
        )
    }

    #[test]
    fn first_advance_emits_game_started() {
        let mut engine = engine(7, 3);
        let result = engine.advance_until_decision(1);
        assert_eq!(result.events[0].body, EventBody::GameStarted {});
        assert_eq!(result.events[0].seq, 0);
    }

    #[test]
    fn pending_decision_is_returned_again() {
        let mut engine = engine(123, 5);
        engine.state_mut().player_mut("p1").unwrap().position = 10;
        engine.force_rolls(&[(1, 3)]);
        let first = engine.advance_until_decision(1);
        let decision = first.decision.expect("buy decision");
        let second = engine.advance_until_decision(1);
        assert!(second.events.is_empty());
        assert_eq!(
            second.decision.map(|d| d.decision_id),
            Some(decision.decision_id)
        );
    }

    #[test]
    fn buy_decision_and_purchase() {
        let mut engine = engine(123, 5);
        engine.state_mut().player_mut("p1").unwrap().position = 10;
        engine.force_rolls(&[(1, 3)]);

        let result = engine.advance_until_decision(1);
        let decision = result.decision.expect("decision");
        assert_eq!(decision.decision_type, DecisionType::BuyOrAuctionDecision);
        assert_eq!(decision.player_id, "p1");
        assert!(decision.allows(ActionName::BuyProperty));
        assert!(result
            .events
            .iter()
            .any(|e| matches!(e.body, EventBody::LlmDecisionRequested { .. })));

        let action = ActionEnvelope::new(&decision.decision_id, ActionName::BuyProperty);
        let result = engine.apply_action(&action, None).unwrap();
        assert_eq!(
            engine.state().board[14].owner_id.as_deref(),
            Some("p1")
        );
        assert_eq!(engine.state().player("p1").unwrap().cash, 1500 - 160);
        assert!(result.events.iter().any(|e| matches!(
            &e.body,
            EventBody::PropertyPurchased { space_index: 14, price: 160, .. }
        )));
        assert!(result.events.iter().any(|e| matches!(
            &e.body,
            EventBody::CashChanged { delta: -160, reason, .. } if reason == "buy_property"
        )));
    }

    #[test]
    fn rent_is_paid_to_owner() {
        let mut engine = engine(123, 3);
        engine.state_mut().player_mut("p1").unwrap().position = 10;
        engine.state_mut().board[14].owner_id = Some("p2".into());
        engine.force_rolls(&[(1, 3)]);

        let result = engine.advance_until_decision(1);
        let rent = result
            .events
            .iter()
            .find_map(|e| match &e.body {
                EventBody::RentPaid { amount, .. } => Some(*amount),
                _ => None,
            })
            .expect("rent event");
        assert_eq!(rent, 12);
        assert_eq!(engine.state().player("p1").unwrap().cash, 1500 - 12);
        assert_eq!(engine.state().player("p2").unwrap().cash, 1500 + 12);
        // Not in jail, solvent: the turn continues with a post-turn decision.
        assert_eq!(
            result.decision.map(|d| d.decision_type),
            Some(DecisionType::PostTurnActionDecision)
        );
    }

    #[test]
    fn monopoly_doubles_base_rent() {
        let mut engine = engine(123, 3);
        engine.state_mut().player_mut("p1").unwrap().position = 37;
        engine.state_mut().board[1].owner_id = Some("p2".into());
        engine.state_mut().board[3].owner_id = Some("p2".into());
        engine.force_rolls(&[(1, 3)]);

        let result = engine.advance_until_decision(1);
        let rent = result
            .events
            .iter()
            .find_map(|e| match &e.body {
                EventBody::RentPaid { amount, .. } => Some(*amount),
                _ => None,
            })
            .expect("rent event");
        assert_eq!(rent, 4);
    }

    #[test]
    fn mortgaged_property_collects_no_rent() {
        let mut engine = engine(123, 3);
        engine.state_mut().player_mut("p1").unwrap().position = 10;
        engine.state_mut().board[14].owner_id = Some("p2".into());
        engine.state_mut().board[14].mortgaged = true;
        engine.force_rolls(&[(2, 2)]);

        let result = engine.advance_until_decision(1);
        assert!(result
            .events
            .iter()
            .all(|e| !matches!(e.body, EventBody::RentPaid { .. })));
        assert_eq!(engine.state().player("p1").unwrap().cash, 1500);
    }

    #[test]
    fn three_doubles_sends_to_jail_without_moving() {
        let mut engine = engine(7, 6);
        engine.force_rolls(&[(1, 1)]);
        {
            // Two doubles already rolled this turn sequence.
            let player = engine.state_mut().player_mut("p1").unwrap();
            player.doubles_count = 2;
            player.position = 0;
        }
        let result = engine.advance_until_decision(1);
        let jailed = result
            .events
            .iter()
            .find_map(|e| match &e.body {
                EventBody::SentToJail { reason, .. } => Some(reason.clone()),
                _ => None,
            })
            .expect("jail event");
        assert_eq!(jailed, "THREE_DOUBLES");
        let moved_before_jail = result.events.iter().any(|e| {
            matches!(&e.body, EventBody::PlayerMoved { to, .. } if *to != moa_board::JAIL_INDEX)
        });
        assert!(!moved_before_jail);
        assert!(result
            .events
            .iter()
            .any(|e| matches!(e.body, EventBody::TurnEnded {})));
        assert!(engine.state().player("p1").unwrap().in_jail);
    }

    #[test]
    fn decision_id_applies_once() {
        let mut engine = engine(23, 6);
        engine.state_mut().player_mut("p1").unwrap().position = 10;
        engine.force_rolls(&[(1, 3)]);
        let decision = engine.advance_until_decision(1).decision.expect("decision");
        let action = ActionEnvelope::new(&decision.decision_id, ActionName::BuyProperty);
        engine.apply_action(&action, None).unwrap();
        let snapshot = engine.get_snapshot();
        let err = engine.apply_action(&action, None).unwrap_err();
        assert_eq!(
            err,
            EngineError::IllegalAction("decision already applied".into())
        );
        assert_eq!(engine.get_snapshot(), snapshot);
    }

    #[test]
    fn illegal_action_is_rejected_without_mutation() {
        let mut engine = engine(123, 5);
        engine.state_mut().player_mut("p1").unwrap().position = 10;
        engine.force_rolls(&[(1, 3)]);
        let decision = engine.advance_until_decision(1).decision.expect("decision");
        let snapshot = engine.get_snapshot();
        let action = ActionEnvelope::new(&decision.decision_id, ActionName::EndTurn);
        assert!(engine.apply_action(&action, None).is_err());
        assert_eq!(engine.get_snapshot(), snapshot);
        // The decision is still pending and can be resolved normally.
        let action = ActionEnvelope::new(&decision.decision_id, ActionName::StartAuction);
        assert!(engine.apply_action(&action, None).is_ok());
    }

    #[test]
    fn turn_rotation_without_doubles() {
        let mut engine = engine(7, 12);
        engine.force_rolls(&[(1, 2), (3, 4), (1, 3), (2, 3), (1, 2), (3, 4), (1, 3), (2, 3)]);
        let mut started: Vec<PlayerId> = Vec::new();
        while started.len() < 6 && !engine.is_game_over() {
            let result = engine.advance_until_decision(1);
            if result
                .events
                .iter()
                .any(|e| matches!(e.body, EventBody::TurnStarted {}))
            {
                started.push(engine.state().active_player_id.clone());
            }
            let Some(decision) = result.decision else { break };
            let action = fallback_for(&decision);
            engine.apply_action(&action, None).unwrap();
        }
        assert_eq!(started[..6], ["p1", "p2", "p3", "p4", "p1", "p2"]);
    }

    #[test]
    fn extra_turns_can_be_disabled() {
        let mut engine = Engine::new(
            EngineConfig::new(31, "run-noextra", four_players())
                .with_max_turns(12)
                .with_timestamps(0, 1)
                .without_extra_turns(),
        );
        engine.force_rolls(&[(2, 2); 24]);
        let mut started: Vec<PlayerId> = Vec::new();
        while started.len() < 6 && !engine.is_game_over() {
            let result = engine.advance_until_decision(1);
            if result
                .events
                .iter()
                .any(|e| matches!(e.body, EventBody::TurnStarted {}))
            {
                started.push(engine.state().active_player_id.clone());
            }
            let Some(decision) = result.decision else { continue };
            let action = fallback_for(&decision);
            engine.apply_action(&action, None).unwrap();
        }
        assert_eq!(started[..6], ["p1", "p2", "p3", "p4", "p1", "p2"]);
    }

    #[test]
    fn stop_reason_finishes_game() {
        let mut engine = engine(99, 50);
        engine.request_stop("STOPPED");
        let result = engine.advance_until_decision(1);
        assert!(engine.is_game_over());
        let reason = result
            .events
            .iter()
            .find_map(|e| match &e.body {
                EventBody::GameEnded { reason, .. } => Some(reason.clone()),
                _ => None,
            })
            .expect("game ended");
        assert_eq!(reason, "STOPPED");
    }

    #[test]
    fn event_seq_is_dense_and_timestamps_monotonic() {
        let mut engine = engine(99, 30);
        let mut events = Vec::new();
        while !engine.is_game_over() {
            let result = engine.advance_until_decision(1);
            let done = result.events.is_empty() && result.decision.is_none();
            events.extend(result.events);
            if let Some(decision) = result.decision {
                let action = fallback_for(&decision);
                events.extend(engine.apply_action(&action, None).unwrap().events);
            } else if done {
                break;
            }
        }
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.seq, i as Seq);
            assert_eq!(event.ts_ms, i as u64);
        }
    }

    /// Minimal always-legal policy for driving engine tests.
    pub(crate) fn fallback_for(decision: &DecisionPoint) -> ActionEnvelope {
        let name = if decision.allows(ActionName::BuyProperty) {
            ActionName::BuyProperty
        } else if decision.allows(ActionName::StartAuction) {
            ActionName::StartAuction
        } else if decision.allows(ActionName::EndTurn) {
            ActionName::EndTurn
        } else if decision.allows(ActionName::RollForDoubles) {
            ActionName::RollForDoubles
        } else if decision.allows(ActionName::PayJailFine) {
            ActionName::PayJailFine
        } else if decision.allows(ActionName::UseGetOutOfJailCard) {
            ActionName::UseGetOutOfJailCard
        } else if decision.allows(ActionName::DropOut) {
            ActionName::DropOut
        } else if decision.allows(ActionName::RejectTrade) {
            ActionName::RejectTrade
        } else if decision.allows(ActionName::DeclareBankruptcy) {
            ActionName::DeclareBankruptcy
        } else {
            decision.legal_actions[0].action
        };
        ActionEnvelope::new(&decision.decision_id, name)
    }
}
