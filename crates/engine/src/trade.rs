use super::action::Action;
use super::action::ActionName;
use super::decision::DecisionPoint;
use super::decision::DecisionType;
use super::decision::LegalAction;
use super::decision::TradeContext;
use super::decision::args_schema_counter_trade;
use super::engine::Engine;
use super::error::EngineError;
use super::event::Actor;
use super::event::EventBody;
use super::event::EventRecord;
use super::state::TradeBundle;
use super::state::TradeExchange;
use super::state::TradeState;
use moa_core::*;

/// Trade threads: a proposal followed by up to `MAX_TRADE_EXCHANGES`
/// alternating counters. Resolution (accept, reject, or expiry) ends
/// the initiator's turn.
impl Engine {
    pub(crate) fn start_trade(
        &mut self,
        proposer_id: &str,
        counterparty_id: &str,
        offer: TradeBundle,
        request: TradeBundle,
        rolled_double: bool,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        let trade = TradeState {
            initiator_player_id: proposer_id.to_string(),
            counterparty_player_id: counterparty_id.to_string(),
            proposer_player_id: proposer_id.to_string(),
            responder_player_id: counterparty_id.to_string(),
            max_exchanges: MAX_TRADE_EXCHANGES,
            exchange_index: 0,
            offer: offer.clone(),
            request: request.clone(),
            history: vec![TradeExchange {
                by_player_id: proposer_id.to_string(),
                offer: offer.clone(),
                request: request.clone(),
            }],
            turn_owner_player_id: proposer_id.to_string(),
            rolled_double_this_turn: rolled_double,
        };
        self.state.trade = Some(trade);
        log::debug!(
            "[engine] {} proposes a trade to {}",
            proposer_id,
            counterparty_id
        );
        let event = self.event(
            Actor::player(proposer_id),
            EventBody::TradeProposed {
                initiator_player_id: proposer_id.to_string(),
                counterparty_player_id: counterparty_id.to_string(),
                offer,
                request,
                exchange_index: 0,
            },
        );
        events.push(event);
        let decision = self.build_trade_response_decision(counterparty_id);
        Some(self.issue(decision, None, rolled_double, events))
    }

    pub(crate) fn dispatch_trade(
        &mut self,
        action: Action,
        player_id: &str,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        let (turn_owner, rolled_double_turn) = {
            let trade = self.state.trade.as_ref().expect("live trade");
            (
                trade.turn_owner_player_id.clone(),
                trade.rolled_double_this_turn,
            )
        };
        match action {
            Action::AcceptTrade => {
                self.settle_trade(events);
                self.finish_trade_turn(&turn_owner, rolled_double_turn, events)
            }
            Action::RejectTrade => {
                let event = self.event(
                    Actor::player(player_id),
                    EventBody::TradeRejected {
                        by_player_id: player_id.to_string(),
                    },
                );
                events.push(event);
                self.state.trade = None;
                self.finish_trade_turn(&turn_owner, rolled_double_turn, events)
            }
            Action::CounterTrade { offer, request } => {
                let expired = {
                    let trade = self.state.trade.as_mut().expect("live trade");
                    trade.exchange_index += 1;
                    std::mem::swap(&mut trade.proposer_player_id, &mut trade.responder_player_id);
                    trade.offer = offer.clone();
                    trade.request = request.clone();
                    trade.history.push(TradeExchange {
                        by_player_id: player_id.to_string(),
                        offer: offer.clone(),
                        request: request.clone(),
                    });
                    trade.exchange_index >= trade.max_exchanges
                };
                if expired {
                    let (initiator, counterparty) = {
                        let trade = self.state.trade.as_ref().expect("live trade");
                        (
                            trade.initiator_player_id.clone(),
                            trade.counterparty_player_id.clone(),
                        )
                    };
                    let event = self.event(
                        Actor::engine(),
                        EventBody::TradeExpired {
                            initiator_player_id: initiator,
                            counterparty_player_id: counterparty,
                        },
                    );
                    events.push(event);
                    self.state.trade = None;
                    return self.finish_trade_turn(&turn_owner, rolled_double_turn, events);
                }
                let (responder, exchange_index, rolled_double) = {
                    let trade = self.state.trade.as_ref().expect("live trade");
                    (
                        trade.responder_player_id.clone(),
                        trade.exchange_index,
                        trade.rolled_double_this_turn,
                    )
                };
                let event = self.event(
                    Actor::player(player_id),
                    EventBody::TradeCountered {
                        by_player_id: player_id.to_string(),
                        offer,
                        request,
                        exchange_index,
                    },
                );
                events.push(event);
                let decision = self.build_trade_response_decision(&responder);
                Some(self.issue(decision, None, rolled_double, events))
            }
            _ => unreachable!("validated action for trade decision"),
        }
    }

    /// Applies an accepted trade: cash both ways, properties both ways
    /// (mortgages intact, 10% interest charged to each receiver), jail
    /// cards, then the acceptance event.
    fn settle_trade(&mut self, events: &mut Vec<EventRecord>) {
        let trade = self.state.trade.take().expect("live trade");
        let proposer = trade.proposer_player_id.clone();
        let responder = trade.responder_player_id.clone();

        if trade.offer.cash > 0 {
            self.cash_delta(&proposer, -trade.offer.cash, "TRADE_CASH", events);
            self.cash_delta(&responder, trade.offer.cash, "TRADE_CASH", events);
        }
        if trade.request.cash > 0 {
            self.cash_delta(&responder, -trade.request.cash, "TRADE_CASH", events);
            self.cash_delta(&proposer, trade.request.cash, "TRADE_CASH", events);
        }

        let mut interest_charges: Vec<(PlayerId, Cash)> = Vec::new();
        for (keys, from, to) in [
            (&trade.offer.properties, &proposer, &responder),
            (&trade.request.properties, &responder, &proposer),
        ] {
            for key in keys {
                let Some(index) = moa_board::space_index(key) else {
                    continue;
                };
                let mortgaged = {
                    let space = &mut self.state.board[index];
                    space.owner_id = Some(to.clone());
                    space.mortgaged
                };
                let event = self.event(
                    Actor::player(from),
                    EventBody::PropertyTransferred {
                        from_player_id: from.clone(),
                        to_player_id: to.clone(),
                        space_index: index,
                    },
                );
                events.push(event);
                if mortgaged {
                    let interest = mortgage_interest(&self.state.board[index]);
                    if interest > 0 {
                        interest_charges.push((to.clone(), interest));
                    }
                }
            }
        }
        for (player_id, interest) in interest_charges {
            self.cash_delta(&player_id, -interest, "MORTGAGE_INTEREST", events);
        }

        if trade.offer.get_out_of_jail_cards > 0 {
            self.transfer_jail_cards(&proposer, &responder, trade.offer.get_out_of_jail_cards);
        }
        if trade.request.get_out_of_jail_cards > 0 {
            self.transfer_jail_cards(&responder, &proposer, trade.request.get_out_of_jail_cards);
        }

        let event = self.event(
            Actor::engine(),
            EventBody::TradeAccepted {
                initiator_player_id: trade.initiator_player_id.clone(),
                counterparty_player_id: trade.counterparty_player_id.clone(),
            },
        );
        events.push(event);
    }

    fn transfer_jail_cards(&mut self, from: &str, to: &str, count: u32) {
        if let Some(player) = self.state.player_mut(from) {
            player.get_out_of_jail_cards -= count.min(player.get_out_of_jail_cards);
        }
        if let Some(player) = self.state.player_mut(to) {
            player.get_out_of_jail_cards += count;
        }
        for _ in 0..count {
            let source = self
                .jail_card_sources
                .get_mut(from)
                .and_then(|sources| sources.pop_front());
            if let Some(deck) = source {
                self.jail_card_sources
                    .entry(to.to_string())
                    .or_default()
                    .push_back(deck);
            }
        }
    }

    /// The thread is resolved; the initiator's turn ends.
    fn finish_trade_turn(
        &mut self,
        owner: &str,
        rolled_double: bool,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        let extra = rolled_double
            && self
                .state
                .player(owner)
                .map(|p| !p.bankrupt && !p.in_jail)
                .unwrap_or(false);
        self.end_turn(owner, extra, events);
        None
    }

    pub(crate) fn build_trade_response_decision(&mut self, responder_id: &str) -> DecisionPoint {
        let (context, can_accept, can_counter) = {
            let trade = self.state.trade.as_ref().expect("live trade");
            let context = TradeContext {
                initiator_player_id: trade.initiator_player_id.clone(),
                counterparty_player_id: trade.counterparty_player_id.clone(),
                exchange_index: trade.exchange_index,
                max_exchanges: trade.max_exchanges,
                offer: trade.offer.clone(),
                request: trade.request.clone(),
            };
            (
                context,
                self.trade_accept_feasible(trade),
                trade.exchange_index < trade.max_exchanges,
            )
        };
        let mut decision = self.decision_header(responder_id, DecisionType::TradeResponseDecision);
        if can_accept {
            decision
                .legal_actions
                .push(LegalAction::new(ActionName::AcceptTrade));
        }
        decision
            .legal_actions
            .push(LegalAction::new(ActionName::RejectTrade));
        if can_counter {
            decision.legal_actions.push(
                LegalAction::new(ActionName::CounterTrade)
                    .with_schema(args_schema_counter_trade()),
            );
        }
        decision.trade = Some(context);
        decision
    }

    /// Settlement feasibility for the responder: after the cash legs,
    /// they must cover 10% interest on mortgaged properties received.
    fn trade_accept_feasible(&self, trade: &TradeState) -> bool {
        let responder_cash = self
            .state
            .player(&trade.responder_player_id)
            .map(|p| p.cash)
            .unwrap_or(0);
        let interest = self.bundle_mortgage_interest(&trade.offer);
        responder_cash + trade.offer.cash - trade.request.cash >= interest
    }

    fn bundle_mortgage_interest(&self, bundle: &TradeBundle) -> Cash {
        bundle
            .properties
            .iter()
            .filter_map(|key| moa_board::space_index(key))
            .map(|index| &self.state.board[index])
            .filter(|space| space.mortgaged)
            .map(mortgage_interest)
            .sum()
    }

    /// Pre-validation of a proposal or counter: parties, ownership,
    /// buildings, cash, cards.
    pub(crate) fn check_trade_proposal(
        &self,
        proposer_id: &str,
        counterparty_id: &str,
        offer: &TradeBundle,
        request: &TradeBundle,
    ) -> Result<(), EngineError> {
        if proposer_id == counterparty_id {
            return Err(EngineError::illegal("cannot trade with yourself"));
        }
        let counterparty = self
            .state
            .player(counterparty_id)
            .ok_or_else(|| EngineError::illegal("unknown trade counterparty"))?;
        if counterparty.bankrupt {
            return Err(EngineError::illegal("counterparty is bankrupt"));
        }
        self.check_bundle(proposer_id, offer, "offer")?;
        self.check_bundle(counterparty_id, request, "request")?;
        let proposer_cash = self.state.player(proposer_id).map(|p| p.cash).unwrap_or(0);
        if offer.cash > proposer_cash {
            return Err(EngineError::illegal("offered cash exceeds balance"));
        }
        if request.cash > counterparty.cash {
            return Err(EngineError::illegal("requested cash exceeds balance"));
        }
        // The proposer must be able to settle interest on mortgaged
        // properties they would receive.
        let interest = self.bundle_mortgage_interest(request);
        if proposer_cash - offer.cash + request.cash < interest {
            return Err(EngineError::illegal(
                "proposer cannot cover mortgage interest",
            ));
        }
        Ok(())
    }

    pub(crate) fn check_counter(
        &self,
        offer: &TradeBundle,
        request: &TradeBundle,
    ) -> Result<(), EngineError> {
        let trade = self
            .state
            .trade
            .as_ref()
            .ok_or_else(|| EngineError::illegal("no trade in progress"))?;
        // The countering responder becomes the proposer of the new offer.
        self.check_trade_proposal(
            &trade.responder_player_id,
            &trade.proposer_player_id,
            offer,
            request,
        )
    }

    pub(crate) fn check_accept(&self) -> Result<(), EngineError> {
        let trade = self
            .state
            .trade
            .as_ref()
            .ok_or_else(|| EngineError::illegal("no trade in progress"))?;
        if !self.trade_accept_feasible(trade) {
            return Err(EngineError::illegal("trade settlement is not feasible"));
        }
        Ok(())
    }

    fn check_bundle(
        &self,
        owner_id: &str,
        bundle: &TradeBundle,
        side: &str,
    ) -> Result<(), EngineError> {
        if bundle.cash < 0 {
            return Err(EngineError::illegal(format!("{} cash is negative", side)));
        }
        for key in &bundle.properties {
            let index = moa_board::space_index(key)
                .ok_or_else(|| EngineError::illegal(format!("unknown space_key in {}", side)))?;
            let space = &self.state.board[index];
            if space.owner_id.as_deref() != Some(owner_id) {
                return Err(EngineError::illegal(format!(
                    "{} includes a property not owned by {}",
                    side, owner_id
                )));
            }
            if space.has_buildings() {
                return Err(EngineError::illegal(
                    "properties with buildings cannot be traded",
                ));
            }
        }
        let cards = self
            .state
            .player(owner_id)
            .map(|p| p.get_out_of_jail_cards)
            .unwrap_or(0);
        if bundle.get_out_of_jail_cards > cards {
            return Err(EngineError::illegal(format!(
                "{} includes more jail cards than {} holds",
                side, owner_id
            )));
        }
        Ok(())
    }
}

fn mortgage_interest(space: &super::state::SpaceState) -> Cash {
    let value = space.mortgage_value();
    (value + 9) / 10
}
