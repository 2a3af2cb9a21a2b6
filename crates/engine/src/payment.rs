use super::decision::DecisionPoint;
use super::engine::Engine;
use super::event::Actor;
use super::event::EventBody;
use super::event::EventRecord;
use super::state::PaymentEntry;
use super::state::PaymentKind;
use super::state::PendingPayment;
use moa_board::Card;
use moa_board::DeckType;
use moa_core::*;

/// Forced-payment protocol. A debit either settles immediately or parks
/// the turn in a liquidation decision carrying the full unpaid queue.
impl Engine {
    /// Requests a single payment from the payer. Returns the liquidation
    /// decision when the payer cannot cover it.
    pub(crate) fn request_payment(
        &mut self,
        payer_id: &str,
        payment: PaymentEntry,
        remaining: Vec<PaymentEntry>,
        rolled_double: bool,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        if payment.amount <= 0 {
            return None;
        }
        let cash = self.state.player(payer_id).map(|p| p.cash).unwrap_or(0);
        if cash >= payment.amount {
            self.apply_payment(payer_id, &payment, events);
            if remaining.is_empty() {
                return None;
            }
            return self.process_payment_queue(payer_id, remaining, rolled_double, events);
        }
        log::debug!(
            "[engine] {} owes {} but holds {}, entering liquidation",
            payer_id,
            payment.amount,
            cash
        );
        self.pending_payment = Some(PendingPayment {
            player_id: payer_id.to_string(),
            payment: payment.clone(),
            remaining,
            rolled_double,
        });
        Some(self.build_liquidation_decision(payer_id, &payment))
    }

    /// Drains a FIFO payment queue (multi-payee cards), stopping at the
    /// first entry the payer cannot cover.
    pub(crate) fn process_payment_queue(
        &mut self,
        payer_id: &str,
        payments: Vec<PaymentEntry>,
        rolled_double: bool,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        let mut queue: std::collections::VecDeque<PaymentEntry> = payments.into();
        while let Some(payment) = queue.pop_front() {
            if payment.amount <= 0 {
                continue;
            }
            let cash = self.state.player(payer_id).map(|p| p.cash).unwrap_or(0);
            if cash >= payment.amount {
                self.apply_payment(payer_id, &payment, events);
                continue;
            }
            self.pending_payment = Some(PendingPayment {
                player_id: payer_id.to_string(),
                payment: payment.clone(),
                remaining: queue.into_iter().collect(),
                rolled_double,
            });
            return Some(self.build_liquidation_decision(payer_id, &payment));
        }
        None
    }

    /// Settles one covered payment: debit, credit, and `RENT_PAID` when
    /// the payment was rent.
    pub(crate) fn apply_payment(
        &mut self,
        payer_id: &str,
        payment: &PaymentEntry,
        events: &mut Vec<EventRecord>,
    ) {
        if payment.amount <= 0 {
            return;
        }
        self.cash_delta(payer_id, -payment.amount, &payment.reason, events);
        if let Some(creditor_id) = &payment.to_player_id {
            let creditor_id = creditor_id.clone();
            if self.state.player(&creditor_id).is_some() {
                self.cash_delta(&creditor_id, payment.amount, &payment.reason, events);
            }
            if payment.kind == PaymentKind::Rent {
                if let Some(space_index) = payment.space_index {
                    let event = self.event(
                        Actor::player(payer_id),
                        EventBody::RentPaid {
                            from_player_id: payer_id.to_string(),
                            to_player_id: creditor_id,
                            amount: payment.amount,
                            space_index,
                        },
                    );
                    events.push(event);
                }
            }
        }
    }

    /// Called after a liquidation action. Re-checks solvency: settle and
    /// continue, chain another liquidation decision, or escalate to
    /// bankruptcy when no raisable assets remain.
    pub(crate) fn resolve_pending_payment(
        &mut self,
        payer_id: &str,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        let Some(pending) = self.pending_payment.clone() else {
            return None;
        };
        let cash = self.state.player(payer_id).map(|p| p.cash).unwrap_or(0);
        if cash < pending.payment.amount {
            let options = self.liquidation_options(payer_id);
            if options.is_exhausted() {
                let creditor = pending.payment.to_player_id.clone();
                self.handle_bankruptcy(payer_id, creditor.as_deref(), events);
                self.pending_payment = None;
                self.end_turn(payer_id, false, events);
                return None;
            }
            let decision = self.build_liquidation_decision(payer_id, &pending.payment);
            return Some(self.issue(decision, None, pending.rolled_double, events));
        }
        self.apply_payment(payer_id, &pending.payment.clone(), events);
        self.pending_payment = None;
        if let Some(decision) =
            self.process_payment_queue(payer_id, pending.remaining, pending.rolled_double, events)
        {
            return Some(self.issue(decision, None, pending.rolled_double, events));
        }
        self.maybe_start_post_turn(payer_id, pending.rolled_double, events)
    }

    /// Total repairs assessment for a card, over the player's buildings.
    pub(crate) fn repairs_cost(&self, player_id: &str, house_cost: Cash, hotel_cost: Cash) -> Cash {
        let mut houses = 0;
        let mut hotels = 0;
        for space in &self.state.board {
            if space.owner_id.as_deref() != Some(player_id) {
                continue;
            }
            houses += space.houses;
            if space.hotel {
                hotels += 1;
            }
        }
        houses * house_cost + hotels * hotel_cost
    }

    /// Removes the player from the game. Remaining cash and properties
    /// go to the creditor (mortgages intact) or back to the bank
    /// (mortgages cleared); buildings and jail cards always return to
    /// the bank side of the table.
    pub(crate) fn handle_bankruptcy(
        &mut self,
        player_id: &str,
        creditor_id: Option<&str>,
        events: &mut Vec<EventRecord>,
    ) {
        let already = self
            .state
            .player(player_id)
            .map(|p| p.bankrupt)
            .unwrap_or(true);
        if already {
            return;
        }
        log::info!(
            "[engine {}] {} is bankrupt (creditor: {})",
            self.state.run_id,
            player_id,
            creditor_id.unwrap_or("bank")
        );
        let remaining_cash = {
            let player = self.state.player_mut(player_id).expect("bankrupt player");
            player.bankrupt = true;
            player.bankrupt_to = creditor_id.map(|c| c.to_string());
            player.doubles_count = 0;
            player.cash
        };
        if remaining_cash > 0 {
            self.cash_delta(player_id, -remaining_cash, "BANKRUPTCY_CASH", events);
            if let Some(creditor_id) = creditor_id {
                self.cash_delta(creditor_id, remaining_cash, "BANKRUPTCY_CASH", events);
            }
        }
        let event = self.event(
            Actor::player(player_id),
            EventBody::CashChanged {
                player_id: player_id.to_string(),
                delta: 0,
                reason: "BANKRUPTCY".to_string(),
            },
        );
        events.push(event);

        // Buildings always go back to the bank inventory.
        let owned: Vec<SpaceIndex> = self
            .state
            .board
            .iter()
            .filter(|s| s.owner_id.as_deref() == Some(player_id))
            .map(|s| s.index)
            .collect();
        for index in owned {
            let (houses, hotel) = {
                let space = &mut self.state.board[index];
                let counts = (space.houses, space.hotel);
                space.houses = 0;
                space.hotel = false;
                counts
            };
            self.state.bank.houses_remaining += houses;
            if hotel {
                self.state.bank.hotels_remaining += 1;
            }
            match creditor_id {
                Some(creditor_id) => {
                    self.state.board[index].owner_id = Some(creditor_id.to_string());
                    let event = self.event(
                        Actor::player(creditor_id),
                        EventBody::PropertyPurchased {
                            player_id: creditor_id.to_string(),
                            space_index: index,
                            price: 0,
                        },
                    );
                    events.push(event);
                }
                None => {
                    let space = &mut self.state.board[index];
                    space.owner_id = None;
                    space.mortgaged = false;
                }
            }
        }

        // Jail cards follow the creditor, or return to their decks.
        let cards = self
            .state
            .player(player_id)
            .map(|p| p.get_out_of_jail_cards)
            .unwrap_or(0);
        if cards > 0 {
            if let Some(player) = self.state.player_mut(player_id) {
                player.get_out_of_jail_cards = 0;
            }
            let mut sources = self
                .jail_card_sources
                .remove(player_id)
                .unwrap_or_default();
            match creditor_id {
                Some(creditor_id) => {
                    if let Some(player) = self.state.player_mut(creditor_id) {
                        player.get_out_of_jail_cards += cards;
                    }
                    self.jail_card_sources
                        .entry(creditor_id.to_string())
                        .or_default()
                        .extend(sources);
                }
                None => {
                    for _ in 0..cards {
                        let deck = sources.pop_front().unwrap_or(DeckType::Chance);
                        self.return_card_to_deck(deck, Card::GetOutOfJailFree);
                    }
                }
            }
        }

        if creditor_id.is_none() {
            let event = self.event(
                Actor::player(player_id),
                EventBody::CashChanged {
                    player_id: player_id.to_string(),
                    delta: 0,
                    reason: "BANKRUPTCY_ASSETS_TO_BANK".to_string(),
                },
            );
            events.push(event);
        }
    }
}
