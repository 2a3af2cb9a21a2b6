use super::engine::Engine;
use super::engine::Landing;
use super::event::Actor;
use super::event::EventBody;
use super::event::EventRecord;
use super::state::PaymentEntry;
use super::state::PaymentKind;
use moa_board::Card;
use moa_board::DeckType;
use moa_board::SpaceKind;
use moa_core::*;

/// Card decks and effects. Cards return to the bottom of their deck
/// after resolving, except GET_OUT_OF_JAIL_FREE which the player keeps.
impl Engine {
    pub(crate) fn draw_card(
        &mut self,
        deck_type: DeckType,
        player_id: &str,
        rolled_double: bool,
        events: &mut Vec<EventRecord>,
    ) -> Landing {
        let card = match deck_type {
            DeckType::Chance => self.chance_deck.pop_front(),
            DeckType::CommunityChest => self.community_deck.pop_front(),
        };
        let Some(card) = card else {
            return None;
        };
        log::debug!("[engine] {} draws {} from {}", player_id, card, deck_type);
        let event = self.event(
            Actor::player(player_id),
            EventBody::CardDrawn {
                deck_type,
                card_id: card.id().to_string(),
            },
        );
        events.push(event);
        if card == Card::GetOutOfJailFree {
            if let Some(player) = self.state.player_mut(player_id) {
                player.get_out_of_jail_cards += 1;
            }
            self.jail_card_sources
                .entry(player_id.to_string())
                .or_default()
                .push_back(deck_type);
            return None;
        }
        let landing = self.apply_card_effect(deck_type, card, player_id, rolled_double, events);
        self.return_card_to_deck(deck_type, card);
        landing
    }

    pub(crate) fn return_card_to_deck(&mut self, deck_type: DeckType, card: Card) {
        match deck_type {
            DeckType::Chance => self.chance_deck.push_back(card),
            DeckType::CommunityChest => self.community_deck.push_back(card),
        }
    }

    /// Returns a used GET_OUT_OF_JAIL_FREE card to the bottom of the
    /// deck it was drawn from (tracked FIFO per player).
    pub(crate) fn return_jail_card(&mut self, player_id: &str) {
        let deck = self
            .jail_card_sources
            .get_mut(player_id)
            .and_then(|sources| sources.pop_front())
            .unwrap_or(DeckType::Chance);
        self.return_card_to_deck(deck, Card::GetOutOfJailFree);
    }

    fn apply_card_effect(
        &mut self,
        deck_type: DeckType,
        card: Card,
        player_id: &str,
        rolled_double: bool,
        events: &mut Vec<EventRecord>,
    ) -> Landing {
        let position = self.state.player(player_id).expect("card player").position;
        match card {
            Card::AdvanceToGo => self.move_to(player_id, 0, true, rolled_double, events),
            Card::GoToIllinoisAve => self.move_to(player_id, 24, true, rolled_double, events),
            Card::GoToStCharlesPlace => self.move_to(player_id, 11, true, rolled_double, events),
            Card::TakeTripToReadingRr => self.move_to(player_id, 5, true, rolled_double, events),
            Card::AdvanceToBoardwalk => self.move_to(player_id, 39, true, rolled_double, events),
            Card::GoBack3Spaces => {
                let target = (position + BOARD_SIZE - 3) % BOARD_SIZE;
                self.move_to(player_id, target, false, rolled_double, events)
            }
            Card::GoToJail => {
                self.send_to_jail(player_id, &format!("{}_CARD", deck_type), events);
                None
            }
            Card::GoToNearestUtility => {
                self.advance_to_nearest(player_id, SpaceKind::Utility, rolled_double, events)
            }
            Card::GoToNearestRailroadA | Card::GoToNearestRailroadB => {
                self.advance_to_nearest(player_id, SpaceKind::Railroad, rolled_double, events)
            }
            Card::BankPaysYouDividend50 => self.collect(player_id, 50, card, events),
            Card::BuildingLoanMaturesReceive150 => self.collect(player_id, 150, card, events),
            Card::BankErrorCollect200 => self.collect(player_id, 200, card, events),
            Card::SaleOfStockCollect50 => self.collect(player_id, 50, card, events),
            Card::HolidayFundReceive100 => self.collect(player_id, 100, card, events),
            Card::IncomeTaxRefundCollect20 => self.collect(player_id, 20, card, events),
            Card::LifeInsuranceCollect100 => self.collect(player_id, 100, card, events),
            Card::ConsultancyFeeCollect25 => self.collect(player_id, 25, card, events),
            Card::BeautyContestCollect10 => self.collect(player_id, 10, card, events),
            Card::Inherit100 => self.collect(player_id, 100, card, events),
            Card::PayPoorTax15 => self.assess(player_id, 15, card, rolled_double, events),
            Card::DoctorFeePay50 => self.assess(player_id, 50, card, rolled_double, events),
            Card::HospitalFeesPay100 => self.assess(player_id, 100, card, rolled_double, events),
            Card::SchoolFeesPay50 => self.assess(player_id, 50, card, rolled_double, events),
            Card::GeneralRepairs => {
                let total = self.repairs_cost(
                    player_id,
                    CHANCE_REPAIR_HOUSE_COST,
                    CHANCE_REPAIR_HOTEL_COST,
                );
                self.assess(player_id, total, card, rolled_double, events)
            }
            Card::StreetRepairs => {
                let total = self.repairs_cost(
                    player_id,
                    COMMUNITY_REPAIR_HOUSE_COST,
                    COMMUNITY_REPAIR_HOTEL_COST,
                );
                self.assess(player_id, total, card, rolled_double, events)
            }
            Card::ElectedChairmanPayEachPlayer50 => {
                let payments: Vec<PaymentEntry> = self
                    .state
                    .players
                    .iter()
                    .filter(|p| p.player_id != player_id && !p.bankrupt)
                    .map(|p| PaymentEntry {
                        amount: 50,
                        to_player_id: Some(p.player_id.clone()),
                        reason: card.id().to_string(),
                        kind: PaymentKind::Card,
                        space_index: None,
                    })
                    .collect();
                self.process_payment_queue(player_id, payments, rolled_double, events)
                    .map(|decision| (decision, Some(position)))
            }
            Card::BirthdayCollect10FromEachPlayer => {
                let others: Vec<PlayerId> = self
                    .state
                    .players
                    .iter()
                    .filter(|p| p.player_id != player_id && !p.bankrupt)
                    .map(|p| p.player_id.clone())
                    .collect();
                for other_id in others {
                    let cash = self.state.player(&other_id).map(|p| p.cash).unwrap_or(0);
                    if cash >= 10 {
                        self.cash_delta(&other_id, -10, card.id(), events);
                        self.cash_delta(player_id, 10, card.id(), events);
                    } else {
                        self.handle_bankruptcy(&other_id, Some(player_id), events);
                    }
                }
                None
            }
            Card::GetOutOfJailFree => None,
        }
    }

    /// Card move to the next space of the given kind, with the special
    /// rent rules: utilities charge dice-total x 10 on a fresh roll,
    /// railroads charge double.
    fn advance_to_nearest(
        &mut self,
        player_id: &str,
        kind: SpaceKind,
        rolled_double: bool,
        events: &mut Vec<EventRecord>,
    ) -> Landing {
        let position = self.state.player(player_id).expect("card player").position;
        let target = self.find_next_index(position, kind);
        let landed = self.move_no_resolve(player_id, target, true, events);
        let (owner_id, mortgaged) = {
            let space = &self.state.board[landed];
            (space.owner_id.clone(), space.mortgaged)
        };
        let owner_id = match owner_id {
            None => return self.resolve_landing(player_id, landed, 0, rolled_double, events),
            Some(owner_id) if owner_id == player_id || mortgaged => {
                return self.resolve_landing(player_id, landed, 0, rolled_double, events);
            }
            Some(owner_id) => owner_id,
        };
        let owner_bankrupt = self
            .state
            .player(&owner_id)
            .map(|p| p.bankrupt)
            .unwrap_or(true);
        if owner_bankrupt {
            return None;
        }
        let rent = match kind {
            SpaceKind::Utility => {
                let (d1, d2) = self.dice.roll();
                let event = self.event(
                    Actor::player(player_id),
                    EventBody::DiceRolled {
                        d1,
                        d2,
                        is_double: d1 == d2,
                        reason: Some("CARD_UTILITY_RENT".to_string()),
                    },
                );
                events.push(event);
                (d1 + d2) as Cash * UTILITY_CARD_MULTIPLIER
            }
            _ => {
                let owned = self.state.count_owned(&owner_id, SpaceKind::Railroad);
                if owned == 0 {
                    return None;
                }
                moa_board::RAILROAD_RENTS[owned.min(4) - 1] * 2
            }
        };
        let payment = PaymentEntry {
            amount: rent,
            to_player_id: Some(owner_id),
            reason: "RENT".to_string(),
            kind: PaymentKind::Rent,
            space_index: Some(landed),
        };
        self.request_payment(player_id, payment, Vec::new(), rolled_double, events)
            .map(|decision| (decision, Some(landed)))
    }

    fn collect(
        &mut self,
        player_id: &str,
        amount: Cash,
        card: Card,
        events: &mut Vec<EventRecord>,
    ) -> Landing {
        self.cash_delta(player_id, amount, card.id(), events);
        None
    }

    fn assess(
        &mut self,
        player_id: &str,
        amount: Cash,
        card: Card,
        rolled_double: bool,
        events: &mut Vec<EventRecord>,
    ) -> Landing {
        if amount <= 0 {
            return None;
        }
        let position = self.state.player(player_id).expect("card player").position;
        let payment = PaymentEntry {
            amount,
            to_player_id: None,
            reason: card.id().to_string(),
            kind: PaymentKind::Card,
            space_index: None,
        };
        self.request_payment(player_id, payment, Vec::new(), rolled_double, events)
            .map(|decision| (decision, Some(position)))
    }

    fn find_next_index(&self, start: SpaceIndex, kind: SpaceKind) -> SpaceIndex {
        for offset in 1..=BOARD_SIZE {
            let index = (start + offset) % BOARD_SIZE;
            if self.state.board[index].kind == kind {
                return index;
            }
        }
        start
    }
}
