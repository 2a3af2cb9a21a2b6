use super::action::Action;
use super::action::ActionName;
use super::decision::AuctionContext;
use super::decision::DecisionPoint;
use super::decision::DecisionType;
use super::decision::LegalAction;
use super::decision::args_schema_bid;
use super::engine::Engine;
use super::engine::PendingTurn;
use super::error::EngineError;
use super::event::Actor;
use super::event::EventBody;
use super::event::EventRecord;
use super::state::AuctionState;
use moa_core::*;

/// Auction flow. The initiator's next seat bids first, the cursor skips
/// the current leader, and the auction ends when only the leader remains
/// (SOLD) or everyone has dropped without a bid (NO_BIDS).
impl Engine {
    pub(crate) fn start_auction(
        &mut self,
        initiator_id: &str,
        space_index: SpaceIndex,
        pending: &PendingTurn,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        let players = &self.state.players;
        let start = players
            .iter()
            .position(|p| p.player_id == initiator_id)
            .unwrap_or(0);
        let bidders: Vec<PlayerId> = (1..=players.len())
            .map(|offset| &players[(start + offset) % players.len()])
            .filter(|p| !p.bankrupt)
            .map(|p| p.player_id.clone())
            .collect();
        self.state.auction = Some(AuctionState {
            space_index,
            property_space_key: moa_board::space_key(space_index),
            current_high_bid: 0,
            current_leader_player_id: None,
            active_bidders_player_ids: bidders,
            current_bidder_cursor: 0,
            initiator_player_id: initiator_id.to_string(),
            turn_owner_player_id: pending.player_id.clone(),
            rolled_double_this_turn: pending.rolled_double,
        });
        log::debug!(
            "[engine] auction started for space {} by {}",
            space_index,
            initiator_id
        );
        let event = self.event(
            Actor::engine(),
            EventBody::AuctionStarted {
                space_index,
                initiator_player_id: initiator_id.to_string(),
            },
        );
        events.push(event);
        self.next_auction_step(events)
    }

    pub(crate) fn dispatch_auction(
        &mut self,
        action: Action,
        player_id: &str,
        events: &mut Vec<EventRecord>,
    ) -> Option<DecisionPoint> {
        match action {
            Action::BidAuction { bid_amount } => {
                {
                    let auction = self.state.auction.as_mut().expect("live auction");
                    auction.current_high_bid = bid_amount;
                    auction.current_leader_player_id = Some(player_id.to_string());
                    auction.current_bidder_cursor += 1;
                }
                let event = self.event(
                    Actor::player(player_id),
                    EventBody::AuctionBidPlaced {
                        player_id: player_id.to_string(),
                        amount: bid_amount,
                    },
                );
                events.push(event);
                self.next_auction_step(events)
            }
            Action::DropOut => {
                self.drop_bidder(player_id, events);
                self.next_auction_step(events)
            }
            _ => unreachable!("validated action for auction decision"),
        }
    }

    fn drop_bidder(&mut self, player_id: &str, events: &mut Vec<EventRecord>) {
        {
            let auction = self.state.auction.as_mut().expect("live auction");
            if let Some(position) = auction
                .active_bidders_player_ids
                .iter()
                .position(|id| id == player_id)
            {
                auction.active_bidders_player_ids.remove(position);
                if auction.current_bidder_cursor > position {
                    auction.current_bidder_cursor -= 1;
                }
            }
        }
        let event = self.event(
            Actor::player(player_id),
            EventBody::AuctionPlayerDropped {
                player_id: player_id.to_string(),
            },
        );
        events.push(event);
    }

    /// Moves the auction forward: auto-drops bidders who cannot cover
    /// the minimum raise, asks the next solvent non-leader to bid, or
    /// settles the auction when no one is left to ask.
    fn next_auction_step(&mut self, events: &mut Vec<EventRecord>) -> Option<DecisionPoint> {
        loop {
            let Some(auction) = self.state.auction.as_ref() else {
                return None;
            };
            let bidders = &auction.active_bidders_player_ids;
            let leader = auction.current_leader_player_id.clone();
            if bidders.len() <= 1 {
                // Only the leader remains (SOLD), or the last bidder
                // never bid and everyone else is gone (NO_BIDS).
                return self.end_auction(events);
            }
            let cursor = auction.current_bidder_cursor % bidders.len();
            let candidate = bidders[cursor].clone();
            if Some(&candidate) == leader.as_ref() {
                self.state
                    .auction
                    .as_mut()
                    .expect("live auction")
                    .current_bidder_cursor = cursor + 1;
                continue;
            }
            let min_next_bid = auction.current_high_bid + 1;
            let cash = self.state.player(&candidate).map(|p| p.cash).unwrap_or(0);
            if cash < min_next_bid {
                // Cannot cover the minimum raise: dropped automatically
                // so the cursor only rests on solvent bidders.
                self.state
                    .auction
                    .as_mut()
                    .expect("live auction")
                    .current_bidder_cursor = cursor;
                self.drop_bidder(&candidate, events);
                continue;
            }
            self.state
                .auction
                .as_mut()
                .expect("live auction")
                .current_bidder_cursor = cursor;
            let decision = self.build_auction_decision(&candidate);
            let rolled_double = self
                .state
                .auction
                .as_ref()
                .map(|a| a.rolled_double_this_turn)
                .unwrap_or(false);
            let space_index = self.state.auction.as_ref().map(|a| a.space_index);
            return Some(self.issue(decision, space_index, rolled_double, events));
        }
    }

    /// Settles and clears the auction, then resumes the interrupted
    /// turn at its post-turn decision.
    fn end_auction(&mut self, events: &mut Vec<EventRecord>) -> Option<DecisionPoint> {
        let auction = self.state.auction.take().expect("live auction");
        let sold = auction.current_leader_player_id.is_some() && auction.current_high_bid > 0;
        if sold {
            let winner = auction
                .current_leader_player_id
                .clone()
                .expect("auction leader");
            self.state.board[auction.space_index].owner_id = Some(winner.clone());
            if let Some(player) = self.state.player_mut(&winner) {
                player.cash -= auction.current_high_bid;
            }
            let event = self.event(
                Actor::player(&winner),
                EventBody::PropertyPurchased {
                    player_id: winner.clone(),
                    space_index: auction.space_index,
                    price: auction.current_high_bid,
                },
            );
            events.push(event);
            let event = self.event(
                Actor::player(&winner),
                EventBody::CashChanged {
                    player_id: winner.clone(),
                    delta: -auction.current_high_bid,
                    reason: "auction_bid".to_string(),
                },
            );
            events.push(event);
            let event = self.event(
                Actor::engine(),
                EventBody::AuctionEnded {
                    reason: "SOLD".to_string(),
                    winner_player_id: Some(winner),
                    winning_bid: Some(auction.current_high_bid),
                    space_index: auction.space_index,
                },
            );
            events.push(event);
        } else {
            let event = self.event(
                Actor::engine(),
                EventBody::AuctionEnded {
                    reason: "NO_BIDS".to_string(),
                    winner_player_id: None,
                    winning_bid: None,
                    space_index: auction.space_index,
                },
            );
            events.push(event);
        }
        let turn_owner = auction.turn_owner_player_id.clone();
        self.maybe_start_post_turn(&turn_owner, auction.rolled_double_this_turn, events)
    }

    pub(crate) fn build_auction_decision(&mut self, bidder_id: &str) -> DecisionPoint {
        let (space_index, space_key, high_bid, leader) = {
            let auction = self.state.auction.as_ref().expect("live auction");
            (
                auction.space_index,
                auction.property_space_key.clone(),
                auction.current_high_bid,
                auction.current_leader_player_id.clone(),
            )
        };
        let mut decision = self.decision_header(bidder_id, DecisionType::AuctionBidDecision);
        let min_next_bid = high_bid + 1;
        decision
            .legal_actions
            .push(LegalAction::new(ActionName::BidAuction).with_schema(args_schema_bid(min_next_bid)));
        decision
            .legal_actions
            .push(LegalAction::new(ActionName::DropOut));
        decision.auction = Some(AuctionContext {
            space_index,
            space_key,
            current_high_bid: high_bid,
            min_next_bid,
            current_leader_player_id: leader,
        });
        decision
    }

    pub(crate) fn check_bid(&self, bid_amount: Cash) -> Result<(), EngineError> {
        let Some(auction) = self.state.auction.as_ref() else {
            return Err(EngineError::illegal("no auction in progress"));
        };
        if bid_amount <= auction.current_high_bid {
            return Err(EngineError::illegal("bid must exceed the current high bid"));
        }
        let bidder = self
            .pending_turn
            .as_ref()
            .map(|p| p.player_id.clone())
            .unwrap_or_default();
        let cash = self.state.player(&bidder).map(|p| p.cash).unwrap_or(0);
        if bid_amount > cash {
            return Err(EngineError::illegal("bid exceeds available cash"));
        }
        Ok(())
    }
}
