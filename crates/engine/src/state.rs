use moa_board::Group;
use moa_board::SpaceKind;
use moa_board::BOARD;
use moa_core::*;
use serde::Deserialize;
use serde::Serialize;

/// Turn-machine phase, visible in snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    StartTurn,
    ResolvingMove,
    AwaitingDecision,
    EndTurn,
    GameOver,
}

/// Mutable per-run state of one board space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpaceState {
    pub index: SpaceIndex,
    pub kind: SpaceKind,
    pub name: String,
    pub group: Option<Group>,
    pub price: Option<Cash>,
    pub owner_id: Option<PlayerId>,
    pub mortgaged: bool,
    pub houses: i64,
    pub hotel: bool,
}

impl SpaceState {
    /// Building value for the even-building rule (hotel counts as 5).
    pub fn building_value(&self) -> i64 {
        if self.hotel {
            HOTEL_HOUSE_EQUIV
        } else {
            self.houses
        }
    }
    pub fn has_buildings(&self) -> bool {
        self.houses > 0 || self.hotel
    }
    /// Half the face price.
    pub fn mortgage_value(&self) -> Cash {
        self.price.unwrap_or(0) / 2
    }
    /// Mortgage value plus 10% interest, rounded up.
    pub fn unmortgage_cost(&self) -> Cash {
        let value = self.mortgage_value();
        value + (value + 9) / 10
    }
}

/// Mutable per-run state of one player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub player_id: PlayerId,
    pub name: String,
    pub cash: Cash,
    pub position: SpaceIndex,
    pub in_jail: bool,
    pub jail_turns: u32,
    pub doubles_count: u32,
    pub bankrupt: bool,
    pub bankrupt_to: Option<PlayerId>,
    pub get_out_of_jail_cards: u32,
}

impl PlayerState {
    pub fn new(player_id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            name: name.into(),
            cash: STARTING_CASH,
            position: 0,
            in_jail: false,
            jail_turns: 0,
            doubles_count: 0,
            bankrupt: false,
            bankrupt_to: None,
            get_out_of_jail_cards: 0,
        }
    }
}

/// Bank building inventory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BankState {
    pub houses_remaining: i64,
    pub hotels_remaining: i64,
}

impl Default for BankState {
    fn default() -> Self {
        Self {
            houses_remaining: BANK_HOUSES,
            hotels_remaining: BANK_HOTELS,
        }
    }
}

/// Live auction for one unclaimed space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuctionState {
    pub space_index: SpaceIndex,
    pub property_space_key: SpaceKey,
    pub current_high_bid: Cash,
    pub current_leader_player_id: Option<PlayerId>,
    pub active_bidders_player_ids: Vec<PlayerId>,
    pub current_bidder_cursor: usize,
    pub initiator_player_id: PlayerId,
    pub turn_owner_player_id: PlayerId,
    pub rolled_double_this_turn: bool,
}

/// One side of a trade: cash, properties by space key, jail cards.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeBundle {
    pub cash: Cash,
    pub properties: Vec<SpaceKey>,
    pub get_out_of_jail_cards: u32,
}

impl TradeBundle {
    pub fn is_empty(&self) -> bool {
        self.cash == 0 && self.properties.is_empty() && self.get_out_of_jail_cards == 0
    }
}

/// One exchange recorded in a trade thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeExchange {
    pub by_player_id: PlayerId,
    pub offer: TradeBundle,
    pub request: TradeBundle,
}

/// Live trade negotiation between two players.
/// `proposer` made the current offer; `responder` must answer it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeState {
    pub initiator_player_id: PlayerId,
    pub counterparty_player_id: PlayerId,
    pub proposer_player_id: PlayerId,
    pub responder_player_id: PlayerId,
    pub max_exchanges: u32,
    pub exchange_index: u32,
    pub offer: TradeBundle,
    pub request: TradeBundle,
    pub history: Vec<TradeExchange>,
    pub turn_owner_player_id: PlayerId,
    pub rolled_double_this_turn: bool,
}

/// Classification of a forced debit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentKind {
    Rent,
    Tax,
    Card,
}

/// One forced debit against the active player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentEntry {
    pub amount: Cash,
    pub to_player_id: Option<PlayerId>,
    pub reason: String,
    pub kind: PaymentKind,
    pub space_index: Option<SpaceIndex>,
}

/// A debit the active player could not cover, parked while they
/// liquidate. Multi-payee cards queue their remaining payments here.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingPayment {
    pub player_id: PlayerId,
    pub payment: PaymentEntry,
    pub remaining: Vec<PaymentEntry>,
    pub rolled_double: bool,
}

/// Complete mutable game state, exclusively owned by the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct GameState {
    pub run_id: String,
    pub seed: u64,
    pub turn_index: TurnIndex,
    pub phase: Phase,
    pub active_player_id: PlayerId,
    pub players: Vec<PlayerState>,
    pub bank: BankState,
    pub board: Vec<SpaceState>,
    pub auction: Option<AuctionState>,
    pub trade: Option<TradeState>,
}

/// Pure projection of [`GameState`] handed to subscribers and prompts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: String,
    pub run_id: String,
    pub turn_index: TurnIndex,
    pub phase: Phase,
    pub active_player_id: PlayerId,
    pub players: Vec<PlayerState>,
    pub bank: BankState,
    pub board: Vec<SpaceState>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub auction: Option<AuctionState>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trade: Option<TradeState>,
}

impl GameState {
    /// Creates the initial state for a run. The first configured player
    /// opens the game.
    pub fn initial(run_id: impl Into<String>, seed: u64, seats: &[(PlayerId, String)]) -> Self {
        let players: Vec<PlayerState> = seats
            .iter()
            .map(|(id, name)| PlayerState::new(id.clone(), name.clone()))
            .collect();
        let active_player_id = players
            .first()
            .map(|p| p.player_id.clone())
            .unwrap_or_default();
        Self {
            run_id: run_id.into(),
            seed,
            turn_index: 0,
            phase: Phase::StartTurn,
            active_player_id,
            players,
            bank: BankState::default(),
            board: BOARD
                .iter()
                .map(|spec| SpaceState {
                    index: spec.index,
                    kind: spec.kind,
                    name: spec.name.to_string(),
                    group: spec.group,
                    price: spec.price,
                    owner_id: None,
                    mortgaged: false,
                    houses: 0,
                    hotel: false,
                })
                .collect(),
            auction: None,
            trade: None,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: self.run_id.clone(),
            turn_index: self.turn_index,
            phase: self.phase,
            active_player_id: self.active_player_id.clone(),
            players: self.players.clone(),
            bank: self.bank.clone(),
            board: self.board.clone(),
            auction: self.auction.clone(),
            trade: self.trade.clone(),
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut PlayerState> {
        self.players.iter_mut().find(|p| p.player_id == player_id)
    }

    /// Players still in the game, in seat order.
    pub fn active_players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.iter().filter(|p| !p.bankrupt)
    }

    /// Number of spaces of the given kind owned by a player.
    pub fn count_owned(&self, player_id: &str, kind: SpaceKind) -> usize {
        self.board
            .iter()
            .filter(|s| s.kind == kind && s.owner_id.as_deref() == Some(player_id))
            .count()
    }

    /// A monopoly is the whole color group, owned and unmortgaged.
    pub fn has_monopoly(&self, player_id: &str, group: Group) -> bool {
        if !group.is_buildable() {
            return false;
        }
        moa_board::group_indices(group)
            .iter()
            .all(|&i| self.board[i].owner_id.as_deref() == Some(player_id) && !self.board[i].mortgaged)
    }

    pub fn group_has_buildings(&self, group: Group) -> bool {
        moa_board::group_indices(group)
            .iter()
            .any(|&i| self.board[i].has_buildings())
    }

    pub fn group_has_mortgaged(&self, group: Group) -> bool {
        moa_board::group_indices(group)
            .iter()
            .any(|&i| self.board[i].mortgaged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seats() -> Vec<(PlayerId, String)> {
        vec![
            ("p1".into(), "P1".into()),
            ("p2".into(), "P2".into()),
        ]
    }

    #[test]
    fn initial_state_is_fresh() {
        let state = GameState::initial("run-1", 7, &seats());
        assert_eq!(state.active_player_id, "p1");
        assert_eq!(state.players.len(), 2);
        assert!(state.players.iter().all(|p| p.cash == STARTING_CASH));
        assert_eq!(state.board.len(), BOARD_SIZE);
        assert!(state.board.iter().all(|s| s.owner_id.is_none()));
        assert_eq!(state.bank.houses_remaining, BANK_HOUSES);
        assert_eq!(state.bank.hotels_remaining, BANK_HOTELS);
    }

    #[test]
    fn snapshot_omits_absent_auction_and_trade() {
        let state = GameState::initial("run-1", 7, &seats());
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert!(json.get("auction").is_none());
        assert!(json.get("trade").is_none());
        assert_eq!(json["schema_version"], "v1");
        assert_eq!(json["phase"], "START_TURN");
    }

    #[test]
    fn monopoly_requires_full_unmortgaged_group() {
        let mut state = GameState::initial("run-1", 7, &seats());
        state.board[1].owner_id = Some("p1".into());
        assert!(!state.has_monopoly("p1", Group::Brown));
        state.board[3].owner_id = Some("p1".into());
        assert!(state.has_monopoly("p1", Group::Brown));
        state.board[3].mortgaged = true;
        assert!(!state.has_monopoly("p1", Group::Brown));
    }

    #[test]
    fn unmortgage_cost_rounds_up() {
        let state = GameState::initial("run-1", 7, &seats());
        // Mediterranean: price 60, mortgage 30, interest 3.
        assert_eq!(state.board[1].mortgage_value(), 30);
        assert_eq!(state.board[1].unmortgage_cost(), 33);
        // Connecticut: price 120, mortgage 60, interest 6.
        assert_eq!(state.board[9].unmortgage_cost(), 66);
    }
}
