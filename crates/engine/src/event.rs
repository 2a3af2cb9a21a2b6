use super::decision::DecisionType;
use super::state::TradeBundle;
use moa_board::DeckType;
use moa_core::*;
use serde::Deserialize;
use serde::Serialize;

/// Who caused an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorKind {
    Engine,
    Player,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub kind: ActorKind,
    pub player_id: Option<PlayerId>,
}

impl Actor {
    pub fn engine() -> Self {
        Self {
            kind: ActorKind::Engine,
            player_id: None,
        }
    }
    pub fn player(player_id: impl Into<PlayerId>) -> Self {
        Self {
            kind: ActorKind::Player,
            player_id: Some(player_id.into()),
        }
    }
}

/// Typed event payload. Serializes adjacently tagged as
/// `{"type": "...", "payload": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventBody {
    GameStarted {},
    TurnStarted {},
    TurnEnded {},
    DiceRolled {
        d1: u8,
        d2: u8,
        is_double: bool,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        reason: Option<String>,
    },
    PlayerMoved {
        from: SpaceIndex,
        to: SpaceIndex,
        passed_go: bool,
    },
    CashChanged {
        player_id: PlayerId,
        delta: Cash,
        reason: String,
    },
    PropertyPurchased {
        player_id: PlayerId,
        space_index: SpaceIndex,
        price: Cash,
    },
    RentPaid {
        from_player_id: PlayerId,
        to_player_id: PlayerId,
        amount: Cash,
        space_index: SpaceIndex,
    },
    SentToJail {
        player_id: PlayerId,
        reason: String,
    },
    CardDrawn {
        deck_type: DeckType,
        card_id: String,
    },
    PropertyMortgaged {
        player_id: PlayerId,
        space_index: SpaceIndex,
        amount: Cash,
    },
    PropertyUnmortgaged {
        player_id: PlayerId,
        space_index: SpaceIndex,
        amount: Cash,
    },
    HouseBuilt {
        player_id: PlayerId,
        space_index: SpaceIndex,
        count: i64,
    },
    HouseSold {
        player_id: PlayerId,
        space_index: SpaceIndex,
        count: i64,
    },
    HotelBuilt {
        player_id: PlayerId,
        space_index: SpaceIndex,
        count: i64,
    },
    HotelSold {
        player_id: PlayerId,
        space_index: SpaceIndex,
        count: i64,
    },
    AuctionStarted {
        space_index: SpaceIndex,
        initiator_player_id: PlayerId,
    },
    AuctionBidPlaced {
        player_id: PlayerId,
        amount: Cash,
    },
    AuctionPlayerDropped {
        player_id: PlayerId,
    },
    AuctionEnded {
        reason: String,
        winner_player_id: Option<PlayerId>,
        winning_bid: Option<Cash>,
        space_index: SpaceIndex,
    },
    TradeProposed {
        initiator_player_id: PlayerId,
        counterparty_player_id: PlayerId,
        offer: TradeBundle,
        request: TradeBundle,
        exchange_index: u32,
    },
    TradeCountered {
        by_player_id: PlayerId,
        offer: TradeBundle,
        request: TradeBundle,
        exchange_index: u32,
    },
    TradeAccepted {
        initiator_player_id: PlayerId,
        counterparty_player_id: PlayerId,
    },
    TradeRejected {
        by_player_id: PlayerId,
    },
    TradeExpired {
        initiator_player_id: PlayerId,
        counterparty_player_id: PlayerId,
    },
    PropertyTransferred {
        from_player_id: PlayerId,
        to_player_id: PlayerId,
        space_index: SpaceIndex,
    },
    LlmDecisionRequested {
        decision_id: String,
        player_id: PlayerId,
        decision_type: DecisionType,
    },
    LlmDecisionResponse {
        decision_id: String,
        player_id: PlayerId,
        action_name: String,
        valid: bool,
        error: Option<String>,
    },
    LlmPublicMessage {
        player_id: PlayerId,
        message: String,
        decision_id: String,
    },
    LlmPrivateThought {
        player_id: PlayerId,
        thought: String,
        decision_id: String,
    },
    GameEnded {
        winner_player_id: PlayerId,
        reason: String,
    },
}

impl EventBody {
    /// Wire name of the event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::GameStarted {} => "GAME_STARTED",
            Self::TurnStarted {} => "TURN_STARTED",
            Self::TurnEnded {} => "TURN_ENDED",
            Self::DiceRolled { .. } => "DICE_ROLLED",
            Self::PlayerMoved { .. } => "PLAYER_MOVED",
            Self::CashChanged { .. } => "CASH_CHANGED",
            Self::PropertyPurchased { .. } => "PROPERTY_PURCHASED",
            Self::RentPaid { .. } => "RENT_PAID",
            Self::SentToJail { .. } => "SENT_TO_JAIL",
            Self::CardDrawn { .. } => "CARD_DRAWN",
            Self::PropertyMortgaged { .. } => "PROPERTY_MORTGAGED",
            Self::PropertyUnmortgaged { .. } => "PROPERTY_UNMORTGAGED",
            Self::HouseBuilt { .. } => "HOUSE_BUILT",
            Self::HouseSold { .. } => "HOUSE_SOLD",
            Self::HotelBuilt { .. } => "HOTEL_BUILT",
            Self::HotelSold { .. } => "HOTEL_SOLD",
            Self::AuctionStarted { .. } => "AUCTION_STARTED",
            Self::AuctionBidPlaced { .. } => "AUCTION_BID_PLACED",
            Self::AuctionPlayerDropped { .. } => "AUCTION_PLAYER_DROPPED",
            Self::AuctionEnded { .. } => "AUCTION_ENDED",
            Self::TradeProposed { .. } => "TRADE_PROPOSED",
            Self::TradeCountered { .. } => "TRADE_COUNTERED",
            Self::TradeAccepted { .. } => "TRADE_ACCEPTED",
            Self::TradeRejected { .. } => "TRADE_REJECTED",
            Self::TradeExpired { .. } => "TRADE_EXPIRED",
            Self::PropertyTransferred { .. } => "PROPERTY_TRANSFERRED",
            Self::LlmDecisionRequested { .. } => "LLM_DECISION_REQUESTED",
            Self::LlmDecisionResponse { .. } => "LLM_DECISION_RESPONSE",
            Self::LlmPublicMessage { .. } => "LLM_PUBLIC_MESSAGE",
            Self::LlmPrivateThought { .. } => "LLM_PRIVATE_THOUGHT",
            Self::GameEnded { .. } => "GAME_ENDED",
        }
    }
}

/// Immutable, numbered record emitted by the engine.
/// `seq` is dense from 0 and `ts_ms` is synthetic
/// (`start_ts_ms + seq * ts_step_ms`), so logs replay byte-identically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub schema_version: String,
    pub run_id: String,
    pub event_id: String,
    pub seq: Seq,
    pub turn_index: TurnIndex,
    pub ts_ms: u64,
    pub actor: Actor,
    #[serde(flatten)]
    pub body: EventBody,
}

impl std::fmt::Display for EventRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {}", self.seq, self.body.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_and_payload() {
        let event = EventRecord {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: "run-1".into(),
            event_id: "run-1-evt-000003".into(),
            seq: 3,
            turn_index: 1,
            ts_ms: 750,
            actor: Actor::player("p1"),
            body: EventBody::CashChanged {
                player_id: "p1".into(),
                delta: -160,
                reason: "buy_property".into(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CASH_CHANGED");
        assert_eq!(json["payload"]["delta"], -160);
        assert_eq!(json["actor"]["kind"], "PLAYER");
        assert_eq!(json["event_id"], "run-1-evt-000003");
    }

    #[test]
    fn empty_payload_variants_serialize_as_objects() {
        let json = serde_json::to_value(EventBody::TurnStarted {}).unwrap();
        assert_eq!(json["type"], "TURN_STARTED");
        assert!(json["payload"].as_object().unwrap().is_empty());
    }

    #[test]
    fn dice_reason_is_omitted_when_absent() {
        let json = serde_json::to_value(EventBody::DiceRolled {
            d1: 2,
            d2: 5,
            is_double: false,
            reason: None,
        })
        .unwrap();
        assert!(json["payload"].get("reason").is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let body = EventBody::AuctionEnded {
            reason: "SOLD".into(),
            winner_player_id: Some("p2".into()),
            winning_bid: Some(10),
            space_index: 14,
        };
        let json = serde_json::to_string(&body).unwrap();
        let back: EventBody = serde_json::from_str(&json).unwrap();
        assert_eq!(back, body);
    }
}
