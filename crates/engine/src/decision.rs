use super::action::ActionName;
use super::state::Snapshot;
use super::state::TradeBundle;
use moa_core::*;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

/// Kind of decision the engine is waiting on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionType {
    BuyOrAuctionDecision,
    JailDecision,
    AuctionBidDecision,
    TradeResponseDecision,
    TradeProposeDecision,
    PostTurnActionDecision,
    LiquidationDecision,
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BuyOrAuctionDecision => "BUY_OR_AUCTION_DECISION",
            Self::JailDecision => "JAIL_DECISION",
            Self::AuctionBidDecision => "AUCTION_BID_DECISION",
            Self::TradeResponseDecision => "TRADE_RESPONSE_DECISION",
            Self::TradeProposeDecision => "TRADE_PROPOSE_DECISION",
            Self::PostTurnActionDecision => "POST_TURN_ACTION_DECISION",
            Self::LiquidationDecision => "LIQUIDATION_DECISION",
        };
        write!(f, "{}", name)
    }
}

/// Hints for front-end rendering; never load-bearing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UiHints {
    pub highlight_space_indices: Vec<SpaceIndex>,
}

/// One selectable action with its args contract.
/// Every descriptor accepts `{}` when the action has no required args;
/// `public_message` and `private_thought` are always permitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegalAction {
    pub action: ActionName,
    pub args_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ui_hints: Option<UiHints>,
}

impl LegalAction {
    pub fn new(action: ActionName) -> Self {
        Self {
            action,
            args_schema: args_schema_empty(),
            ui_hints: None,
        }
    }
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.args_schema = schema;
        self
    }
    pub fn with_highlight(mut self, indices: Vec<SpaceIndex>) -> Self {
        self.ui_hints = Some(UiHints {
            highlight_space_indices: indices,
        });
        self
    }
}

/// Schema for actions that take no args.
pub fn args_schema_empty() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
    })
}

/// Schema for actions addressed at one owned space.
pub fn args_schema_space_key() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["space_key"],
        "properties": {"space_key": {"type": "string"}},
    })
}

/// Schema for build/sell plan actions.
pub fn args_schema_plan(field_name: &str) -> Value {
    let plan = json!({
        "type": "array",
        "minItems": 1,
        "items": {
            "type": "object",
            "additionalProperties": false,
            "required": ["space_key", "kind", "count"],
            "properties": {
                "space_key": {"type": "string"},
                "kind": {"type": "string", "enum": ["HOUSE", "HOTEL"]},
                "count": {"type": "integer", "minimum": 1},
            },
        },
    });
    let mut properties = serde_json::Map::new();
    properties.insert(field_name.to_string(), plan);
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [field_name],
        "properties": properties,
    })
}

/// Schema for auction bids; the minimum is the current high bid plus one.
pub fn args_schema_bid(min_bid: Cash) -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["bid_amount"],
        "properties": {"bid_amount": {"type": "integer", "minimum": min_bid}},
    })
}

fn bundle_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["cash", "properties", "get_out_of_jail_cards"],
        "properties": {
            "cash": {"type": "integer", "minimum": 0},
            "properties": {"type": "array", "items": {"type": "string"}},
            "get_out_of_jail_cards": {"type": "integer", "minimum": 0},
        },
    })
}

/// Schema for a full trade proposal.
pub fn args_schema_propose_trade() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["to_player_id", "offer", "request"],
        "properties": {
            "to_player_id": {"type": "string"},
            "offer": bundle_schema(),
            "request": bundle_schema(),
        },
    })
}

/// Schema for a counter-offer (the counterparty is fixed).
pub fn args_schema_counter_trade() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["offer", "request"],
        "properties": {
            "offer": bundle_schema(),
            "request": bundle_schema(),
        },
    })
}

/// Post-turn option lists, by board index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PostTurnOptions {
    pub can_trade_with: Vec<PlayerId>,
    pub mortgageable_space_indices: Vec<SpaceIndex>,
    pub unmortgageable_space_indices: Vec<SpaceIndex>,
    pub buildable_space_indices: Vec<SpaceIndex>,
    pub sellable_building_space_indices: Vec<SpaceIndex>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostTurnContext {
    pub options: PostTurnOptions,
}

/// Liquidation option lists, by board index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LiquidationOptions {
    pub mortgageable_space_indices: Vec<SpaceIndex>,
    pub sellable_building_space_indices: Vec<SpaceIndex>,
}

impl LiquidationOptions {
    pub fn is_exhausted(&self) -> bool {
        self.mortgageable_space_indices.is_empty() && self.sellable_building_space_indices.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiquidationContext {
    pub owed_amount: Cash,
    pub owed_to_player_id: Option<PlayerId>,
    pub reason: String,
    pub shortfall: Cash,
    pub options: LiquidationOptions,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuctionContext {
    pub space_index: SpaceIndex,
    pub space_key: SpaceKey,
    pub current_high_bid: Cash,
    pub min_next_bid: Cash,
    pub current_leader_player_id: Option<PlayerId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeContext {
    pub initiator_player_id: PlayerId,
    pub counterparty_player_id: PlayerId,
    pub exchange_index: u32,
    pub max_exchanges: u32,
    pub offer: TradeBundle,
    pub request: TradeBundle,
}

/// A structured request for one LLM action.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecisionPoint {
    pub schema_version: String,
    pub run_id: String,
    pub decision_id: String,
    pub turn_index: TurnIndex,
    pub player_id: PlayerId,
    pub decision_type: DecisionType,
    pub state: Snapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_turn: Option<PostTurnContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidation: Option<LiquidationContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction: Option<AuctionContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade: Option<TradeContext>,
    pub legal_actions: Vec<LegalAction>,
}

impl DecisionPoint {
    /// True when the named action is selectable for this decision.
    pub fn allows(&self, action: ActionName) -> bool {
        self.legal_actions.iter().any(|entry| entry.action == action)
    }
    pub fn legal_action(&self, action: ActionName) -> Option<&LegalAction> {
        self.legal_actions.iter().find(|entry| entry.action == action)
    }
}
