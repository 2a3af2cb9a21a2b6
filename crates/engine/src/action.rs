use super::error::EngineError;
use super::state::TradeBundle;
use moa_core::*;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Wire name of an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionName {
    BuyProperty,
    StartAuction,
    PayJailFine,
    RollForDoubles,
    UseGetOutOfJailCard,
    BidAuction,
    DropOut,
    ProposeTrade,
    AcceptTrade,
    RejectTrade,
    CounterTrade,
    MortgageProperty,
    UnmortgageProperty,
    BuildHousesOrHotel,
    SellHousesOrHotel,
    EndTurn,
    DeclareBankruptcy,
    #[serde(rename = "NOOP")]
    Noop,
}

impl ActionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuyProperty => "buy_property",
            Self::StartAuction => "start_auction",
            Self::PayJailFine => "pay_jail_fine",
            Self::RollForDoubles => "roll_for_doubles",
            Self::UseGetOutOfJailCard => "use_get_out_of_jail_card",
            Self::BidAuction => "bid_auction",
            Self::DropOut => "drop_out",
            Self::ProposeTrade => "propose_trade",
            Self::AcceptTrade => "accept_trade",
            Self::RejectTrade => "reject_trade",
            Self::CounterTrade => "counter_trade",
            Self::MortgageProperty => "mortgage_property",
            Self::UnmortgageProperty => "unmortgage_property",
            Self::BuildHousesOrHotel => "build_houses_or_hotel",
            Self::SellHousesOrHotel => "sell_houses_or_hotel",
            Self::EndTurn => "end_turn",
            Self::DeclareBankruptcy => "declare_bankruptcy",
            Self::Noop => "NOOP",
        }
    }
}

impl std::fmt::Display for ActionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Building kind in build/sell plans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildKind {
    House,
    Hotel,
}

/// One entry of a build or sell plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    pub space_key: SpaceKey,
    pub kind: BuildKind,
    pub count: i64,
}

/// The wire shape of a player action, as validated against the pending
/// decision. `args` stays raw until the engine parses it into [`Action`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub schema_version: String,
    pub decision_id: String,
    pub action: ActionName,
    #[serde(default = "empty_args")]
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub public_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub private_thought: Option<String>,
}

fn empty_args() -> Value {
    Value::Object(Default::default())
}

impl ActionEnvelope {
    pub fn new(decision_id: impl Into<String>, action: ActionName) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            decision_id: decision_id.into(),
            action,
            args: empty_args(),
            public_message: None,
            private_thought: None,
        }
    }
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }
}

/// Typed action union. Parsing an envelope's args into this collapses
/// all downstream validation to pattern matching.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    BuyProperty,
    StartAuction,
    PayJailFine,
    RollForDoubles,
    UseGetOutOfJailCard,
    BidAuction { bid_amount: Cash },
    DropOut,
    ProposeTrade {
        to_player_id: PlayerId,
        offer: TradeBundle,
        request: TradeBundle,
    },
    AcceptTrade,
    RejectTrade,
    CounterTrade {
        offer: TradeBundle,
        request: TradeBundle,
    },
    MortgageProperty { space_key: SpaceKey },
    UnmortgageProperty { space_key: SpaceKey },
    BuildHousesOrHotel { build_plan: Vec<PlanItem> },
    SellHousesOrHotel { sell_plan: Vec<PlanItem> },
    EndTurn,
    DeclareBankruptcy,
    Noop { reason: String },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BidArgs {
    bid_amount: Cash,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProposeArgs {
    to_player_id: PlayerId,
    offer: TradeBundle,
    request: TradeBundle,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CounterArgs {
    offer: TradeBundle,
    request: TradeBundle,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SpaceKeyArgs {
    space_key: SpaceKey,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildArgs {
    build_plan: Vec<PlanItem>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SellArgs {
    sell_plan: Vec<PlanItem>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoopArgs {
    reason: String,
}

impl Action {
    /// Parses the envelope's raw args into the typed action for its
    /// declared name. Fails when required args are missing or malformed.
    pub fn parse(envelope: &ActionEnvelope) -> Result<Self, EngineError> {
        fn args<T: serde::de::DeserializeOwned>(
            name: ActionName,
            value: &Value,
        ) -> Result<T, EngineError> {
            serde_json::from_value(value.clone())
                .map_err(|e| EngineError::illegal(format!("invalid args for {}: {}", name, e)))
        }
        let value = &envelope.args;
        if !value.is_object() {
            return Err(EngineError::illegal("args must be an object"));
        }
        Ok(match envelope.action {
            ActionName::BuyProperty => Self::BuyProperty,
            ActionName::StartAuction => Self::StartAuction,
            ActionName::PayJailFine => Self::PayJailFine,
            ActionName::RollForDoubles => Self::RollForDoubles,
            ActionName::UseGetOutOfJailCard => Self::UseGetOutOfJailCard,
            ActionName::BidAuction => {
                let BidArgs { bid_amount } = args(envelope.action, value)?;
                Self::BidAuction { bid_amount }
            }
            ActionName::DropOut => Self::DropOut,
            ActionName::ProposeTrade => {
                let ProposeArgs {
                    to_player_id,
                    offer,
                    request,
                } = args(envelope.action, value)?;
                Self::ProposeTrade {
                    to_player_id,
                    offer,
                    request,
                }
            }
            ActionName::AcceptTrade => Self::AcceptTrade,
            ActionName::RejectTrade => Self::RejectTrade,
            ActionName::CounterTrade => {
                let CounterArgs { offer, request } = args(envelope.action, value)?;
                Self::CounterTrade { offer, request }
            }
            ActionName::MortgageProperty => {
                let SpaceKeyArgs { space_key } = args(envelope.action, value)?;
                Self::MortgageProperty { space_key }
            }
            ActionName::UnmortgageProperty => {
                let SpaceKeyArgs { space_key } = args(envelope.action, value)?;
                Self::UnmortgageProperty { space_key }
            }
            ActionName::BuildHousesOrHotel => {
                let BuildArgs { build_plan } = args(envelope.action, value)?;
                if build_plan.is_empty() {
                    return Err(EngineError::illegal("empty build plan"));
                }
                Self::BuildHousesOrHotel { build_plan }
            }
            ActionName::SellHousesOrHotel => {
                let SellArgs { sell_plan } = args(envelope.action, value)?;
                if sell_plan.is_empty() {
                    return Err(EngineError::illegal("empty sell plan"));
                }
                Self::SellHousesOrHotel { sell_plan }
            }
            ActionName::EndTurn => Self::EndTurn,
            ActionName::DeclareBankruptcy => Self::DeclareBankruptcy,
            ActionName::Noop => {
                let NoopArgs { reason } = args(envelope.action, value)?;
                Self::Noop { reason }
            }
        })
    }

    pub fn name(&self) -> ActionName {
        match self {
            Self::BuyProperty => ActionName::BuyProperty,
            Self::StartAuction => ActionName::StartAuction,
            Self::PayJailFine => ActionName::PayJailFine,
            Self::RollForDoubles => ActionName::RollForDoubles,
            Self::UseGetOutOfJailCard => ActionName::UseGetOutOfJailCard,
            Self::BidAuction { .. } => ActionName::BidAuction,
            Self::DropOut => ActionName::DropOut,
            Self::ProposeTrade { .. } => ActionName::ProposeTrade,
            Self::AcceptTrade => ActionName::AcceptTrade,
            Self::RejectTrade => ActionName::RejectTrade,
            Self::CounterTrade { .. } => ActionName::CounterTrade,
            Self::MortgageProperty { .. } => ActionName::MortgageProperty,
            Self::UnmortgageProperty { .. } => ActionName::UnmortgageProperty,
            Self::BuildHousesOrHotel { .. } => ActionName::BuildHousesOrHotel,
            Self::SellHousesOrHotel { .. } => ActionName::SellHousesOrHotel,
            Self::EndTurn => ActionName::EndTurn,
            Self::DeclareBankruptcy => ActionName::DeclareBankruptcy,
            Self::Noop { .. } => ActionName::Noop,
        }
    }
}
