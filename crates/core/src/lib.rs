//! Core type aliases and constants for the Monopoly LLM arena.
//!
//! This crate provides the foundational types and configuration parameters
//! used throughout the arena workspace.

// ============================================================================
// TYPE ALIASES
// ============================================================================
/// Cash balances, prices, rents, and bids in dollars.
pub type Cash = i64;
/// Board position (0 = GO, 39 = Boardwalk).
pub type SpaceIndex = usize;
/// Turn counter; advances only on END_TURN -> START_TURN.
pub type TurnIndex = u32;
/// Dense event sequence number within a run.
pub type Seq = u64;
/// Stable player identifier from the run configuration (e.g. "p1").
pub type PlayerId = String;
/// Stable external identifier for a board space (uppercase, collapsed).
pub type SpaceKey = String;

// ============================================================================
// GAME PARAMETERS
// ============================================================================
/// Number of players in an arena run.
pub const N_PLAYERS: usize = 4;
/// Number of spaces on the board.
pub const BOARD_SIZE: usize = 40;
/// Starting cash per player.
pub const STARTING_CASH: Cash = 1500;
/// Houses held by the bank at game start.
pub const BANK_HOUSES: i64 = 32;
/// Hotels held by the bank at game start.
pub const BANK_HOTELS: i64 = 12;
/// Fine to leave jail.
pub const JAIL_FINE: Cash = 50;
/// Salary for passing GO through forward movement.
pub const GO_SALARY: Cash = 200;
/// Maximum houses on a single property before a hotel.
pub const HOUSE_LIMIT: i64 = 4;
/// Building value of a hotel for the even-building rule.
pub const HOTEL_HOUSE_EQUIV: i64 = 5;
/// Maximum alternating exchanges in one trade thread.
pub const MAX_TRADE_EXCHANGES: u32 = 5;
/// Consecutive doubles that send the roller to jail.
pub const MAX_DOUBLES_STREAK: u32 = 3;
/// Jail turns before the fine becomes mandatory.
pub const MAX_JAIL_TURNS: u32 = 3;

// ============================================================================
// CARD ASSESSMENTS
// Repairs cards charge per building owned at draw time.
// ============================================================================
/// Chance "general repairs" cost per house.
pub const CHANCE_REPAIR_HOUSE_COST: Cash = 25;
/// Chance "general repairs" cost per hotel.
pub const CHANCE_REPAIR_HOTEL_COST: Cash = 100;
/// Community Chest "street repairs" cost per house.
pub const COMMUNITY_REPAIR_HOUSE_COST: Cash = 40;
/// Community Chest "street repairs" cost per hotel.
pub const COMMUNITY_REPAIR_HOTEL_COST: Cash = 115;
/// Utility rent multiplier when a card forced the move.
pub const UTILITY_CARD_MULTIPLIER: Cash = 10;

// ============================================================================
// PROMPT MEMORY WINDOWS
// Ring-buffer sizes for the per-run conversational memory.
// ============================================================================
/// Public chat messages retained for prompts.
pub const PUBLIC_CHAT_LIMIT: usize = 20;
/// Notable action summaries retained for prompts.
pub const RECENT_ACTIONS_LIMIT: usize = 20;
/// Private thoughts retained per player.
pub const PRIVATE_THOUGHT_LIMIT: usize = 10;

// ============================================================================
// WIRE SCHEMA
// ============================================================================
/// Schema version stamped on every event, decision, and action payload.
pub const SCHEMA_VERSION: &str = "v1";

// ============================================================================
// DEFAULTS
// ============================================================================
/// Default turn limit for an arena run.
pub const DEFAULT_MAX_TURNS: TurnIndex = 200;
/// Default synthetic-timestamp step between events (milliseconds).
pub const DEFAULT_TS_STEP_MS: u64 = 250;
