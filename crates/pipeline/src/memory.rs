use moa_core::*;
use moa_engine::EventBody;
use moa_engine::EventRecord;
use serde_json::Value;
use serde_json::json;
use std::collections::HashMap;
use std::collections::VecDeque;

/// Rolling memory window included in every prompt: recent public chat,
/// notable actions, and each player's own private thoughts. Raw board
/// structure never enters memory; spaces appear as space_keys only.
#[derive(Debug, Default)]
pub struct PromptMemory {
    public_chat: VecDeque<Value>,
    recent_actions: VecDeque<Value>,
    private_thoughts: HashMap<PlayerId, VecDeque<Value>>,
}

impl PromptMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, event: &EventRecord) {
        let turn_index = event.turn_index;
        match &event.body {
            EventBody::LlmPublicMessage {
                player_id, message, ..
            } => {
                push_capped(
                    &mut self.public_chat,
                    json!({
                        "turn_index": turn_index,
                        "from_player_id": player_id,
                        "message": message,
                    }),
                    PUBLIC_CHAT_LIMIT,
                );
            }
            EventBody::LlmPrivateThought {
                player_id, thought, ..
            } => {
                push_capped(
                    self.private_thoughts.entry(player_id.clone()).or_default(),
                    json!({"turn_index": turn_index, "thought": thought}),
                    PRIVATE_THOUGHT_LIMIT,
                );
            }
            body => {
                if let Some(summary) = summarize_action_event(turn_index, body) {
                    push_capped(&mut self.recent_actions, summary, RECENT_ACTIONS_LIMIT);
                }
            }
        }
    }

    pub fn snapshot_for_player(&self, player_id: &str) -> Value {
        json!({
            "public_chat_last_20": self.public_chat.iter().collect::<Vec<_>>(),
            "recent_actions_last_20": self.recent_actions.iter().collect::<Vec<_>>(),
            "your_private_thoughts_last_10": self
                .private_thoughts
                .get(player_id)
                .map(|thoughts| thoughts.iter().collect::<Vec<_>>())
                .unwrap_or_default(),
        })
    }
}

fn push_capped(queue: &mut VecDeque<Value>, value: Value, cap: usize) {
    if queue.len() == cap {
        queue.pop_front();
    }
    queue.push_back(value);
}

/// Actions worth remembering between prompts. Cash changes only surface
/// for the handful of reasons a player would actually recall.
fn summarize_action_event(turn_index: TurnIndex, body: &EventBody) -> Option<Value> {
    match body {
        EventBody::PropertyPurchased {
            player_id,
            space_index,
            price,
        } => Some(json!({
            "turn_index": turn_index,
            "type": "PROPERTY_PURCHASED",
            "player_id": player_id,
            "space_key": moa_board::space_key(*space_index),
            "amount": price,
        })),
        EventBody::RentPaid {
            from_player_id,
            to_player_id,
            amount,
            space_index,
        } => Some(json!({
            "turn_index": turn_index,
            "type": "RENT_PAID",
            "from_player_id": from_player_id,
            "to_player_id": to_player_id,
            "space_key": moa_board::space_key(*space_index),
            "amount": amount,
        })),
        EventBody::SentToJail { player_id, reason } => Some(json!({
            "turn_index": turn_index,
            "type": "SENT_TO_JAIL",
            "player_id": player_id,
            "reason": reason,
        })),
        EventBody::CashChanged {
            player_id,
            delta,
            reason,
        } => {
            let notable = matches!(
                reason.as_str(),
                "PASS_GO" | "TAX_INCOME" | "TAX_LUXURY" | "BANKRUPTCY" | "BANKRUPTCY_ASSETS_TO_BANK"
            );
            notable.then(|| {
                json!({
                    "turn_index": turn_index,
                    "type": "CASH_CHANGED",
                    "player_id": player_id,
                    "delta": delta,
                    "reason": reason,
                })
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moa_engine::Actor;

    fn record(turn_index: TurnIndex, body: EventBody) -> EventRecord {
        EventRecord {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: "run-1".into(),
            event_id: "run-1-evt-000000".into(),
            seq: 0,
            turn_index,
            ts_ms: 0,
            actor: Actor::engine(),
            body,
        }
    }

    #[test]
    fn public_chat_caps_at_twenty() {
        let mut memory = PromptMemory::new();
        for i in 0..25 {
            memory.update(&record(
                i,
                EventBody::LlmPublicMessage {
                    player_id: "p1".into(),
                    message: format!("msg {}", i),
                    decision_id: "d".into(),
                },
            ));
        }
        let snapshot = memory.snapshot_for_player("p1");
        let chat = snapshot["public_chat_last_20"].as_array().unwrap().clone();
        assert_eq!(chat.len(), 20);
        assert_eq!(chat[0]["message"], "msg 5");
    }

    #[test]
    fn private_thoughts_are_per_player() {
        let mut memory = PromptMemory::new();
        memory.update(&record(
            1,
            EventBody::LlmPrivateThought {
                player_id: "p1".into(),
                thought: "buy everything".into(),
                decision_id: "d".into(),
            },
        ));
        assert_eq!(
            memory.snapshot_for_player("p1")["your_private_thoughts_last_10"]
                .as_array()
                .unwrap()
                .len(),
            1
        );
        assert!(memory.snapshot_for_player("p2")["your_private_thoughts_last_10"]
            .as_array()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn rent_summary_uses_space_keys() {
        let mut memory = PromptMemory::new();
        memory.update(&record(
            2,
            EventBody::RentPaid {
                from_player_id: "p1".into(),
                to_player_id: "p2".into(),
                amount: 12,
                space_index: 14,
            },
        ));
        let snapshot = memory.snapshot_for_player("p1");
        assert_eq!(
            snapshot["recent_actions_last_20"][0]["space_key"],
            "VIRGINIA_AVENUE"
        );
    }

    #[test]
    fn mundane_cash_changes_are_ignored() {
        let mut memory = PromptMemory::new();
        memory.update(&record(
            3,
            EventBody::CashChanged {
                player_id: "p1".into(),
                delta: -50,
                reason: "BUILD".into(),
            },
        ));
        assert!(memory.snapshot_for_player("p1")["recent_actions_last_20"]
            .as_array()
            .unwrap()
            .is_empty());
    }
}
