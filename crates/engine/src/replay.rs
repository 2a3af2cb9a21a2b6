use super::action::ActionEnvelope;
use super::engine::Engine;
use super::engine::EngineConfig;
use super::error::EngineError;
use super::event::EventRecord;

/// Re-executes recorded action envelopes against a fresh engine.
/// Identical configuration and actions reproduce the original event
/// sequence byte for byte.
pub fn replay_actions(
    config: EngineConfig,
    actions: &[ActionEnvelope],
    assert_decision_ids: bool,
) -> Result<Vec<EventRecord>, EngineError> {
    let mut engine = Engine::new(config);
    let mut events = Vec::new();

    for envelope in actions {
        let step = engine.advance_until_decision(1);
        events.extend(step.events);
        let Some(decision) = step.decision else {
            break;
        };
        if assert_decision_ids && decision.decision_id != envelope.decision_id {
            return Err(EngineError::illegal("decision id mismatch during replay"));
        }
        let step = engine.apply_action(envelope, None)?;
        events.extend(step.events);
        if engine.is_game_over() {
            break;
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::super::action::ActionName;
    use super::super::decision::DecisionPoint;
    use super::*;
    use moa_core::PlayerId;

    fn players() -> Vec<(PlayerId, String)> {
        vec![
            ("p1".into(), "P1".into()),
            ("p2".into(), "P2".into()),
            ("p3".into(), "P3".into()),
            ("p4".into(), "P4".into()),
        ]
    }

    fn config(seed: u64) -> EngineConfig {
        EngineConfig::new(seed, "run-replay", players())
            .with_max_turns(12)
            .with_timestamps(0, 1)
    }

    /// Records a short run with a trivial policy, returning the actions
    /// taken and all events emitted.
    fn record(seed: u64) -> (Vec<ActionEnvelope>, Vec<EventRecord>) {
        let mut engine = Engine::new(config(seed));
        let mut actions = Vec::new();
        let mut events = Vec::new();
        while !engine.is_game_over() {
            let step = engine.advance_until_decision(1);
            let stalled = step.events.is_empty() && step.decision.is_none();
            events.extend(step.events);
            match step.decision {
                Some(decision) => {
                    let action = policy(&decision);
                    let step = engine.apply_action(&action, None).unwrap();
                    events.extend(step.events);
                    actions.push(action);
                }
                None if stalled => break,
                None => {}
            }
        }
        (actions, events)
    }

    fn policy(decision: &DecisionPoint) -> ActionEnvelope {
        let name = [
            ActionName::BuyProperty,
            ActionName::StartAuction,
            ActionName::EndTurn,
            ActionName::RollForDoubles,
            ActionName::PayJailFine,
            ActionName::UseGetOutOfJailCard,
            ActionName::DropOut,
            ActionName::RejectTrade,
            ActionName::DeclareBankruptcy,
        ]
        .into_iter()
        .find(|name| decision.allows(*name))
        .unwrap_or(decision.legal_actions[0].action);
        ActionEnvelope::new(&decision.decision_id, name)
    }

    #[test]
    fn replay_reproduces_the_event_log() {
        let (actions, original) = record(202);
        let replayed = replay_actions(config(202), &actions, true).unwrap();
        // The recorded log may have trailing engine-only events after
        // the last decision; replay stops once actions are exhausted.
        assert!(replayed.len() <= original.len());
        assert_eq!(&original[..replayed.len()], &replayed[..]);
    }

    #[test]
    fn replay_rejects_mismatched_decision_ids() {
        let (mut actions, _) = record(99);
        if actions.is_empty() {
            return;
        }
        actions[0].decision_id = "run-replay-dec-999999".to_string();
        assert!(replay_actions(config(99), &actions, true).is_err());
    }

    #[test]
    fn identical_seeds_identical_logs() {
        let (_, a) = record(42);
        let (_, b) = record(42);
        assert_eq!(a, b);
    }
}
