use super::arbiter::ParsedToolCall;
use super::arbiter::parse_tool_call;
use super::arbiter::tool_call_to_action;
use super::arbiter::validate_decision_action;
use super::client::ChatRequest;
use super::client::ChatResult;
use super::client::ModelClient;
use super::client::TransportErrorKind;
use super::config::PlayerConfig;
use super::fallback::fallback_action;
use super::gate::PauseGate;
use super::memory::PromptMemory;
use super::prompt::PromptBundle;
use super::prompt::build_prompt_bundle;
use super::prompt::build_tools;
use moa_core::*;
use moa_engine::ActionEnvelope;
use moa_engine::DecisionMeta;
use moa_engine::DecisionPoint;
use moa_engine::Engine;
use moa_engine::EngineConfig;
use moa_engine::EventBody;
use moa_engine::EventRecord;
use moa_engine::Snapshot;
use moa_telemetry::RunFiles;
use serde_json::Value;
use serde_json::json;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

/// Observer seam for the run coordinator: events, snapshots, decision
/// log entries, and the final summary, in emission order.
#[async_trait::async_trait]
pub trait RunHooks: Send + Sync {
    async fn on_event(&self, _event: &EventRecord) {}
    async fn on_snapshot(&self, _snapshot: &Snapshot) {}
    async fn on_decision(&self, _entry: &Value) {}
    async fn on_summary(&self, _summary: &Value) {}
}

/// Hooks that observe nothing (headless runs write telemetry only).
pub struct NoHooks;

#[async_trait::async_trait]
impl RunHooks for NoHooks {}

/// One remote attempt, fully recorded for the decision log.
#[derive(Clone, Debug)]
pub struct DecisionAttempt {
    pub prompt_messages: Vec<Value>,
    pub prompt_payload: Option<Value>,
    pub prompt_payload_raw: Option<String>,
    pub raw_response: Option<Value>,
    pub assistant_content: Option<String>,
    pub parsed_tool_call: Option<ParsedToolCall>,
    pub validation_errors: Vec<String>,
    pub request_id: Option<String>,
    pub status_code: Option<u16>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub request_start_ms: u64,
    pub response_end_ms: u64,
    pub latency_ms: u64,
}

impl DecisionAttempt {
    fn to_log(&self) -> Value {
        json!({
            "prompt_messages": self.prompt_messages,
            "prompt_payload": self.prompt_payload,
            "prompt_payload_raw": self.prompt_payload_raw,
            "raw_response": self.raw_response,
            "assistant_content": self.assistant_content,
            "parsed_tool_call": self.parsed_tool_call.as_ref().map(|c| c.to_value()),
            "validation_errors": self.validation_errors,
            "openrouter_request_id": self.request_id,
            "openrouter_status_code": self.status_code,
            "error_type": self.error_type,
            "error_message": self.error_message,
            "request_start_ms": self.request_start_ms,
            "response_end_ms": self.response_end_ms,
            "latency_ms": self.latency_ms,
        })
    }
}

/// Final disposition of one decision: the action that will be applied
/// (model-produced or fallback) plus the attempt trail.
#[derive(Clone, Debug)]
pub struct DecisionOutcome {
    pub action: ActionEnvelope,
    pub meta: DecisionMeta,
    pub attempts: Vec<DecisionAttempt>,
    pub retry_used: bool,
    pub fallback_used: bool,
    pub fallback_reason: Option<String>,
}

impl DecisionOutcome {
    fn new(
        action: ActionEnvelope,
        attempts: Vec<DecisionAttempt>,
        retry_used: bool,
        fallback_used: bool,
        fallback_reason: Option<String>,
    ) -> Self {
        let meta = if fallback_used {
            DecisionMeta {
                valid: false,
                error: Some(format!(
                    "fallback:{}",
                    fallback_reason.as_deref().unwrap_or("unknown")
                )),
            }
        } else {
            DecisionMeta::default()
        };
        Self {
            action,
            meta,
            attempts,
            retry_used,
            fallback_used,
            fallback_reason,
        }
    }
}

/// Remote control for a running pipeline: cooperative pause/resume and
/// stop requests, safe to call from any task.
#[derive(Clone, Debug, Default)]
pub struct RunnerHandle {
    gate: PauseGate,
    stop: Arc<Mutex<Option<String>>>,
}

impl RunnerHandle {
    pub fn pause(&self) {
        self.gate.pause();
    }
    pub fn resume(&self) {
        self.gate.resume();
    }
    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }
    /// Records a stop reason and releases the gate so a paused runner
    /// can wind down.
    pub fn request_stop(&self, reason: impl Into<String>) {
        *self.stop.lock().expect("stop flag") = Some(reason.into());
        self.gate.resume();
    }
    fn take_stop(&self) -> Option<String> {
        self.stop.lock().expect("stop flag").take()
    }
}

/// Drives one run: alternates engine advancement with decision
/// arbitration, writes telemetry, and feeds hooks in event order.
pub struct LlmRunner {
    run_id: String,
    engine: Engine,
    players: HashMap<PlayerId, PlayerConfig>,
    client: Arc<dyn ModelClient>,
    run_files: Option<RunFiles>,
    memory: PromptMemory,
    handle: RunnerHandle,
    applied: HashSet<String>,
    event_delay: Duration,
}

impl LlmRunner {
    pub fn new(
        seed: u64,
        players: Vec<PlayerConfig>,
        run_id: impl Into<String>,
        client: Arc<dyn ModelClient>,
        run_files: Option<RunFiles>,
        max_turns: TurnIndex,
    ) -> anyhow::Result<Self> {
        if players.len() != N_PLAYERS {
            anyhow::bail!("exactly {} players are required for LLM runs", N_PLAYERS);
        }
        let run_id = run_id.into();
        let seats: Vec<(PlayerId, String)> = players
            .iter()
            .map(|p| (p.player_id.clone(), p.name.clone()))
            .collect();
        let engine = Engine::new(
            EngineConfig::new(seed, run_id.clone(), seats).with_max_turns(max_turns),
        );
        Ok(Self {
            run_id,
            engine,
            players: players
                .into_iter()
                .map(|p| (p.player_id.clone(), p))
                .collect(),
            client,
            run_files,
            memory: PromptMemory::new(),
            handle: RunnerHandle::default(),
            applied: HashSet::new(),
            event_delay: Duration::ZERO,
        })
    }

    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    pub fn handle(&self) -> RunnerHandle {
        self.handle.clone()
    }
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
    pub fn get_snapshot(&self) -> Snapshot {
        self.engine.get_snapshot()
    }
    /// Scenario access to the underlying engine (forced dice, seeded
    /// ownership). Not used on the run path.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Runs the game to completion. Pipeline failures become fallback
    /// actions; only engine-contract violations propagate.
    pub async fn run<H: RunHooks>(&mut self, hooks: &H) -> anyhow::Result<()> {
        loop {
            self.forward_stop();
            self.handle.gate.wait().await;
            self.forward_stop();

            let step = self.engine.advance_until_decision(1);
            if step.events.is_empty() && step.decision.is_none() {
                break;
            }
            for event in &step.events {
                self.handle.gate.wait().await;
                self.emit(event, hooks).await?;
            }
            if let Some(decision) = step.decision {
                self.handle.gate.wait().await;
                let outcome = self.resolve_decision(&decision, hooks).await?;
                // Synchronous barrier: nothing commits while paused.
                self.handle.gate.wait().await;
                self.forward_stop();
                let outcome = self.validate_after_pause(&decision, outcome);

                if !self.applied.insert(decision.decision_id.clone()) {
                    anyhow::bail!("decision {} already applied", decision.decision_id);
                }
                let result = self
                    .engine
                    .apply_action(&outcome.action, Some(outcome.meta.clone()))
                    .map_err(|error| anyhow::anyhow!("{}", error))?;

                if let Some(run_files) = &self.run_files {
                    run_files.write_action(&json!({
                        "decision_id": decision.decision_id,
                        "actor_player_id": decision.player_id,
                        "decision_type": decision.decision_type,
                        "turn_index": decision.turn_index,
                        "action": outcome.action,
                    }))?;
                }
                let entry = self.resolved_log_entry(&decision, &outcome, &result.events);
                self.write_decision(&entry, hooks).await?;

                for event in &result.events {
                    self.handle.gate.wait().await;
                    self.emit(event, hooks).await?;
                }
                if self.engine.is_game_over() {
                    break;
                }
                continue;
            }
            if self.engine.is_game_over() {
                break;
            }
        }

        if self.event_delay > Duration::ZERO {
            tokio::time::sleep(self.event_delay).await;
        }
        let summary = match &self.run_files {
            Some(run_files) => moa_telemetry::build_summary(run_files),
            None => serde_json::to_value(self.engine.build_summary())?,
        };
        if let Some(run_files) = &self.run_files {
            run_files.write_summary(&summary)?;
        }
        hooks.on_summary(&summary).await;
        Ok(())
    }

    fn forward_stop(&mut self) {
        if let Some(reason) = self.handle.take_stop() {
            self.engine.request_stop(reason);
        }
    }

    async fn emit<H: RunHooks>(&mut self, event: &EventRecord, hooks: &H) -> anyhow::Result<()> {
        self.memory.update(event);
        if let Some(run_files) = &self.run_files {
            run_files.write_event(event)?;
        }
        hooks.on_event(event).await;
        if matches!(
            event.body,
            EventBody::LlmDecisionRequested { .. }
                | EventBody::TurnEnded {}
                | EventBody::GameEnded { .. }
        ) {
            let snapshot = self.engine.get_snapshot();
            if let Some(run_files) = &self.run_files {
                run_files.write_snapshot(&snapshot)?;
            }
            hooks.on_snapshot(&snapshot).await;
        }
        Ok(())
    }

    async fn write_decision<H: RunHooks>(&self, entry: &Value, hooks: &H) -> anyhow::Result<()> {
        if let Some(run_files) = &self.run_files {
            run_files.write_decision(entry)?;
        }
        hooks.on_decision(entry).await;
        Ok(())
    }

    /// The per-decision attempt tree: one unconditional attempt, one
    /// retry on validation failure, fallback otherwise.
    async fn resolve_decision<H: RunHooks>(
        &mut self,
        decision: &DecisionPoint,
        hooks: &H,
    ) -> anyhow::Result<DecisionOutcome> {
        let player = self
            .players
            .get(&decision.player_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown player {}", decision.player_id))?;
        let bundle = build_prompt_bundle(decision, &player, &self.memory, None)?;
        let tools = build_tools(&bundle.user_payload["decision"]);
        let mut artifacts: Vec<ArtifactAttempt> = Vec::new();

        if tools.is_empty() {
            log::warn!("[pipeline {}] no tools for {}", self.run_id, decision.decision_id);
            let outcome = DecisionOutcome::new(
                fallback_action(decision),
                Vec::new(),
                false,
                true,
                Some("unknown".to_string()),
            );
            artifacts.push(ArtifactAttempt {
                index: 0,
                bundle: bundle.clone(),
                result: None,
                attempt: None,
                action: None,
                errors: vec!["No tools generated".to_string()],
                error_reason: Some("no_tools".to_string()),
            });
            self.write_artifacts(decision, &tools, &artifacts, &outcome);
            return Ok(outcome);
        }

        let request_start_ms = now_ms();
        let started = started_log_entry(decision, &player, request_start_ms, &bundle);
        self.write_decision(&started, hooks).await?;

        let result = self
            .client
            .create_chat_completion(ChatRequest {
                model: player.model_id.clone(),
                messages: bundle.messages.clone(),
                tools: tools.clone(),
                reasoning: player.reasoning.clone(),
            })
            .await;
        let response_end_ms = now_ms();
        let mut attempt =
            attempt_from_response(&bundle, &result, request_start_ms, response_end_ms, false);
        let (action, errors, error_reason) = build_action_from_attempt(decision, &mut attempt);
        artifacts.push(ArtifactAttempt {
            index: 0,
            bundle: bundle.clone(),
            result: Some(result.clone()),
            attempt: Some(attempt.clone()),
            action: action.clone(),
            errors: attempt.validation_errors.clone(),
            error_reason: error_reason.map(str::to_string),
        });

        if !result.ok && result.error_type != Some(TransportErrorKind::InvalidJson) {
            let outcome = DecisionOutcome::new(
                fallback_action(decision),
                vec![attempt],
                false,
                true,
                Some(map_transport_reason(result.error_type)),
            );
            self.write_artifacts(decision, &tools, &artifacts, &outcome);
            return Ok(outcome);
        }

        if !errors.is_empty() {
            let retry_bundle = build_prompt_bundle(decision, &player, &self.memory, Some(&errors))?;
            let retry_start_ms = now_ms();
            let retry_result = self
                .client
                .create_chat_completion(ChatRequest {
                    model: player.model_id.clone(),
                    messages: retry_bundle.messages.clone(),
                    tools: tools.clone(),
                    reasoning: player.reasoning.clone(),
                })
                .await;
            let retry_end_ms = now_ms();
            let mut retry_attempt = attempt_from_response(
                &retry_bundle,
                &retry_result,
                retry_start_ms,
                retry_end_ms,
                true,
            );
            let (retry_action, retry_errors, retry_reason) =
                build_action_from_attempt(decision, &mut retry_attempt);
            artifacts.push(ArtifactAttempt {
                index: 1,
                bundle: retry_bundle,
                result: Some(retry_result.clone()),
                attempt: Some(retry_attempt.clone()),
                action: retry_action.clone(),
                errors: retry_attempt.validation_errors.clone(),
                error_reason: retry_reason.map(str::to_string),
            });
            let attempts = vec![attempt, retry_attempt];

            let outcome = if !retry_result.ok
                && retry_result.error_type != Some(TransportErrorKind::InvalidJson)
            {
                DecisionOutcome::new(
                    fallback_action(decision),
                    attempts,
                    true,
                    true,
                    Some(map_transport_reason(retry_result.error_type)),
                )
            } else if !retry_errors.is_empty() {
                DecisionOutcome::new(
                    fallback_action(decision),
                    attempts,
                    true,
                    true,
                    Some(retry_reason.unwrap_or("invalid_action").to_string()),
                )
            } else {
                let action = retry_action.unwrap_or_else(|| fallback_action(decision));
                DecisionOutcome::new(action, attempts, true, false, None)
            };
            self.write_artifacts(decision, &tools, &artifacts, &outcome);
            return Ok(outcome);
        }

        let action = action.unwrap_or_else(|| fallback_action(decision));
        let outcome = DecisionOutcome::new(action, vec![attempt], false, false, None);
        self.write_artifacts(decision, &tools, &artifacts, &outcome);
        Ok(outcome)
    }

    /// Defends against state drift across a pause: the chosen action is
    /// re-validated immediately before commit.
    fn validate_after_pause(
        &self,
        decision: &DecisionPoint,
        outcome: DecisionOutcome,
    ) -> DecisionOutcome {
        if validate_decision_action(decision, &outcome.action).is_empty() {
            return outcome;
        }
        log::warn!(
            "[pipeline {}] action invalidated across pause for {}",
            self.run_id,
            decision.decision_id
        );
        DecisionOutcome::new(
            fallback_action(decision),
            outcome.attempts,
            outcome.retry_used,
            true,
            Some("invalid_action_after_pause".to_string()),
        )
    }

    /// Artifact writes are best-effort and ordered after the log
    /// appends; a failed blob never fails the decision.
    fn write_artifacts(
        &self,
        decision: &DecisionPoint,
        tools: &[Value],
        artifacts: &[ArtifactAttempt],
        outcome: &DecisionOutcome,
    ) {
        let Some(run_files) = &self.run_files else {
            return;
        };
        for artifact in artifacts {
            let parsed = json!({
                "schema_version": SCHEMA_VERSION,
                "decision_id": decision.decision_id,
                "attempt_index": artifact.index,
                "parsed_tool_call": artifact
                    .attempt
                    .as_ref()
                    .and_then(|a| a.parsed_tool_call.as_ref())
                    .map(|c| c.to_value()),
                "validation_errors": artifact.errors,
                "error_reason": artifact.error_reason,
                "tool_action": artifact.action,
                "openrouter_request_id": artifact.attempt.as_ref().and_then(|a| a.request_id.clone()),
                "openrouter_status_code": artifact.attempt.as_ref().and_then(|a| a.status_code),
                "openrouter_error_type": artifact.attempt.as_ref().and_then(|a| a.error_type.clone()),
                "final_action": outcome.action,
                "retry_used": outcome.retry_used,
                "fallback_used": outcome.fallback_used,
                "fallback_reason": outcome.fallback_reason,
            });
            let response = response_payload(artifact.result.as_ref());
            if let Err(error) = run_files.write_prompt_artifacts(
                &decision.decision_id,
                artifact.index,
                Some(&artifact.bundle.system_prompt),
                Some(&artifact.bundle.user_content),
                Some(&json!(tools)),
                Some(&response),
                Some(&parsed),
            ) {
                log::warn!(
                    "[pipeline {}] artifact write failed for {}: {}",
                    self.run_id,
                    decision.decision_id,
                    error
                );
            }
        }
    }

    fn resolved_log_entry(
        &self,
        decision: &DecisionPoint,
        outcome: &DecisionOutcome,
        action_events: &[EventRecord],
    ) -> Value {
        let player = &self.players[&decision.player_id];
        let mut entry = base_log_entry(decision, player, "decision_resolved");
        entry["attempts"] = json!(outcome
            .attempts
            .iter()
            .map(DecisionAttempt::to_log)
            .collect::<Vec<_>>());
        entry["retry_used"] = json!(outcome.retry_used);
        entry["fallback_used"] = json!(outcome.fallback_used);
        entry["fallback_reason"] = json!(outcome.fallback_reason);
        entry["final_action"] = json!(outcome.action);
        if outcome.fallback_used {
            entry["fallback_action"] = json!(outcome.action);
        }
        entry["applied"] = json!(true);
        entry["emitted_event_ids"] =
            json!(action_events.iter().map(|e| &e.event_id).collect::<Vec<_>>());
        entry["emitted_event_types"] = json!(action_events
            .iter()
            .map(|e| e.body.type_name())
            .collect::<Vec<_>>());
        let seqs: Vec<Seq> = action_events.iter().map(|e| e.seq).collect();
        if let (Some(first), Some(last)) = (seqs.iter().min(), seqs.iter().max()) {
            entry["emitted_event_seq_start"] = json!(first);
            entry["emitted_event_seq_end"] = json!(last);
        }
        let start = outcome.attempts.first().map(|a| a.request_start_ms);
        let end = outcome.attempts.last().map(|a| a.response_end_ms);
        if let Some(start) = start {
            entry["request_start_ms"] = json!(start);
        }
        if let Some(end) = end {
            entry["response_end_ms"] = json!(end);
        }
        if let (Some(start), Some(end)) = (start, end) {
            entry["latency_ms"] = json!(end.saturating_sub(start));
        }
        entry
    }
}

#[derive(Clone, Debug)]
struct ArtifactAttempt {
    index: usize,
    bundle: PromptBundle,
    result: Option<ChatResult>,
    attempt: Option<DecisionAttempt>,
    action: Option<ActionEnvelope>,
    errors: Vec<String>,
    error_reason: Option<String>,
}

fn base_log_entry(decision: &DecisionPoint, player: &PlayerConfig, phase: &str) -> Value {
    let mut entry = json!({
        "phase": phase,
        "run_id": decision.run_id,
        "turn_index": decision.turn_index,
        "decision_id": decision.decision_id,
        "decision_type": decision.decision_type,
        "player_id": decision.player_id,
        "player_name": player.name,
        "model_id": player.model_id,
        "model_display_name": player.model_display_name,
        "timestamp_ms": now_ms(),
    });
    if let Some(reasoning) = &player.reasoning {
        entry["reasoning"] = reasoning.clone();
    }
    entry
}

fn started_log_entry(
    decision: &DecisionPoint,
    player: &PlayerConfig,
    request_start_ms: u64,
    bundle: &PromptBundle,
) -> Value {
    let mut entry = base_log_entry(decision, player, "decision_started");
    entry["request_start_ms"] = json!(request_start_ms);
    entry["prompt_messages"] = json!(bundle.messages);
    entry["prompt_payload"] = bundle.user_payload.clone();
    entry["prompt_payload_raw"] = json!(bundle.user_content);
    entry
}

fn attempt_from_response(
    bundle: &PromptBundle,
    result: &ChatResult,
    request_start_ms: u64,
    response_end_ms: u64,
    include_prompt: bool,
) -> DecisionAttempt {
    let mut validation_errors = Vec::new();
    let mut parsed_tool_call = None;
    let mut assistant_content = None;
    match &result.response_json {
        None => validation_errors.push(
            result
                .error
                .clone()
                .unwrap_or_else(|| "OpenRouter error".to_string()),
        ),
        Some(response) => {
            assistant_content = response["choices"][0]["message"]["content"]
                .as_str()
                .map(str::to_string);
            match parse_tool_call(response) {
                Ok(call) => parsed_tool_call = Some(call),
                Err(error) => validation_errors.push(error),
            }
        }
    }
    DecisionAttempt {
        prompt_messages: if include_prompt {
            bundle.messages.clone()
        } else {
            Vec::new()
        },
        prompt_payload: include_prompt.then(|| bundle.user_payload.clone()),
        prompt_payload_raw: include_prompt.then(|| bundle.user_content.clone()),
        raw_response: result.response_json.clone(),
        assistant_content,
        parsed_tool_call,
        validation_errors,
        request_id: result.request_id.clone(),
        status_code: result.status_code,
        error_type: result.error_type.map(|kind| kind.as_str().to_string()),
        error_message: result.error.clone(),
        request_start_ms,
        response_end_ms,
        latency_ms: response_end_ms.saturating_sub(request_start_ms),
    }
}

/// Parses, maps, and validates one attempt's tool call. Returns the
/// candidate action, the errors, and the more specific failure tag.
fn build_action_from_attempt(
    decision: &DecisionPoint,
    attempt: &mut DecisionAttempt,
) -> (Option<ActionEnvelope>, Vec<String>, Option<&'static str>) {
    let Some(tool_call) = attempt.parsed_tool_call.clone() else {
        if attempt.validation_errors.is_empty() {
            attempt.validation_errors.push("Missing tool call".to_string());
        }
        return (
            None,
            attempt.validation_errors.clone(),
            Some("invalid_tool_call"),
        );
    };
    let Some(envelope) = tool_call_to_action(decision, &tool_call) else {
        let error = "Unable to map tool call to action".to_string();
        attempt.validation_errors.push(error.clone());
        return (None, vec![error], Some("invalid_tool_call"));
    };
    let errors = validate_decision_action(decision, &envelope);
    if !errors.is_empty() {
        attempt.validation_errors.extend(errors.clone());
        return (Some(envelope), errors, Some("invalid_action"));
    }
    (Some(envelope), Vec::new(), None)
}

fn response_payload(result: Option<&ChatResult>) -> Value {
    match result {
        None => json!({
            "ok": false,
            "status_code": null,
            "request_id": null,
            "error_type": "no_request",
            "error": "No chat completion request was made",
        }),
        Some(result) => match &result.response_json {
            Some(response) => response.clone(),
            None => json!({
                "ok": false,
                "status_code": result.status_code,
                "request_id": result.request_id,
                "error_type": result.error_type.map(|kind| kind.as_str()),
                "error": result.error,
            }),
        },
    }
}

fn map_transport_reason(kind: Option<TransportErrorKind>) -> String {
    match kind {
        Some(TransportErrorKind::NoApiKey) => "no_api_key".to_string(),
        Some(TransportErrorKind::Http429) => "openrouter_http_429".to_string(),
        Some(TransportErrorKind::Http5xx) => "openrouter_http_5xx".to_string(),
        Some(TransportErrorKind::Http4xx) => "openrouter_http_4xx".to_string(),
        Some(TransportErrorKind::NetworkError) => "openrouter_network_error".to_string(),
        Some(TransportErrorKind::InvalidJson) => "invalid_tool_call".to_string(),
        None => "unknown".to_string(),
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
