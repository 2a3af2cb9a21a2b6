use super::jsonl::append_jsonl;
use anyhow::Context;
use anyhow::Result;
use moa_core::TurnIndex;
use moa_engine::EventRecord;
use moa_engine::Snapshot;
use serde_json::Value;
use std::path::Path;
use std::path::PathBuf;

/// Handles to one run's telemetry directory.
#[derive(Debug, Clone)]
pub struct RunFiles {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub events_path: PathBuf,
    pub decisions_path: PathBuf,
    pub actions_path: PathBuf,
    pub snapshots_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub summary_path: PathBuf,
}

/// Creates the run directory layout and returns handles to it.
pub fn init_run_files(runs_dir: &Path, run_id: &str) -> Result<RunFiles> {
    let run_dir = runs_dir.join(run_id);
    let snapshots_dir = run_dir.join("state");
    let prompts_dir = run_dir.join("prompts");
    std::fs::create_dir_all(&snapshots_dir)
        .with_context(|| format!("create {}", snapshots_dir.display()))?;
    Ok(RunFiles {
        run_id: run_id.to_string(),
        run_dir: run_dir.clone(),
        events_path: run_dir.join("events.jsonl"),
        decisions_path: run_dir.join("decisions.jsonl"),
        actions_path: run_dir.join("actions.jsonl"),
        snapshots_dir,
        prompts_dir,
        summary_path: run_dir.join("summary.json"),
    })
}

impl RunFiles {
    pub fn write_event(&self, event: &EventRecord) -> Result<()> {
        append_jsonl(&self.events_path, event)
    }

    pub fn write_decision(&self, entry: &Value) -> Result<()> {
        append_jsonl(&self.decisions_path, entry)
    }

    pub fn write_action(&self, entry: &Value) -> Result<()> {
        append_jsonl(&self.actions_path, entry)
    }

    /// Writes a snapshot keyed by turn index. When the same turn
    /// snapshots more than once (chained decisions), later files get a
    /// numeric variant suffix so nothing is overwritten.
    pub fn write_snapshot(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.snapshots_dir)
            .with_context(|| format!("create {}", self.snapshots_dir.display()))?;
        let path = self.snapshot_path(snapshot.turn_index);
        let body = serde_json::to_string(snapshot).context("serialize snapshot")?;
        std::fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    fn snapshot_path(&self, turn_index: TurnIndex) -> PathBuf {
        let base = self.snapshots_dir.join(format!("turn_{:04}.json", turn_index));
        if !base.exists() {
            return base;
        }
        for variant in 1.. {
            let path = self
                .snapshots_dir
                .join(format!("turn_{:04}_{}.json", turn_index, variant));
            if !path.exists() {
                return path;
            }
        }
        unreachable!("variant search terminates")
    }

    pub fn write_summary(&self, summary: &Value) -> Result<()> {
        let body = serde_json::to_string(summary).context("serialize summary")?;
        std::fs::write(&self.summary_path, body)
            .with_context(|| format!("write {}", self.summary_path.display()))?;
        Ok(())
    }

    /// Writes the five per-attempt prompt artifacts. Attempt 0 carries
    /// no suffix; retries append `_retry{N}` to the decision prefix.
    pub fn write_prompt_artifacts(
        &self,
        decision_id: &str,
        attempt_index: usize,
        system_prompt: Option<&str>,
        user_payload_raw: Option<&str>,
        tools: Option<&Value>,
        response: Option<&Value>,
        parsed: Option<&Value>,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.prompts_dir)
            .with_context(|| format!("create {}", self.prompts_dir.display()))?;
        let prefix = prompt_file_prefix(decision_id, attempt_index);
        if let Some(system_prompt) = system_prompt {
            std::fs::write(self.prompts_dir.join(format!("{}_system.txt", prefix)), system_prompt)?;
        }
        if let Some(raw) = user_payload_raw {
            std::fs::write(self.prompts_dir.join(format!("{}_user.json", prefix)), raw)?;
        }
        if let Some(tools) = tools {
            std::fs::write(
                self.prompts_dir.join(format!("{}_tools.json", prefix)),
                serde_json::to_string(tools)?,
            )?;
        }
        if let Some(response) = response {
            std::fs::write(
                self.prompts_dir.join(format!("{}_response.json", prefix)),
                serde_json::to_string(response)?,
            )?;
        }
        if let Some(parsed) = parsed {
            std::fs::write(
                self.prompts_dir.join(format!("{}_parsed.json", prefix)),
                serde_json::to_string(parsed)?,
            )?;
        }
        Ok(())
    }
}

fn prompt_file_prefix(decision_id: &str, attempt_index: usize) -> String {
    let safe: String = decision_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = safe.trim_matches(['.', '_', '-']);
    let safe = if safe.is_empty() { "decision" } else { safe };
    if attempt_index == 0 {
        format!("decision_{}", safe)
    } else {
        format!("decision_{}_retry{}", safe, attempt_index)
    }
}
