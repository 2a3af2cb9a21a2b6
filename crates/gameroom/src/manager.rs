use super::broadcaster::Broadcaster;
use super::broadcaster::Subscriber;
use super::protocol::Frame;
use moa_core::*;
use moa_engine::EventBody;
use moa_engine::EventRecord;
use moa_engine::Snapshot;
use moa_pipeline::LlmRunner;
use moa_pipeline::ModelClient;
use moa_pipeline::PlayerConfig;
use moa_pipeline::RunHooks;
use moa_pipeline::RunnerHandle;
use moa_telemetry::init_run_files;
use serde_json::Value;
use serde_json::json;
use sha1::Digest;
use sha1::Sha1;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Builds the model client for each new run. Tests substitute scripted
/// policies; production uses the OpenRouter client.
pub type ClientFactory = dyn Fn() -> Arc<dyn ModelClient> + Send + Sync;

#[derive(Default)]
struct ActiveRun {
    run_id: Option<String>,
    handle: Option<RunnerHandle>,
    task: Option<JoinHandle<()>>,
    players: Vec<PlayerConfig>,
    paused: bool,
}

impl ActiveRun {
    fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

/// State shared with the runner task's hooks.
struct Shared {
    broadcaster: Broadcaster,
    snapshot: StdMutex<Option<Snapshot>>,
    run_id: StdMutex<Option<String>>,
    seq: StdMutex<Option<Seq>>,
    turn_index: StdMutex<Option<TurnIndex>>,
}

/// The single-run controller: owns the current run, the pause switch,
/// and the subscriber registry. Telemetry is written by the runner;
/// this layer only coordinates and fans out.
pub struct RunManager {
    runs_dir: PathBuf,
    max_turns: TurnIndex,
    client_factory: Box<ClientFactory>,
    active: Mutex<ActiveRun>,
    shared: Arc<Shared>,
}

impl RunManager {
    pub fn new(runs_dir: impl Into<PathBuf>, client_factory: Box<ClientFactory>) -> Self {
        Self {
            runs_dir: runs_dir.into(),
            max_turns: DEFAULT_MAX_TURNS,
            client_factory,
            active: Mutex::new(ActiveRun::default()),
            shared: Arc::new(Shared {
                broadcaster: Broadcaster::new(),
                snapshot: StdMutex::new(None),
                run_id: StdMutex::new(None),
                seq: StdMutex::new(None),
                turn_index: StdMutex::new(None),
            }),
        }
    }

    pub fn with_max_turns(mut self, max_turns: TurnIndex) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Starts a run. A start identical to the active run is an
    /// idempotent no-op; a different request stops the current run
    /// first. Exactly four players are required.
    pub async fn start_run(
        &self,
        seed: u64,
        players: Vec<PlayerConfig>,
    ) -> anyhow::Result<String> {
        let mut active = self.active.lock().await;
        if players.len() != N_PLAYERS {
            anyhow::bail!("exactly {} players are required for LLM runs", N_PLAYERS);
        }
        let run_id = generate_run_id(seed, &players);
        if active.is_running() && active.run_id.as_deref() == Some(&run_id) {
            log::debug!("[gameroom] start_run({}) is already active", run_id);
            return Ok(run_id);
        }
        if active.is_running() {
            self.stop_locked(&mut active).await;
        } else {
            active.task = None;
        }

        let run_files = init_run_files(&self.runs_dir, &run_id)?;
        let mut runner = LlmRunner::new(
            seed,
            players.clone(),
            run_id.clone(),
            (self.client_factory)(),
            Some(run_files.clone()),
            self.max_turns,
        )?;
        let handle = runner.handle();

        *self.shared.run_id.lock().expect("run id") = Some(run_id.clone());
        *self.shared.seq.lock().expect("seq") = None;
        let initial = runner.get_snapshot();
        *self.shared.turn_index.lock().expect("turn") = Some(initial.turn_index);
        *self.shared.snapshot.lock().expect("snapshot") = Some(initial.clone());
        run_files.write_snapshot(&initial)?;
        self.shared
            .broadcaster
            .broadcast(&Frame::snapshot(initial));

        let shared = self.shared.clone();
        let task_run_id = run_id.clone();
        let task = tokio::spawn(async move {
            let hooks = BroadcastHooks {
                shared: shared.clone(),
            };
            if let Err(error) = runner.run(&hooks).await {
                log::error!("[gameroom {}] runner failed: {}", task_run_id, error);
                shared.broadcaster.broadcast(&Frame::error(
                    "runner failed",
                    json!({"run_id": task_run_id, "error": error.to_string()}),
                ));
            }
        });

        log::info!("[gameroom] started run {}", run_id);
        active.run_id = Some(run_id.clone());
        active.handle = Some(handle);
        active.task = Some(task);
        active.players = players;
        active.paused = false;
        Ok(run_id)
    }

    /// Requests engine stop, cancels the runner task, and awaits it.
    pub async fn stop_run(&self) {
        let mut active = self.active.lock().await;
        self.stop_locked(&mut active).await;
    }

    async fn stop_locked(&self, active: &mut ActiveRun) {
        if let Some(handle) = active.handle.take() {
            handle.request_stop("STOPPED");
            handle.resume();
        }
        if let Some(task) = active.task.take() {
            task.abort();
            let _ = task.await;
        }
        active.run_id = None;
        active.players.clear();
        active.paused = false;
        log::debug!("[gameroom] run stopped");
    }

    /// Gates engine advancement and pipeline commit. Idempotent.
    pub async fn pause(&self) {
        let mut active = self.active.lock().await;
        if !active.is_running() || active.paused {
            return;
        }
        active.paused = true;
        if let Some(handle) = &active.handle {
            handle.pause();
        }
    }

    /// Releases the gate. Idempotent, also when nothing runs.
    pub async fn resume(&self) {
        let mut active = self.active.lock().await;
        if !active.is_running() {
            active.paused = false;
            return;
        }
        if !active.paused {
            return;
        }
        active.paused = false;
        if let Some(handle) = &active.handle {
            handle.resume();
        }
    }

    pub async fn get_status(&self) -> Value {
        let active = self.active.lock().await;
        json!({
            "running": active.is_running(),
            "paused": active.paused,
            "run_id": active.run_id,
            "turn_index": *self.shared.turn_index.lock().expect("turn"),
            "connected_clients": self.shared.broadcaster.len(),
            "players": active.players.iter().map(|p| p.to_status()).collect::<Vec<_>>(),
        })
    }

    pub fn get_snapshot(&self) -> Option<Snapshot> {
        self.shared.snapshot.lock().expect("snapshot").clone()
    }

    /// Registers a subscriber; HELLO and the latest snapshot are
    /// queued ahead of any run traffic.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        let run_id = self.shared.run_id.lock().expect("run id").clone();
        let mut greetings = vec![Frame::hello(run_id)];
        if let Some(snapshot) = self.get_snapshot() {
            greetings.push(Frame::snapshot(snapshot));
        }
        self.shared.broadcaster.subscribe(subscriber, greetings);
    }

    pub fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber>) {
        self.shared.broadcaster.unsubscribe(subscriber);
    }
}

struct BroadcastHooks {
    shared: Arc<Shared>,
}

#[async_trait::async_trait]
impl RunHooks for BroadcastHooks {
    async fn on_event(&self, event: &EventRecord) {
        *self.shared.seq.lock().expect("seq") = Some(event.seq);
        *self.shared.turn_index.lock().expect("turn") = Some(event.turn_index);
        self.shared
            .broadcaster
            .broadcast(&Frame::event(event.clone()));
        if matches!(event.body, EventBody::GameEnded { .. }) {
            log::info!("[gameroom {}] game ended", event.run_id);
        }
    }
    async fn on_snapshot(&self, snapshot: &Snapshot) {
        *self.shared.snapshot.lock().expect("snapshot") = Some(snapshot.clone());
        self.shared
            .broadcaster
            .broadcast(&Frame::snapshot(snapshot.clone()));
    }
}

/// Deterministic run id: a stable hash of the seed and the players'
/// identity-relevant configuration.
fn generate_run_id(seed: u64, players: &[PlayerConfig]) -> String {
    let blob = json!({
        "seed": seed,
        "players": players.iter().map(|p| json!({
            "player_id": p.player_id,
            "name": p.name,
            "model_id": p.model_id,
            "system_prompt": p.system_prompt,
        })).collect::<Vec<_>>(),
    });
    let digest = Sha1::digest(blob.to_string().as_bytes());
    format!("llm-{}-{}", seed, &hex::encode(digest)[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use moa_pipeline::ChatRequest;
    use moa_pipeline::ChatResult;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    /// Answers with the first listed tool and empty args, after an
    /// optional delay (so lifecycle tests can observe a live run).
    struct FirstToolClient {
        delay: Duration,
    }

    impl FirstToolClient {
        fn instant() -> Self {
            Self {
                delay: Duration::ZERO,
            }
        }
        fn slow() -> Self {
            Self {
                delay: Duration::from_millis(50),
            }
        }
    }

    #[async_trait::async_trait]
    impl ModelClient for FirstToolClient {
        async fn create_chat_completion(&self, request: ChatRequest) -> ChatResult {
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            let name = request.tools[0]["function"]["name"].as_str().unwrap();
            let response = json!({
                "id": "resp-1",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call-1",
                            "type": "function",
                            "function": {"name": name, "arguments": "{}"},
                        }],
                    }
                }],
            });
            ChatResult::success(200, response, None)
        }
    }

    struct Collector {
        frames: StdMutex<Vec<Value>>,
    }

    #[async_trait::async_trait]
    impl Subscriber for Collector {
        async fn deliver(&self, frame: &Frame) -> anyhow::Result<()> {
            self.frames.lock().unwrap().push(frame.to_json());
            Ok(())
        }
    }

    fn players() -> Vec<PlayerConfig> {
        (1..=4)
            .map(|i| {
                PlayerConfig::new(format!("p{}", i), format!("P{}", i), "openai/gpt-oss-120b")
            })
            .collect()
    }

    fn manager(dir: &std::path::Path, constructions: Arc<AtomicUsize>, slow: bool) -> RunManager {
        RunManager::new(
            dir,
            Box::new(move || {
                constructions.fetch_add(1, Ordering::SeqCst);
                if slow {
                    Arc::new(FirstToolClient::slow())
                } else {
                    Arc::new(FirstToolClient::instant())
                }
            }),
        )
        .with_max_turns(4)
    }

    #[tokio::test]
    async fn start_run_is_idempotent_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let constructions = Arc::new(AtomicUsize::new(0));
        let manager = manager(dir.path(), constructions.clone(), true);
        // Slow client: the run is still alive for the second start.
        let run_id = manager.start_run(101, players()).await.unwrap();
        manager.pause().await;

        let second = manager.start_run(101, players()).await.unwrap();
        assert_eq!(second, run_id);
        assert_eq!(constructions.load(Ordering::SeqCst), 1);

        let status = manager.get_status().await;
        assert_eq!(status["running"], true);
        assert_eq!(status["run_id"], json!(run_id));
        manager.stop_run().await;
    }

    #[tokio::test]
    async fn different_request_stops_and_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let constructions = Arc::new(AtomicUsize::new(0));
        let manager = manager(dir.path(), constructions.clone(), true);
        let first = manager.start_run(101, players()).await.unwrap();
        manager.pause().await;
        let second = manager.start_run(202, players()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(constructions.load(Ordering::SeqCst), 2);
        manager.stop_run().await;
    }

    #[tokio::test]
    async fn run_ids_are_deterministic() {
        assert_eq!(
            generate_run_id(7, &players()),
            generate_run_id(7, &players())
        );
        assert_ne!(
            generate_run_id(7, &players()),
            generate_run_id(8, &players())
        );
    }

    #[tokio::test]
    async fn rejects_wrong_player_count() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), Arc::new(AtomicUsize::new(0)), false);
        let short: Vec<PlayerConfig> = players().into_iter().take(2).collect();
        assert!(manager.start_run(1, short).await.is_err());
    }

    #[tokio::test]
    async fn subscriber_greeted_then_sees_events_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), Arc::new(AtomicUsize::new(0)), false);
        let collector = Arc::new(Collector {
            frames: StdMutex::new(Vec::new()),
        });
        manager.subscribe(collector.clone());
        manager.start_run(55, players()).await.unwrap();

        // Wait for the run to finish.
        for _ in 0..200 {
            if manager.get_status().await["running"] == false {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let frames = collector.frames.lock().unwrap();
        assert_eq!(frames[0]["type"], "HELLO");
        let seqs: Vec<u64> = frames
            .iter()
            .filter(|f| f["type"] == "EVENT")
            .map(|f| f["payload"]["seq"].as_u64().unwrap())
            .collect();
        assert!(!seqs.is_empty());
        for window in seqs.windows(2) {
            assert!(window[0] < window[1]);
        }
        assert!(frames.iter().any(|f| f["type"] == "SNAPSHOT"));
        assert!(frames.iter().all(|f| f["type"] != "ERROR"));
        // The terminal snapshot follows the GAME_ENDED event broadcast.
        let ended_at = frames
            .iter()
            .position(|f| f["payload"]["type"] == "GAME_ENDED")
            .expect("game ended frame");
        assert!(frames[ended_at + 1..]
            .iter()
            .any(|f| f["type"] == "SNAPSHOT"));

        manager.stop_run().await;
    }

    #[tokio::test]
    async fn pause_and_resume_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), Arc::new(AtomicUsize::new(0)), true);
        // Safe with no run active.
        manager.pause().await;
        manager.resume().await;

        manager.start_run(77, players()).await.unwrap();
        manager.pause().await;
        manager.pause().await;
        assert_eq!(manager.get_status().await["paused"], true);
        manager.resume().await;
        manager.resume().await;
        assert_eq!(manager.get_status().await["paused"], false);
        manager.stop_run().await;
    }

    #[tokio::test]
    async fn stop_run_cancels_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), Arc::new(AtomicUsize::new(0)), true);
        manager.start_run(88, players()).await.unwrap();
        manager.pause().await;
        manager.stop_run().await;
        let status = manager.get_status().await;
        assert_eq!(status["running"], false);
        assert_eq!(status["run_id"], json!(null));
    }
}
