//! End-to-end engine runs against a scripted HTTP client and a real
//! file-backed checkpoint store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use waymark_core::{parse_playbook_str, DocumentFormat, Playbook};
use waymark_exec::{
    CheckpointManager, Engine, EngineConfig, EngineError, Event, FinalStatus, HttpClient,
    HttpError, HttpRequestParts, HttpResponseParts, Observer, RunOptions, RunReport,
};
use waymark_store::{CheckpointStore, FileCheckpointStore, NoopCheckpointStore};

/// Responds per scripted status sequence for each path; once a sequence is
/// exhausted its last status repeats. Unknown paths answer 200. Bodies echo
/// the path and the per-path hit number so extractions have something real
/// to pick at.
struct MockHttp {
    routes: Mutex<HashMap<String, Vec<u16>>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl MockHttp {
    fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            hits: Mutex::new(HashMap::new()),
        }
    }

    fn script(&self, path: &str, statuses: &[u16]) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), statuses.to_vec());
    }

    fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl HttpClient for MockHttp {
    async fn send(
        &self,
        req: HttpRequestParts,
        _timeout: Duration,
    ) -> Result<HttpResponseParts, HttpError> {
        let path = req.url.path().to_string();
        let hit = {
            let mut hits = self.hits.lock().unwrap();
            let n = hits.entry(path.clone()).or_insert(0);
            *n += 1;
            *n
        };
        let status = {
            let routes = self.routes.lock().unwrap();
            match routes.get(&path) {
                Some(seq) if !seq.is_empty() => *seq.get(hit - 1).unwrap_or(seq.last().unwrap()),
                _ => 200,
            }
        };
        let body = serde_json::to_vec(&json!({ "value": path, "hit": hit })).unwrap();
        Ok(HttpResponseParts {
            status,
            headers: BTreeMap::new(),
            body,
        })
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

#[async_trait]
impl Observer for Recorder {
    async fn notify(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn playbook(yaml: &str) -> Playbook {
    parse_playbook_str(yaml, DocumentFormat::Yaml).expect("valid playbook yaml")
}

const KEY: &str = "engine-test";

async fn run_with(
    pb: &Playbook,
    http: Arc<MockHttp>,
    store: Arc<dyn CheckpointStore>,
    opts: RunOptions,
) -> (Result<RunReport, EngineError>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let engine = Engine::new(
        http,
        recorder.clone(),
        CheckpointManager::new(store, KEY),
        EngineConfig {
            max_parallel: 8,
            shutdown_grace: Duration::from_millis(200),
        },
    );
    (engine.run(pb, opts).await, recorder)
}

#[tokio::test]
async fn retries_until_success_then_moves_on() {
    // Scenario: step 1 fails twice with 503, succeeds on the third attempt;
    // step 2 runs exactly once afterwards.
    let pb = playbook(
        r#"
sessions:
  api:
    base_url: http://mock.test
    retry:
      max_retries: 3
      backoff_factor: 0.01
phases:
  - name: main
    steps:
      - name: flaky
        session: api
        request: { method: get, endpoint: /flaky }
      - name: follow
        session: api
        request: { method: get, endpoint: /follow }
"#,
    );
    let http = Arc::new(MockHttp::new());
    http.script("/flaky", &[503, 503, 200]);

    let (result, events) = run_with(
        &pb,
        http.clone(),
        Arc::new(NoopCheckpointStore),
        RunOptions::default(),
    )
    .await;

    let report = result.unwrap();
    assert_eq!(report.status, FinalStatus::Success);
    assert_eq!(report.steps_run, 2);
    assert_eq!(http.hits("/flaky"), 3);
    assert_eq!(http.hits("/follow"), 1);
    assert_eq!(
        events.count(|e| matches!(e, Event::RetryScheduled { .. })),
        2
    );
}

#[tokio::test]
async fn parallel_iteration_stores_per_id_and_appends() {
    // Scenario: three parallel iterations, each appending to a shared list
    // and writing its own per-id variable. A later abort freezes the store
    // into a checkpoint we can inspect.
    let pb = playbook(
        r#"
sessions:
  api:
    base_url: http://mock.test
    retry: { max_retries: 0 }
phases:
  - name: collect
    steps:
      - name: fan
        session: api
        iterate: "id in [1, 2, 3]"
        parallel: true
        request: { method: get, endpoint: "/items/{{ id }}" }
        store:
          results+: body.value
          "result_{{ id }}": body.hit
  - name: boom
    steps:
      - name: explode
        session: api
        request: { method: get, endpoint: /boom }
"#,
    );
    let http = Arc::new(MockHttp::new());
    http.script("/boom", &[500]);

    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::new(tmp.path()));
    let (result, _) = run_with(&pb, http.clone(), store.clone(), RunOptions::default()).await;

    assert_eq!(result.unwrap().status, FinalStatus::Aborted);
    for id in 1..=3 {
        assert_eq!(http.hits(&format!("/items/{id}")), 1);
    }

    let cp = store.load(KEY).await.unwrap().expect("checkpoint present");
    assert_eq!(cp.phase_index, 1);
    assert_eq!(cp.step_index, -1);

    let results = cp.variables["results"].as_array().unwrap();
    let mut paths: Vec<&str> = results.iter().map(|v| v.as_str().unwrap()).collect();
    paths.sort_unstable();
    assert_eq!(paths, ["/items/1", "/items/2", "/items/3"]);
    for id in 1..=3 {
        assert_eq!(cp.variables[&format!("result_{id}")], json!(1));
    }
}

#[tokio::test]
async fn abort_on_first_step_leaves_phase_uncommitted_and_resume_reruns_it() {
    // Scenario: step 0 aborts the run; the checkpoint records {phase 0,
    // step -1}, and resuming starts back at step 0 rather than skipping it.
    let pb = playbook(
        r#"
sessions:
  api:
    base_url: http://mock.test
    retry: { max_retries: 0 }
phases:
  - name: only
    steps:
      - name: first
        session: api
        request: { method: get, endpoint: /first }
      - name: second
        session: api
        request: { method: get, endpoint: /second }
"#,
    );
    let http = Arc::new(MockHttp::new());
    http.script("/first", &[500, 200]);

    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::new(tmp.path()));

    let (result, _) = run_with(&pb, http.clone(), store.clone(), RunOptions::default()).await;
    assert_eq!(result.unwrap().status, FinalStatus::Aborted);
    assert_eq!(http.hits("/first"), 1);
    assert_eq!(http.hits("/second"), 0);

    let cp = store.load(KEY).await.unwrap().expect("checkpoint present");
    assert_eq!((cp.phase_index, cp.step_index), (0, -1));

    let (result, _) = run_with(&pb, http.clone(), store.clone(), RunOptions::default()).await;
    assert_eq!(result.unwrap().status, FinalStatus::Success);
    assert_eq!(http.hits("/first"), 2);
    assert_eq!(http.hits("/second"), 1);

    // Successful completion clears the slot.
    assert!(store.load(KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn resume_skips_committed_steps() {
    let pb = playbook(
        r#"
sessions:
  api:
    base_url: http://mock.test
    retry: { max_retries: 0 }
phases:
  - name: main
    steps:
      - name: a
        session: api
        request: { method: get, endpoint: /a }
      - name: b
        session: api
        request: { method: get, endpoint: /b }
"#,
    );
    let http = Arc::new(MockHttp::new());
    http.script("/b", &[500, 200]);

    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::new(tmp.path()));

    let (result, _) = run_with(&pb, http.clone(), store.clone(), RunOptions::default()).await;
    assert_eq!(result.unwrap().status, FinalStatus::Aborted);
    let cp = store.load(KEY).await.unwrap().unwrap();
    assert_eq!((cp.phase_index, cp.step_index), (0, 0));

    let (result, _) = run_with(&pb, http.clone(), store.clone(), RunOptions::default()).await;
    assert_eq!(result.unwrap().status, FinalStatus::Success);
    // The committed step did not run again.
    assert_eq!(http.hits("/a"), 1);
    assert_eq!(http.hits("/b"), 2);
}

#[tokio::test]
async fn no_resume_discards_the_checkpoint() {
    let pb = playbook(
        r#"
sessions:
  api:
    base_url: http://mock.test
    retry: { max_retries: 0 }
phases:
  - name: main
    steps:
      - name: a
        session: api
        request: { method: get, endpoint: /a }
      - name: b
        session: api
        request: { method: get, endpoint: /b }
"#,
    );
    let http = Arc::new(MockHttp::new());
    http.script("/b", &[500, 200]);

    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::new(tmp.path()));

    let (result, _) = run_with(&pb, http.clone(), store.clone(), RunOptions::default()).await;
    assert_eq!(result.unwrap().status, FinalStatus::Aborted);

    let opts = RunOptions {
        resume: false,
        ..RunOptions::default()
    };
    let (result, _) = run_with(&pb, http.clone(), store.clone(), opts).await;
    assert_eq!(result.unwrap().status, FinalStatus::Success);
    // Fresh start: the already-committed step ran again.
    assert_eq!(http.hits("/a"), 2);
}

#[tokio::test]
async fn resume_against_an_edited_playbook_is_fatal() {
    let original = r#"
sessions:
  api:
    base_url: http://mock.test
    retry: { max_retries: 0 }
phases:
  - name: main
    steps:
      - name: a
        session: api
        request: { method: get, endpoint: /a }
      - name: b
        session: api
        request: { method: get, endpoint: /b }
"#;
    let pb = playbook(original);
    let http = Arc::new(MockHttp::new());
    http.script("/b", &[500]);

    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::new(tmp.path()));
    let (result, _) = run_with(&pb, http.clone(), store.clone(), RunOptions::default()).await;
    assert_eq!(result.unwrap().status, FinalStatus::Aborted);

    let edited = playbook(&original.replace("/b", "/c"));
    let (result, _) = run_with(&edited, http, store, RunOptions::default()).await;
    assert!(matches!(result, Err(EngineError::CheckpointMismatch(_))));
}

#[tokio::test]
async fn ignored_failures_count_without_stopping_the_run() {
    let pb = playbook(
        r#"
sessions:
  api:
    base_url: http://mock.test
    retry: { max_retries: 0 }
phases:
  - name: main
    steps:
      - name: shaky
        session: api
        on_error: ignore
        request: { method: get, endpoint: /shaky }
      - name: follow
        session: api
        request: { method: get, endpoint: /follow }
"#,
    );
    let http = Arc::new(MockHttp::new());
    // 404 is terminal, no retry.
    http.script("/shaky", &[404]);

    let (result, _) = run_with(
        &pb,
        http.clone(),
        Arc::new(NoopCheckpointStore),
        RunOptions::default(),
    )
    .await;

    let report = result.unwrap();
    assert_eq!(
        report.status,
        FinalStatus::PartialFailure {
            ignored_failures: 1
        }
    );
    assert_eq!(http.hits("/shaky"), 1);
    assert_eq!(http.hits("/follow"), 1);
}

#[tokio::test]
async fn open_breaker_fails_later_iterations_without_io() {
    // One failure trips the breaker; the remaining sequential iterations are
    // refused at the gate and never reach the network.
    let pb = playbook(
        r#"
sessions:
  api:
    base_url: http://mock.test
    retry: { max_retries: 0 }
    circuit_breaker:
      failure_threshold: 1
      reset_seconds: 60
phases:
  - name: main
    steps:
      - name: fan
        session: api
        iterate: "id in [1, 2, 3]"
        on_error: ignore
        request: { method: get, endpoint: "/items/{{ id }}" }
"#,
    );
    let http = Arc::new(MockHttp::new());
    for id in 1..=3 {
        http.script(&format!("/items/{id}"), &[500]);
    }

    let (result, events) = run_with(
        &pb,
        http.clone(),
        Arc::new(NoopCheckpointStore),
        RunOptions::default(),
    )
    .await;

    let report = result.unwrap();
    assert_eq!(
        report.status,
        FinalStatus::PartialFailure {
            ignored_failures: 3
        }
    );
    assert_eq!(http.total_hits(), 1);
    assert_eq!(
        events.count(|e| matches!(e, Event::BreakerTransition { .. })),
        1
    );
}

#[tokio::test]
async fn auth_rejected_half_open_call_frees_the_slot() {
    // A zero reset window makes the open breaker immediately due for its
    // half-open trial. That trial comes back 401, which says nothing about
    // the server's health; the slot must go back up for grabs so the next
    // step can reach the network instead of being refused forever.
    let pb = playbook(
        r#"
sessions:
  api:
    base_url: http://mock.test
    retry: { max_retries: 0 }
    circuit_breaker:
      failure_threshold: 1
      reset_seconds: 0.0
phases:
  - name: main
    steps:
      - name: trip
        session: api
        on_error: ignore
        request: { method: get, endpoint: /trip }
      - name: denied
        session: api
        on_error: ignore
        request: { method: get, endpoint: /denied }
      - name: after
        session: api
        request: { method: get, endpoint: /after }
"#,
    );
    let http = Arc::new(MockHttp::new());
    http.script("/trip", &[500]);
    http.script("/denied", &[401]);

    let (result, events) = run_with(
        &pb,
        http.clone(),
        Arc::new(NoopCheckpointStore),
        RunOptions::default(),
    )
    .await;

    let report = result.unwrap();
    assert_eq!(
        report.status,
        FinalStatus::PartialFailure {
            ignored_failures: 2
        }
    );
    assert_eq!(http.hits("/denied"), 1);
    assert_eq!(http.hits("/after"), 1);
    // closed->open, open->half_open, half_open->closed. Re-admitting after
    // the freed slot stays within half-open and is not a transition.
    assert_eq!(
        events.count(|e| matches!(e, Event::BreakerTransition { .. })),
        3
    );
}

#[tokio::test]
async fn cancelled_handle_stops_the_run_before_any_request() {
    let pb = playbook(
        r#"
sessions:
  api:
    base_url: http://mock.test
phases:
  - name: main
    steps:
      - name: a
        session: api
        request: { method: get, endpoint: /a }
"#,
    );
    let http = Arc::new(MockHttp::new());

    let opts = RunOptions::default();
    opts.cancel.cancel();
    let (result, _) = run_with(&pb, http.clone(), Arc::new(NoopCheckpointStore), opts).await;

    assert_eq!(result.unwrap().status, FinalStatus::Aborted);
    assert_eq!(http.total_hits(), 0);
}

#[tokio::test]
async fn cancellation_is_not_swallowed_by_on_error_ignore() {
    // An interrupt must end the run even when every step tolerates its own
    // failures.
    let pb = playbook(
        r#"
sessions:
  api:
    base_url: http://mock.test
phases:
  - name: main
    steps:
      - name: tolerant
        session: api
        on_error: ignore
        request: { method: get, endpoint: /tolerant }
"#,
    );
    let http = Arc::new(MockHttp::new());

    let opts = RunOptions::default();
    opts.cancel.cancel();
    let (result, _) = run_with(&pb, http.clone(), Arc::new(NoopCheckpointStore), opts).await;

    assert_eq!(result.unwrap().status, FinalStatus::Aborted);
    assert_eq!(http.total_hits(), 0);
}

#[tokio::test]
async fn iterate_collection_can_come_from_seeded_variables() {
    let pb = playbook(
        r#"
sessions:
  api:
    base_url: http://mock.test
phases:
  - name: main
    steps:
      - name: fan
        session: api
        iterate: "id in ids"
        request: { method: get, endpoint: "/users/{{ id }}" }
"#,
    );
    let http = Arc::new(MockHttp::new());

    let opts = RunOptions {
        variables: BTreeMap::from([("ids".to_string(), json!([7, 9]))]),
        ..RunOptions::default()
    };
    let (result, _) = run_with(&pb, http.clone(), Arc::new(NoopCheckpointStore), opts).await;

    assert_eq!(result.unwrap().status, FinalStatus::Success);
    assert_eq!(http.hits("/users/7"), 1);
    assert_eq!(http.hits("/users/9"), 1);
}

#[tokio::test]
async fn empty_iterate_collection_succeeds_without_requests() {
    let pb = playbook(
        r#"
sessions:
  api:
    base_url: http://mock.test
phases:
  - name: main
    steps:
      - name: fan
        session: api
        iterate: "id in []"
        request: { method: get, endpoint: "/users/{{ id }}" }
"#,
    );
    let http = Arc::new(MockHttp::new());

    let (result, _) = run_with(
        &pb,
        http.clone(),
        Arc::new(NoopCheckpointStore),
        RunOptions::default(),
    )
    .await;

    assert_eq!(result.unwrap().status, FinalStatus::Success);
    assert_eq!(http.total_hits(), 0);
}

#[tokio::test]
async fn unresolved_template_aborts_before_any_request() {
    let pb = playbook(
        r#"
sessions:
  api:
    base_url: http://mock.test
phases:
  - name: main
    steps:
      - name: typo
        session: api
        request: { method: get, endpoint: "/users/{{ user_idd }}" }
"#,
    );
    let http = Arc::new(MockHttp::new());

    let (result, _) = run_with(
        &pb,
        http.clone(),
        Arc::new(NoopCheckpointStore),
        RunOptions::default(),
    )
    .await;

    assert_eq!(result.unwrap().status, FinalStatus::Aborted);
    assert_eq!(http.total_hits(), 0);
}
