#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Integration tests use unwrap for brevity

//! End-to-end tests: a real `sh` child, the real Discord webhook client, and
//! an in-process HTTP receiver standing in for Discord.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::timeout;

use factorio_notify::config::{NotifyConfig, SourceConfig};
use factorio_notify::orchestrator::{self, Outcome, RunError, run_supervised, run_tail};
use factorio_notify::{StreamWatcher, SupervisorError};
use factorio_notify_core::{DiscordWebhook, EventExtractor};

const WAIT: Duration = Duration::from_secs(15);

type Received = Arc<Mutex<Vec<Value>>>;

/// Webhook receiver on an ephemeral port; answers every POST with `status`.
async fn spawn_receiver(status: StatusCode) -> (String, Received) {
    let received: Received = Arc::default();
    let app = axum::Router::new()
        .route(
            "/api/webhooks/42/secret",
            post(
                move |State(seen): State<Received>, Json(body): Json<Value>| async move {
                    seen.lock().unwrap().push(body);
                    status
                },
            ),
        )
        .with_state(Arc::clone(&received));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/api/webhooks/42/secret"), received)
}

fn contents(received: &Received) -> Vec<String> {
    received
        .lock()
        .unwrap()
        .iter()
        .map(|body| body["content"].as_str().unwrap().to_string())
        .collect()
}

fn watcher(url: &str) -> StreamWatcher<DiscordWebhook> {
    let webhook = DiscordWebhook::new(url.parse().unwrap()).unwrap();
    StreamWatcher::new(
        EventExtractor::new().unwrap(),
        Arc::new(webhook),
        "Factorio Server Watcher",
    )
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

#[tokio::test]
async fn one_matching_line_one_notification_exit_zero() {
    let (url, received) = spawn_receiver(StatusCode::NO_CONTENT).await;
    let (_tx, rx) = watch::channel(false);

    let outcome = timeout(
        WAIT,
        run_supervised(
            sh("echo 'Loading mods'; \
                echo '2024-01-01 10:00:00 [JOIN] Alice joined the game'; \
                echo '2024-01-01 10:00:01 [JOIN] Alice left the game'; \
                exit 0"),
            Duration::from_secs(5),
            watcher(&url),
            tokio::io::sink(),
            rx,
        ),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(outcome.exit.code().unwrap(), 0);
    assert!(!outcome.exit.forced);
    let stats = outcome.stats.unwrap();
    assert_eq!(stats.lines, 3);
    assert_eq!(stats.delivered, 1);

    let bodies = received.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["username"], "Factorio Server Watcher");
    assert_eq!(
        bodies[0]["content"],
        "2024-01-01 10:00:00 [JOIN] Alice joined the game"
    );
}

#[tokio::test]
async fn child_exit_code_is_propagated() {
    let (url, _received) = spawn_receiver(StatusCode::NO_CONTENT).await;
    let (_tx, rx) = watch::channel(false);

    let outcome = timeout(
        WAIT,
        run_supervised(
            sh("exit 42"),
            Duration::from_secs(5),
            watcher(&url),
            tokio::io::sink(),
            rx,
        ),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(outcome.exit.code().unwrap(), 42);
}

#[tokio::test]
async fn interrupted_child_reports_its_own_code_and_output_is_drained() {
    let (url, received) = spawn_receiver(StatusCode::NO_CONTENT).await;
    let (tx, rx) = watch::channel(false);

    let script = "trap 'echo \"2024-01-01 10:00:09 [LEAVE] Alice left the game\"; exit 4' INT; \
                  echo '2024-01-01 10:00:00 [JOIN] Alice joined the game'; \
                  while true; do sleep 0.05; done";
    let run = tokio::spawn(run_supervised(
        sh(script),
        Duration::from_secs(10),
        watcher(&url),
        tokio::io::sink(),
        rx,
    ));

    // Wait for the join line to be delivered, which also means the trap is set.
    timeout(WAIT, async {
        while received.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    tx.send(true).unwrap();

    let outcome = timeout(WAIT, run).await.unwrap().unwrap().unwrap();
    assert!(!outcome.exit.forced);
    assert_eq!(outcome.exit.code().unwrap(), 4);
    assert_eq!(
        contents(&received),
        vec![
            "2024-01-01 10:00:00 [JOIN] Alice joined the game",
            "2024-01-01 10:00:09 [LEAVE] Alice left the game",
        ]
    );
}

#[tokio::test]
async fn wedged_child_is_killed_and_reported_as_abnormal() {
    let (url, _received) = spawn_receiver(StatusCode::NO_CONTENT).await;
    let (tx, rx) = watch::channel(false);

    // exec so the killed process is the one holding stdout.
    let run = tokio::spawn(run_supervised(
        sh("trap '' INT; exec sleep 30"),
        Duration::from_millis(300),
        watcher(&url),
        tokio::io::sink(),
        rx,
    ));
    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(true).unwrap();

    let outcome = timeout(WAIT, run).await.unwrap().unwrap().unwrap();
    assert!(outcome.exit.forced);
    assert!(matches!(
        outcome.exit.code(),
        Err(SupervisorError::Signaled { .. })
    ));
}

#[tokio::test]
async fn background_process_holding_stdout_does_not_block_return() {
    let (url, received) = spawn_receiver(StatusCode::NO_CONTENT).await;
    let (_tx, rx) = watch::channel(false);

    // The backgrounded sleep inherits stdout and outlives the shell.
    let outcome = timeout(
        Duration::from_secs(8),
        run_supervised(
            sh("echo '2024-01-01 10:00:00 [JOIN] Alice joined the game'; \
                sleep 30 & exit 0"),
            Duration::from_secs(1),
            watcher(&url),
            tokio::io::sink(),
            rx,
        ),
    )
    .await
    .expect("run must return within the grace period after exit")
    .unwrap();

    assert_eq!(outcome.exit.code().unwrap(), 0);
    assert!(!outcome.exit.forced);
    assert!(outcome.stats.is_none());
    assert_eq!(
        contents(&received),
        vec!["2024-01-01 10:00:00 [JOIN] Alice joined the game"]
    );
}

#[tokio::test]
async fn killed_wrapper_with_surviving_child_does_not_block_return() {
    let (url, _received) = spawn_receiver(StatusCode::NO_CONTENT).await;
    let (tx, rx) = watch::channel(false);

    // No exec: killing the shell leaves the sleep holding stdout.
    let run = tokio::spawn(run_supervised(
        sh("trap '' INT; sleep 30; true"),
        Duration::from_millis(300),
        watcher(&url),
        tokio::io::sink(),
        rx,
    ));
    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(true).unwrap();

    let outcome = timeout(Duration::from_secs(8), run)
        .await
        .expect("run must return within twice the grace period")
        .unwrap()
        .unwrap();
    assert!(outcome.exit.forced);
    assert!(matches!(
        outcome.exit.code(),
        Err(SupervisorError::Signaled { .. })
    ));
    assert!(outcome.stats.is_none());
}

#[tokio::test]
async fn failed_deliveries_do_not_stop_supervision() {
    let (url, received) = spawn_receiver(StatusCode::INTERNAL_SERVER_ERROR).await;
    let (_tx, rx) = watch::channel(false);

    let outcome = timeout(
        WAIT,
        run_supervised(
            sh("echo '2024-01-01 10:00:00 [JOIN] Alice joined the game'; \
                echo '2024-01-01 10:00:05 [LEAVE] Alice left the game'"),
            Duration::from_secs(5),
            watcher(&url),
            tokio::io::sink(),
            rx,
        ),
    )
    .await
    .unwrap()
    .unwrap();

    let stats = outcome.stats.unwrap();
    assert_eq!(stats.matched, 2);
    assert_eq!(stats.failed, 2);
    assert_eq!(received.lock().unwrap().len(), 2);
    assert_eq!(outcome.exit.code().unwrap(), 0);
}

#[tokio::test]
async fn spawn_failure_is_fatal() {
    let (url, _received) = spawn_receiver(StatusCode::NO_CONTENT).await;
    let (_tx, rx) = watch::channel(false);

    let err = run_supervised(
        vec!["/nonexistent/factorio".into()],
        Duration::from_secs(1),
        watcher(&url),
        tokio::io::sink(),
        rx,
    )
    .await
    .unwrap_err();

    assert!(
        matches!(
            err,
            RunError::Supervisor(SupervisorError::SpawnFailed { .. })
        ),
        "expected spawn failure, got: {err}"
    );
}

#[tokio::test]
async fn run_from_config_supervises_command() {
    let (url, received) = spawn_receiver(StatusCode::NO_CONTENT).await;
    let (_tx, rx) = watch::channel(false);
    let config = NotifyConfig::new(
        "watcher".into(),
        &url,
        SourceConfig::Supervise {
            argv: sh("echo '2024-01-01 10:00:00 [LEAVE] Bob left the game'; exit 3"),
            grace: Duration::from_secs(5),
        },
    )
    .unwrap();

    let outcome = timeout(WAIT, orchestrator::run(&config, tokio::io::sink(), rx))
        .await
        .unwrap()
        .unwrap();

    let Outcome::Supervised(outcome) = outcome else {
        panic!("expected supervised outcome");
    };
    assert_eq!(outcome.exit.code().unwrap(), 3);
    assert_eq!(
        contents(&received),
        vec!["2024-01-01 10:00:00 [LEAVE] Bob left the game"]
    );
    assert_eq!(received.lock().unwrap()[0]["username"], "watcher");
}

#[tokio::test]
async fn tail_mode_delivers_appended_events_until_shutdown() {
    let (url, received) = spawn_receiver(StatusCode::NO_CONTENT).await;
    let (tx, rx) = watch::channel(false);

    let mut log = tempfile::NamedTempFile::new().unwrap();
    writeln!(log, "2024-01-01 09:00:00 [JOIN] Old joined the game").unwrap();
    log.flush().unwrap();

    let path = log.path().to_path_buf();
    let run = tokio::spawn(async move {
        let watcher = watcher(&url);
        let mut echo = tokio::io::sink();
        run_tail(&path, Duration::from_millis(20), &watcher, &mut echo, rx).await
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    writeln!(log, "2024-01-01 10:00:00 [JOIN] Alice joined the game").unwrap();
    writeln!(log, "2024-01-01 10:00:01 [CHAT] Alice: o/").unwrap();
    log.flush().unwrap();

    timeout(WAIT, async {
        while received.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    tx.send(true).unwrap();

    let stats = timeout(WAIT, run).await.unwrap().unwrap().unwrap();
    assert_eq!(stats.lines, 2);
    assert_eq!(stats.delivered, 1);
    assert_eq!(
        contents(&received),
        vec!["2024-01-01 10:00:00 [JOIN] Alice joined the game"]
    );
}

#[tokio::test]
async fn tail_mode_missing_file_is_fatal() {
    let (url, _received) = spawn_receiver(StatusCode::NO_CONTENT).await;
    let (_tx, rx) = watch::channel(false);
    let watcher = watcher(&url);
    let mut echo = tokio::io::sink();

    let err = run_tail(
        std::path::Path::new("/nonexistent/console.log"),
        Duration::from_millis(20),
        &watcher,
        &mut echo,
        rx,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RunError::Open { .. }), "got: {err}");
}
