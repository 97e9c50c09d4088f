//! Boundary tests for the three timer-dependent properties spec.md §8 calls
//! out explicitly: the 30s command timeout, the 5s ping cadence, and the
//! exact 1/2/4/8/16/30/30/... reconnect backoff sequence. Run under
//! `tokio::time::pause()` so virtual time auto-advances instead of the test
//! actually waiting out the real durations.

mod support;

use std::time::Duration;

use cm_client::{CallRecord, Client, ClientConfig, EventHandler};

use support::{ClientFrame, InMemoryTransport};

struct NoopHandler;

impl EventHandler for NoopHandler {
    async fn on_call_incoming(&self, _call: &CallRecord) -> bool {
        false
    }
}

fn config() -> ClientConfig {
    ClientConfig::new("wss://fake-cm.test/v1/ws/events", "tok", "client-1", "app-1")
}

#[tokio::test(start_paused = true)]
async fn ping_loop_ticks_at_the_configured_interval() {
    let (transport, mut servers) = InMemoryTransport::new();
    let cfg = config().with_timing(
        Duration::from_secs(30),
        Duration::from_secs(5),
        Duration::from_secs(1),
        Duration::from_secs(30),
    );
    let client = Client::connect(cfg, transport, NoopHandler).await.unwrap();

    let server = servers.recv().await.unwrap();
    server.handshake("sess-1").await.unwrap();

    let mut ticks = Vec::new();
    for _ in 0..3 {
        loop {
            match server.recv_client_frame().await.unwrap() {
                ClientFrame::Ping => {
                    ticks.push(tokio::time::Instant::now());
                    break;
                }
                _ => continue,
            }
        }
    }

    assert_eq!(ticks[1] - ticks[0], Duration::from_secs(5));
    assert_eq!(ticks[2] - ticks[1], Duration::from_secs(5));

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_backoff_doubles_then_caps_at_thirty_seconds() {
    let (transport, mut servers) = InMemoryTransport::new();
    let cfg = config().with_timing(
        Duration::from_secs(30),
        Duration::from_secs(5),
        Duration::from_secs(1),
        Duration::from_secs(30),
    );
    let client = Client::connect(cfg, transport, NoopHandler).await.unwrap();

    let server = servers.recv().await.unwrap();
    server.handshake("sess-1").await.unwrap();
    server.disconnect();

    // Every attempt here fails the handshake immediately (the server is
    // dropped before replying), so the gap between consecutive connect
    // attempts is exactly the backoff slept after the previous failure —
    // the first attempt carries no backoff at all.
    let mut attempts = Vec::new();
    for _ in 0..8 {
        let attempt = servers.recv().await.unwrap();
        attempts.push(tokio::time::Instant::now());
        attempt.disconnect();
    }

    let expected_gaps = [1u64, 2, 4, 8, 16, 30, 30];
    for (i, secs) in expected_gaps.iter().enumerate() {
        assert_eq!(
            attempts[i + 1] - attempts[i],
            Duration::from_secs(*secs),
            "gap after attempt {i}"
        );
    }

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn command_times_out_within_one_second_of_the_configured_bound() {
    let (transport, mut servers) = InMemoryTransport::new();
    let cfg = config().with_timing(
        Duration::from_secs(30),
        Duration::from_secs(5),
        Duration::from_secs(1),
        Duration::from_secs(30),
    );
    let client = Client::connect(cfg, transport, NoopHandler).await.unwrap();

    let server = servers.recv().await.unwrap();
    server.handshake("sess-1").await.unwrap();

    let start = tokio::time::Instant::now();
    let result = client
        .dial(
            cm_client::DialParams {
                from: "+1".into(),
                to: "+2".into(),
                channel: "ch1".into(),
                uid: "100".into(),
                token: "T".into(),
                region: None,
                appid: None,
            },
            &tokio_util::sync::CancellationToken::new(),
        )
        .await;
    let elapsed = start.elapsed();

    // The server never replies to the dial, so this can only resolve via
    // the command timeout.
    assert_eq!(result.unwrap_err(), cm_client::ClientError::Timeout);
    assert!(elapsed > Duration::from_secs(29) && elapsed <= Duration::from_secs(31));

    drop(server);
    client.close().await;
}
