//! Integration tests for the lifecycle engine over the in-memory transport.
//!
//! All tests run on a paused clock, so backoff and penalty sleeps complete
//! instantly while `Instant` differences stay exact.

use std::sync::Mutex;
use std::time::Duration;

use tether_engine::{
    DispatchMode, Engine, EngineConfig, EngineError, EngineState, GenerationId, Handler,
    HookResult, Link, ReconnectOutcome,
};
use tether_transport::memory::{MemoryConnector, MemoryPeer, MemoryServer, memory_pair};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};

// =========================================================================
// Recording handler
// =========================================================================

#[derive(Debug, PartialEq)]
enum Event {
    Connected(GenerationId),
    Message(String),
}

struct Recorder {
    events: mpsc::UnboundedSender<Event>,
    links: Mutex<Vec<Link>>,
    greeting: Option<&'static str>,
}

impl Handler for Recorder {
    async fn on_connected(&self, link: Link) -> HookResult {
        if let Some(greeting) = self.greeting {
            link.enqueue(greeting);
        }
        self.links.lock().unwrap().push(link.clone());
        let _ = self.events.send(Event::Connected(link.generation()));
        Ok(())
    }

    async fn on_message(&self, text: String, _link: Link) -> HookResult {
        match text.as_str() {
            "boom" => return Err("handler rejected message".into()),
            "panic" => panic!("handler panicked on purpose"),
            _ => {}
        }
        let _ = self.events.send(Event::Message(text));
        Ok(())
    }
}

type TestEngine = Engine<MemoryConnector, Recorder>;

struct Harness {
    engine: TestEngine,
    server: MemoryServer,
    events: mpsc::UnboundedReceiver<Event>,
}

fn harness(dispatch: DispatchMode, greeting: Option<&'static str>) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (connector, server) = memory_pair();
    let (tx, events) = mpsc::unbounded_channel();
    let recorder = Recorder {
        events: tx,
        links: Mutex::new(Vec::new()),
        greeting,
    };
    let config = EngineConfig::new("memory://chat").with_dispatch(dispatch);
    Harness {
        engine: Engine::new(connector, recorder, config),
        server,
        events,
    }
}

impl Harness {
    async fn accept(&mut self) -> MemoryPeer {
        timeout(Duration::from_secs(3600), self.server.accept())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    async fn next_event(&mut self) -> Event {
        timeout(Duration::from_secs(3600), self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("handler dropped")
    }

    async fn wait_connected(&mut self) -> GenerationId {
        loop {
            if let Event::Connected(generation) = self.next_event().await {
                return generation;
            }
        }
    }

    fn link(&self, index: usize) -> Link {
        self.engine.handler().links.lock().unwrap()[index].clone()
    }
}

async fn wait_for_state(engine: &TestEngine, pred: impl FnMut(&EngineState) -> bool) {
    let mut rx = engine.state_receiver();
    timeout(Duration::from_secs(3600), rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("engine dropped");
}

async fn recv_text(peer: &mut MemoryPeer) -> String {
    timeout(Duration::from_secs(3600), peer.recv())
        .await
        .expect("timed out waiting for client text")
        .expect("client closed")
}

// =========================================================================
// Start / Stop
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_start_connects_and_fires_on_connected_once() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;
    assert_eq!(peer.uri(), "memory://chat");

    let generation = h.wait_connected().await;
    assert!(matches!(
        h.engine.state(),
        EngineState::Connected { generation: g, .. } if g == generation
    ));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.events.try_recv().is_err(), "on_connected fired more than once");
    assert_eq!(h.server.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_rejected() {
    let h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    assert!(matches!(h.engine.start().await, Err(EngineError::AlreadyRunning)));
    assert_eq!(h.server.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_start_leaves_engine_stopped() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.server.set_refusing(true);

    assert!(matches!(h.engine.start().await, Err(EngineError::Connect(_))));
    assert_eq!(h.engine.state(), EngineState::Stopped);
    assert!(matches!(h.engine.stop().await, Err(EngineError::NotRunning)));

    h.server.set_refusing(false);
    h.engine.start().await.unwrap();
    h.wait_connected().await;
    assert!(h.engine.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_start_is_rejected() {
    let h = harness(DispatchMode::Spawn, None);
    assert!(matches!(h.engine.stop().await, Err(EngineError::NotRunning)));
}

#[tokio::test(start_paused = true)]
async fn test_stop_closes_connection_and_allows_restart() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let mut peer = h.accept().await;
    let first = h.wait_connected().await;

    h.engine.stop().await.unwrap();
    assert_eq!(h.engine.state(), EngineState::Stopped);
    assert_eq!(peer.recv().await, None);
    assert!(peer.closed_gracefully());
    assert!(h.link(0).is_cancelled());

    h.engine.start().await.unwrap();
    let _peer = h.accept().await;
    let second = h.wait_connected().await;
    assert!(second > first);
}

#[tokio::test(start_paused = true)]
async fn test_stop_closes_before_cancelling_generation() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;
    h.wait_connected().await;
    let link = h.link(0);

    peer.hang_on_close();
    let engine = h.engine.clone();
    let stop = tokio::spawn(async move { engine.stop().await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!stop.is_finished());
    assert!(!link.is_cancelled(), "generation cancelled before the close handshake");

    // The stuck close is abandoned after `close_timeout`.
    stop.await.unwrap().unwrap();
    assert!(link.is_cancelled());
    assert_eq!(h.engine.state(), EngineState::Stopped);
}

// =========================================================================
// Inbound
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_inline_dispatch_preserves_order_and_skips_empty_lines() {
    let mut h = harness(DispatchMode::Inline, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;

    peer.send_text("first\r\n\r\nsecond\r\n");
    peer.send_fragment(b"thi", false);
    peer.send_fragment(b"rd", true);

    assert!(matches!(h.next_event().await, Event::Connected(_)));
    assert_eq!(h.next_event().await, Event::Message("first".into()));
    assert_eq!(h.next_event().await, Event::Message("second".into()));
    assert_eq!(h.next_event().await, Event::Message("third".into()));
}

#[tokio::test(start_paused = true)]
async fn test_hook_errors_and_panics_are_contained() {
    for dispatch in [DispatchMode::Inline, DispatchMode::Spawn] {
        let mut h = harness(dispatch, None);
        h.engine.start().await.unwrap();
        let peer = h.accept().await;
        h.wait_connected().await;

        peer.send_text("boom");
        peer.send_text("panic");
        peer.send_text("still alive");

        assert_eq!(h.next_event().await, Event::Message("still alive".into()));
        assert!(h.engine.state().is_connected());
        assert_eq!(h.server.connect_attempts(), 1);
        h.engine.stop().await.unwrap();
    }
}

// =========================================================================
// Outbound
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_enqueue_sends_in_order() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let mut peer = h.accept().await;

    for text in ["a", "b", "c"] {
        h.engine.enqueue(text);
    }
    assert_eq!(recv_text(&mut peer).await, "a");
    assert_eq!(recv_text(&mut peer).await, "b");
    assert_eq!(recv_text(&mut peer).await, "c");
}

#[tokio::test(start_paused = true)]
async fn test_on_connected_can_enqueue_through_link() {
    let mut h = harness(DispatchMode::Inline, Some("HELLO"));
    h.engine.start().await.unwrap();
    let mut peer = h.accept().await;
    assert_eq!(recv_text(&mut peer).await, "HELLO");

    peer.close();
    let mut peer = h.accept().await;
    assert_eq!(recv_text(&mut peer).await, "HELLO");
}

#[tokio::test(start_paused = true)]
async fn test_messages_enqueued_while_disconnected_arrive_in_order() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;

    h.server.set_refusing(true);
    peer.sever();
    wait_for_state(&h.engine, |s| s.is_reconnecting()).await;

    h.engine.enqueue("a");
    h.engine.enqueue("b");
    wait_for_state(&h.engine, |s| matches!(s, EngineState::Reconnecting { attempt: 1 })).await;
    h.server.set_refusing(false);

    let mut peer = h.accept().await;
    assert_eq!(recv_text(&mut peer).await, "a");
    assert_eq!(recv_text(&mut peer).await, "b");
}

#[tokio::test(start_paused = true)]
async fn test_failed_send_is_retried_first_after_reconnect() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;
    h.wait_connected().await;

    peer.fail_sends();
    h.engine.enqueue("first");
    h.engine.enqueue("second");

    let mut peer = h.accept().await;
    assert_eq!(recv_text(&mut peer).await, "first");
    assert_eq!(recv_text(&mut peer).await, "second");
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_queued_messages() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;

    h.server.set_refusing(true);
    peer.sever();
    wait_for_state(&h.engine, |s| s.is_reconnecting()).await;
    h.engine.enqueue("stale");
    h.engine.stop().await.unwrap();

    h.server.set_refusing(false);
    h.engine.start().await.unwrap();
    let mut peer = h.accept().await;
    h.engine.enqueue("fresh");
    assert_eq!(recv_text(&mut peer).await, "fresh");
}

// =========================================================================
// Reconnect
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_peer_close_reconnects_with_new_generation() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;
    let first = h.wait_connected().await;

    peer.close();
    let _peer = h.accept().await;
    let second = h.wait_connected().await;

    assert!(second > first);
    assert!(h.link(0).is_cancelled());
    assert!(!h.link(1).is_cancelled());
    assert!(matches!(
        h.engine.state(),
        EngineState::Connected { generation, .. } if generation == second
    ));
}

#[tokio::test(start_paused = true)]
async fn test_severed_transport_moves_to_reconnecting_then_connected() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;
    h.wait_connected().await;

    peer.sever();
    wait_for_state(&h.engine, |s| s.is_reconnecting()).await;
    let _peer = h.accept().await;
    wait_for_state(&h.engine, |s| s.is_connected()).await;
    assert_eq!(h.server.connect_attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_receive_error_triggers_reconnect() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;
    h.wait_connected().await;

    peer.fail("garbled frame");
    let _peer = h.accept().await;
    h.wait_connected().await;
    assert_eq!(h.server.connect_attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_reconnects_collapse_into_one() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let _peer = h.accept().await;
    h.wait_connected().await;

    let outcomes =
        futures_util::future::join_all((0..5).map(|_| h.engine.reconnect())).await;

    let reconnected = outcomes
        .iter()
        .filter(|o| **o == ReconnectOutcome::Reconnected)
        .count();
    let ignored = outcomes
        .iter()
        .filter(|o| **o == ReconnectOutcome::Ignored)
        .count();
    assert_eq!(reconnected, 1);
    assert_eq!(ignored, 4);
    assert_eq!(h.server.connect_attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_while_stopped_is_ignored() {
    let h = harness(DispatchMode::Spawn, None);
    assert_eq!(h.engine.reconnect().await, ReconnectOutcome::Ignored);
    assert_eq!(h.server.connect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_generation_reconnect_is_ignored() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let _peer = h.accept().await;
    h.wait_connected().await;

    assert_eq!(h.engine.reconnect().await, ReconnectOutcome::Reconnected);
    let _peer = h.accept().await;
    let current = h.wait_connected().await;

    let stale = h.link(0);
    assert!(stale.is_cancelled());
    stale.reconnect();
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(h.server.connect_attempts(), 2);
    assert!(matches!(
        h.engine.state(),
        EngineState::Connected { generation, .. } if generation == current
    ));

    h.link(1).reconnect();
    let _peer = h.accept().await;
    assert_eq!(h.server.connect_attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_closes_superseded_connection_gracefully() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let mut old = h.accept().await;
    h.wait_connected().await;

    assert_eq!(h.engine.reconnect().await, ReconnectOutcome::Reconnected);
    assert_eq!(old.recv().await, None);
    assert!(old.closed_gracefully());
    let _new = h.accept().await;
}

#[tokio::test(start_paused = true)]
async fn test_state_is_reconnecting_while_old_close_hangs() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;
    let first = h.wait_connected().await;

    peer.hang_on_close();
    peer.close();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let state = h.engine.state();
    assert!(
        matches!(state, EngineState::Reconnecting { .. }),
        "expected reconnecting, got {state}"
    );

    let _peer = h.accept().await;
    let second = h.wait_connected().await;
    assert!(second > first);
}

// =========================================================================
// Timing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_between_failed_attempts() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;

    h.server.set_refusing(true);
    peer.sever();

    let mut rx = h.engine.state_receiver();
    let mut seen = Vec::new();
    while seen.len() < 4 {
        timeout(Duration::from_secs(3600), rx.changed())
            .await
            .unwrap()
            .unwrap();
        if let EngineState::Reconnecting { attempt } = *rx.borrow_and_update() {
            if attempt > 0 {
                seen.push((attempt, Instant::now()));
            }
        }
    }

    let attempts: Vec<u32> = seen.iter().map(|(a, _)| *a).collect();
    assert_eq!(attempts, vec![1, 2, 3, 4]);
    // Reconnecting{k} is published right before sleeping delay(k).
    for window in seen.windows(2) {
        let (attempt, at) = window[0];
        let gap = window[1].1 - at;
        let expected = Duration::from_secs(1 << attempt);
        assert!(
            gap >= expected && gap < expected + Duration::from_millis(100),
            "attempt {attempt}: waited {gap:?}, expected {expected:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_fast_disconnect_penalty_grows_and_resets() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;

    // Dropped immediately: waits out the whole 1s window.
    let dropped = Instant::now();
    peer.sever();
    let peer = h.accept().await;
    let waited = dropped.elapsed();
    assert!(waited >= Duration::from_secs(1) && waited < Duration::from_millis(1100));

    // Second fast disconnect: window doubles to 2s.
    let dropped = Instant::now();
    peer.sever();
    let peer = h.accept().await;
    let waited = dropped.elapsed();
    assert!(waited >= Duration::from_secs(2) && waited < Duration::from_millis(2100));

    // A long-lived connection reconnects without penalty.
    tokio::time::sleep(Duration::from_secs(60)).await;
    let dropped = Instant::now();
    peer.sever();
    let _peer = h.accept().await;
    assert!(dropped.elapsed() < Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_backoff_returns_promptly() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;

    h.server.set_refusing(true);
    peer.sever();
    wait_for_state(&h.engine, |s| matches!(s, EngineState::Reconnecting { attempt: 5 })).await;

    let attempts = h.server.connect_attempts();
    let before = Instant::now();
    h.engine.stop().await.unwrap();
    assert!(before.elapsed() < Duration::from_millis(100));
    assert_eq!(h.engine.state(), EngineState::Stopped);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.server.connect_attempts(), attempts);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_fast_disconnect_penalty_returns_promptly() {
    let mut h = harness(DispatchMode::Spawn, None);
    h.engine.start().await.unwrap();
    let peer = h.accept().await;

    peer.sever();
    wait_for_state(&h.engine, |s| s.is_reconnecting()).await;
    let before = Instant::now();
    h.engine.stop().await.unwrap();
    assert!(before.elapsed() < Duration::from_millis(100));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.server.connect_attempts(), 1);
}
