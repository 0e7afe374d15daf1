//! Shared fixtures for the integration tests.
//!
//! `ScriptedTransport` replaces the WebSocket with in-memory channels so
//! the whole manager runs under a paused Tokio clock.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use ticker_stream::application::ports::{FrameSource, InboundFrame, StreamTransport, TransportError};
use ticker_stream::application::services::ManagerConfig;
use ticker_stream::domain::connection::ReconnectConfig;
use ticker_stream::{
    BinanceCodec, ConnectionManager, ConnectionState, StreamEvent, SymbolSet,
};

/// Sender half feeding one scripted session.
pub type FrameSender = mpsc::UnboundedSender<Result<InboundFrame, TransportError>>;

enum Step {
    Fail(String),
    Open(mpsc::UnboundedReceiver<Result<InboundFrame, TransportError>>),
}

/// Transport whose opens follow a script. Opens past the end of the
/// script fail.
#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    opens: AtomicUsize,
}

impl ScriptedTransport {
    /// Queue a successful open, returning the sender feeding its frames.
    pub fn push_session(&self) -> FrameSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.steps.lock().push_back(Step::Open(rx));
        tx
    }

    /// Queue a failing open.
    pub fn push_failure(&self, message: &str) {
        self.steps.lock().push_back(Step::Fail(message.to_string()));
    }

    /// Number of open calls so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn open(&self, _symbols: &SymbolSet) -> Result<Box<dyn FrameSource>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Open(rx)) => Ok(Box::new(ChannelSource { rx })),
            Some(Step::Fail(message)) => Err(TransportError::Open { message }),
            None => Err(TransportError::Open {
                message: "connection refused".to_string(),
            }),
        }
    }
}

struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Result<InboundFrame, TransportError>>,
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

/// Manager config over BTC/ETH with jitter disabled.
pub fn test_config() -> ManagerConfig {
    let symbols = SymbolSet::new(["BTCUSDT", "ETHUSDT"]).unwrap();
    let mut config = ManagerConfig::new(symbols);
    config.machine.reconnect = ReconnectConfig {
        max_jitter: Duration::ZERO,
        ..ReconnectConfig::default()
    };
    config
}

/// Manager wired to a fresh scripted transport.
pub fn manager(config: ManagerConfig) -> (ConnectionManager, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::default());
    let manager = ConnectionManager::new(
        config,
        Arc::clone(&transport) as Arc<dyn StreamTransport>,
        Arc::new(BinanceCodec::new()),
    )
    .unwrap();
    (manager, transport)
}

/// 24h ticker payload as sent on the combined stream.
pub fn ticker_frame(symbol: &str, price: &str, event_time_ms: i64) -> InboundFrame {
    InboundFrame::Text(format!(
        r#"{{"stream":"{lower}@ticker","data":{{"e":"24hrTicker","E":{event_time_ms},"s":"{symbol}","c":"{price}","p":"1.5","P":"0.01","h":"99999","l":"1","v":"1234.5"}}}}"#,
        lower = symbol.to_lowercase(),
    ))
}

/// Receive events until one matches, returning it.
pub async fn next_matching<F>(rx: &mut broadcast::Receiver<StreamEvent>, mut matches: F) -> StreamEvent
where
    F: FnMut(&StreamEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Receive events until the given state is published.
pub async fn wait_for_state(rx: &mut broadcast::Receiver<StreamEvent>, state: ConnectionState) {
    next_matching(rx, |event| {
        matches!(event, StreamEvent::StateChanged { state: s } if *s == state)
    })
    .await;
}

/// Drain every event already published.
pub fn drain(rx: &mut broadcast::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
