//! Tick Pipeline Integration Tests
//!
//! Frames flow through the router into the latest-value table, and the
//! focused symbol's ticks are batched into the smoothed series.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::str::FromStr;
use std::time::Duration;

use common::{FrameSender, drain, manager, next_matching, test_config, ticker_frame, wait_for_state};
use rust_decimal::Decimal;
use ticker_stream::application::ports::InboundFrame;
use ticker_stream::{ConnectionManager, ConnectionState, StreamError, StreamEvent};

const T0: i64 = 1_700_000_000_000;

async fn connected() -> (
    ConnectionManager,
    FrameSender,
    tokio::sync::broadcast::Receiver<StreamEvent>,
) {
    let (manager, transport) = manager(test_config());
    let frames = transport.push_session();
    let mut events = manager.subscribe();
    manager.connect();
    wait_for_state(&mut events, ConnectionState::Connected).await;
    (manager, frames, events)
}

#[tokio::test(start_paused = true)]
async fn routed_tick_updates_latest_value() {
    let (manager, frames, mut events) = connected().await;

    frames.send(Ok(ticker_frame("BTCUSDT", "43000.50", T0))).unwrap();

    let event = next_matching(&mut events, |event| {
        matches!(event, StreamEvent::TickReceived { .. })
    })
    .await;
    let StreamEvent::TickReceived { tick } = event else {
        unreachable!()
    };
    assert_eq!(tick.symbol, "BTCUSDT");
    assert_eq!(tick.last_price, Decimal::from_str("43000.50").unwrap());

    let latest = manager.latest_value("btcusdt").unwrap();
    assert_eq!(latest, tick);
    assert_eq!(manager.stats().messages_received, 1);
}

#[tokio::test(start_paused = true)]
async fn latest_values_follow_subscription_order() {
    let (manager, frames, mut events) = connected().await;

    frames.send(Ok(ticker_frame("ETHUSDT", "2000", T0))).unwrap();
    frames.send(Ok(ticker_frame("BTCUSDT", "43000", T0))).unwrap();
    frames.send(Ok(ticker_frame("ETHUSDT", "2010", T0 + 1_000))).unwrap();

    for _ in 0..3 {
        next_matching(&mut events, |event| {
            matches!(event, StreamEvent::TickReceived { .. })
        })
        .await;
    }

    let latest = manager.latest_values();
    let symbols: Vec<&str> = latest.iter().map(|tick| tick.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);
    assert_eq!(latest[1].last_price, Decimal::from(2010));
}

#[tokio::test(start_paused = true)]
async fn ticks_within_one_interval_produce_one_series_update() {
    let (manager, frames, mut events) = connected().await;

    frames.send(Ok(ticker_frame("BTCUSDT", "43000", T0))).unwrap();
    frames.send(Ok(ticker_frame("BTCUSDT", "43010", T0 + 1_000))).unwrap();
    frames.send(Ok(ticker_frame("BTCUSDT", "43020", T0 + 2_000))).unwrap();

    let mut ticks = 0;
    let len = loop {
        match events.recv().await.unwrap() {
            StreamEvent::TickReceived { .. } => ticks += 1,
            StreamEvent::SeriesUpdated { symbol, len } => {
                assert_eq!(symbol, "BTCUSDT");
                break len;
            }
            _ => {}
        }
    };
    assert_eq!(ticks, 3);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        drain(&mut events)
            .iter()
            .all(|event| !matches!(event, StreamEvent::SeriesUpdated { .. }))
    );

    let series = manager.series("BTCUSDT");
    assert_eq!(series.len(), len);
    assert_eq!(series.first().unwrap().price, Decimal::from(43000));
    assert_eq!(series.last().unwrap().price, Decimal::from(43020));
    assert_eq!(series.last().unwrap().time_millis, T0 + 2_000);
    assert!(series.windows(2).all(|pair| pair[0].time_millis <= pair[1].time_millis));
}

#[tokio::test(start_paused = true)]
async fn series_stays_within_capacity() {
    let (manager, frames, mut events) = connected().await;

    for i in 0..100 {
        frames
            .send(Ok(ticker_frame("BTCUSDT", &(43_000 + i).to_string(), T0 + i * 1_000)))
            .unwrap();
    }

    let event = next_matching(&mut events, |event| {
        matches!(event, StreamEvent::SeriesUpdated { .. })
    })
    .await;
    let StreamEvent::SeriesUpdated { len, .. } = event else {
        unreachable!()
    };

    assert_eq!(len, 60);
    let series = manager.series("BTCUSDT");
    assert_eq!(series.len(), 60);
    assert_eq!(series.last().unwrap().price, Decimal::from(43_099));
}

#[tokio::test(start_paused = true)]
async fn unfocused_symbol_is_tracked_but_not_charted() {
    let (manager, frames, mut events) = connected().await;

    frames.send(Ok(ticker_frame("ETHUSDT", "2000", T0))).unwrap();
    next_matching(&mut events, |event| {
        matches!(event, StreamEvent::TickReceived { .. })
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(manager.latest_value("ETHUSDT").is_some());
    assert!(manager.series("ETHUSDT").is_empty());
    assert!(
        drain(&mut events)
            .iter()
            .all(|event| !matches!(event, StreamEvent::SeriesUpdated { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn focus_switch_charts_the_new_symbol() {
    let (manager, frames, mut events) = connected().await;

    assert!(manager.set_focus("ethusdt"));
    assert_eq!(manager.focus(), "ETHUSDT");
    assert!(!manager.set_focus("DOGEUSDT"));
    assert_eq!(manager.focus(), "ETHUSDT");

    frames.send(Ok(ticker_frame("ETHUSDT", "2000", T0))).unwrap();
    frames.send(Ok(ticker_frame("BTCUSDT", "43000", T0))).unwrap();

    let event = next_matching(&mut events, |event| {
        matches!(event, StreamEvent::SeriesUpdated { .. })
    })
    .await;
    assert_eq!(
        event,
        StreamEvent::SeriesUpdated {
            symbol: "ETHUSDT".to_string(),
            len: 1
        }
    );
    assert!(manager.series("BTCUSDT").is_empty());
}

#[tokio::test(start_paused = true)]
async fn untracked_symbol_is_dropped() {
    let (manager, frames, mut events) = connected().await;

    frames.send(Ok(ticker_frame("XRPUSDT", "0.5", T0))).unwrap();
    frames.send(Ok(ticker_frame("BTCUSDT", "43000", T0))).unwrap();

    let event = next_matching(&mut events, |event| {
        matches!(event, StreamEvent::TickReceived { .. })
    })
    .await;
    let StreamEvent::TickReceived { tick } = event else {
        unreachable!()
    };
    assert_eq!(tick.symbol, "BTCUSDT");

    assert!(manager.latest_value("XRPUSDT").is_none());
    assert_eq!(manager.latest_values().len(), 1);
    assert_eq!(manager.stats().errors, 0);
    assert_eq!(manager.stats().messages_received, 2);
}

#[tokio::test(start_paused = true)]
async fn malformed_frame_counts_as_error_without_disconnecting() {
    let (manager, frames, mut events) = connected().await;

    frames.send(Ok(InboundFrame::Text("not json".to_string()))).unwrap();

    let event = next_matching(&mut events, |event| {
        matches!(event, StreamEvent::ErrorOccurred { .. })
    })
    .await;
    assert!(matches!(
        event,
        StreamEvent::ErrorOccurred {
            error: StreamError::MalformedTick { .. }
        }
    ));

    frames
        .send(Ok(InboundFrame::Binary(
            br#"{"s":"BTCUSDT","c":"-1","p":"0","P":"0","h":"1","l":"1","v":"1"}"#.to_vec(),
        )))
        .unwrap();
    next_matching(&mut events, |event| {
        matches!(event, StreamEvent::ErrorOccurred { .. })
    })
    .await;

    let stats = manager.stats();
    assert_eq!(stats.state, ConnectionState::Connected);
    assert_eq!(stats.errors, 2);
    assert_eq!(stats.messages_received, 2);
    assert!(manager.latest_value("BTCUSDT").is_none());
}

#[tokio::test(start_paused = true)]
async fn disconnect_discards_queued_ticks() {
    let (manager, frames, mut events) = connected().await;

    frames.send(Ok(ticker_frame("BTCUSDT", "43000", T0))).unwrap();
    next_matching(&mut events, |event| {
        matches!(event, StreamEvent::TickReceived { .. })
    })
    .await;

    manager.disconnect();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(manager.series("BTCUSDT").is_empty());
    let late = drain(&mut events);
    assert_eq!(
        late,
        vec![StreamEvent::StateChanged {
            state: ConnectionState::Disconnected
        }]
    );
}
