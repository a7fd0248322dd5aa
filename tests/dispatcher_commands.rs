//! Command handling on top of the scripted exchange.

mod common;

use common::*;
use position_follower::config::FollowerConfig;
use position_follower::core::Dispatcher;
use position_follower::error::GatewayError;
use position_follower::types::{ChannelId, OrderType, Side};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn dispatcher(gw: Arc<ScriptedGateway>, notes: Arc<RecordingNotifier>) -> Dispatcher {
    Dispatcher::with_settings(
        gw,
        notes,
        ladder(),
        &FollowerConfig::default(),
        fast_settings(),
        CancellationToken::new(),
    )
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn open_buys_flat_symbols_and_follows_them() {
    let gw = ScriptedGateway::with_snapshots(vec![flat(), long_at("1")]);
    let notes = RecordingNotifier::new();
    let disp = dispatcher(gw.clone(), notes.clone());
    let chat = ChannelId::new("chat-1");

    let reply = disp.handle("/open btcusdt", &chat).await;
    assert!(reply.contains("BTCUSDT: bought 1 at market"), "{reply}");

    let entry = &gw.placed()[0];
    assert_eq!(entry.side, Side::Buy);
    assert_eq!(entry.order_type, OrderType::Market);
    assert!(!entry.reduce_only);

    let registry = disp.registry().clone();
    wait_until(|| gw.polls() >= 3).await;
    assert!(registry.get("BTCUSDT").await.is_some());

    let again = disp.handle("/open BTCUSDT", &chat).await;
    assert_eq!(again, "BTCUSDT: already followed");

    let closed = disp.handle("/close BTCUSDT", &chat).await;
    assert!(closed.contains("closed at market"), "{closed}");
    assert!(gw.calls().contains(&Call::Close("BTCUSDT".into())));
    assert!(registry.get("BTCUSDT").await.is_none());
}

#[tokio::test]
async fn open_refuses_positions_opened_elsewhere() {
    let gw = ScriptedGateway::with_snapshots(vec![long_at("3")]);
    let disp = dispatcher(gw.clone(), RecordingNotifier::new());

    let reply = disp.handle("/open BTCUSDT", &ChannelId::new("chat-1")).await;

    assert_eq!(reply, "BTCUSDT: already opened not by the follower");
    assert!(gw.placed().is_empty());
}

#[tokio::test]
async fn gateway_errors_are_reported_not_raised() {
    let gw = ScriptedGateway::new();
    gw.push_snapshot(Err(GatewayError::Transport("timeout".into())));
    let disp = dispatcher(gw.clone(), RecordingNotifier::new());

    let reply = disp.handle("/open BTCUSDT", &ChannelId::new("chat-1")).await;
    assert!(reply.contains("failed to check position"), "{reply}");

    let gw = ScriptedGateway::with_snapshots(vec![flat()]);
    gw.push_place_result(Err(GatewayError::Api {
        code: 110007,
        message: "insufficient balance".into(),
    }));
    let disp = dispatcher(gw.clone(), RecordingNotifier::new());
    let reply = disp.handle("/open BTCUSDT", &ChannelId::new("chat-1")).await;
    assert!(reply.contains("failed to open position"), "{reply}");
}

#[tokio::test]
async fn close_cancels_the_outstanding_limit_order() {
    let gw = ScriptedGateway::with_snapshots(vec![flat(), long_at("-6")]);
    let disp = dispatcher(gw.clone(), RecordingNotifier::new());
    let chat = ChannelId::new("chat-1");

    disp.handle("/open BTCUSDT", &chat).await;
    wait_until(|| !gw.placed_of(OrderType::Limit).is_empty()).await;
    let limit_id = "order-2".to_string();

    let reply = disp.handle("/close BTCUSDT", &chat).await;

    assert!(reply.contains(&format!("limit order {limit_id} cancelled")), "{reply}");
    assert_eq!(gw.cancelled(), vec![limit_id]);
    assert_eq!(gw.placed_of(OrderType::Limit).len(), 1);
}

#[tokio::test]
async fn close_after_invalid_data_still_cancels_the_limit() {
    let mut broken = long_at("-6");
    broken.avg_price = "0".into();
    let gw = ScriptedGateway::with_snapshots(vec![flat(), long_at("-6"), broken]);
    let notes = RecordingNotifier::new();
    let disp = dispatcher(gw.clone(), notes.clone());
    let chat = ChannelId::new("chat-1");

    disp.handle("/open BTCUSDT", &chat).await;
    wait_until(|| notes.any_contains("invalid position data")).await;

    let reply = disp.handle("/close BTCUSDT", &chat).await;

    assert!(reply.contains("monitor had stopped"), "{reply}");
    assert!(reply.contains("limit order order-2 cancelled"), "{reply}");
    assert_eq!(gw.cancelled(), vec!["order-2".to_string()]);
    assert!(gw.calls().contains(&Call::Close("BTCUSDT".into())));
}

#[tokio::test]
async fn close_racing_a_stop_out_leaves_it_to_the_monitor() {
    let gw = ScriptedGateway::with_snapshots(vec![flat(), long_at("-9")]);
    let gate = gw.hold_closes();
    let disp = dispatcher(gw.clone(), RecordingNotifier::new());
    let chat = ChannelId::new("chat-1");

    disp.handle("/open BTCUSDT", &chat).await;
    gate.entered.notified().await;

    let (reply, _) = tokio::join!(disp.handle("/close BTCUSDT", &chat), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.release.notify_one();
    });

    assert_eq!(reply, "BTCUSDT: already closed by the follower");
    assert_eq!(gw.placed_of(OrderType::Market).iter().filter(|o| o.reduce_only).count(), 1);
    assert!(!gw.calls().contains(&Call::Close("BTCUSDT".into())));
}

#[tokio::test]
async fn show_lists_open_positions_with_their_trigger() {
    let gw = ScriptedGateway::new();
    let disp = dispatcher(gw.clone(), RecordingNotifier::new());
    assert_eq!(disp.handle("/show", &ChannelId::new("c")).await, "There are no open positions");

    let mut eth = long_at("2");
    eth.symbol = "ETHUSDT".into();
    gw.set_listed(vec![eth, flat()]);
    let shown = disp.handle("/show", &ChannelId::new("c")).await;
    assert!(shown.contains("symbol: ETHUSDT"));
    assert!(!shown.contains("***"));
    assert!(gw.calls().contains(&Call::ListPositions("USDT".into())));
}

#[tokio::test]
async fn show_adds_the_monitor_view_of_followed_positions() {
    let gw = ScriptedGateway::with_snapshots(vec![flat(), long_at("1")]);
    gw.set_listed(vec![long_at("1")]);
    let disp = dispatcher(gw.clone(), RecordingNotifier::new());

    disp.handle("/open BTCUSDT", &ChannelId::new("c")).await;
    wait_until(|| gw.polls() >= 3).await;

    let shown = disp.handle("/show", &ChannelId::new("c")).await;
    assert!(shown.contains("symbol: BTCUSDT"), "{shown}");
    assert!(shown.contains("stopLoss: -8%"), "{shown}");
    disp.shutdown().await;
}

#[tokio::test]
async fn help_and_bad_commands_answer_with_text() {
    let disp = dispatcher(ScriptedGateway::new(), RecordingNotifier::new());
    let chat = ChannelId::new("c");

    assert!(disp.handle("/start", &chat).await.contains("/open BTCUSDT"));
    assert!(disp.handle("/open", &chat).await.starts_with("usage"));
    assert!(disp.handle("/sell BTCUSDT", &chat).await.contains("unknown command"));
}

#[tokio::test]
async fn shutdown_stops_every_monitor() {
    let gw = ScriptedGateway::with_snapshots(vec![flat(), long_at("1")]);
    let disp = dispatcher(gw.clone(), RecordingNotifier::new());
    disp.handle("/open BTCUSDT", &ChannelId::new("c")).await;
    wait_until(|| gw.polls() >= 2).await;

    tokio::time::timeout(Duration::from_secs(5), disp.shutdown())
        .await
        .expect("shutdown must finish");
    let polls = gw.polls();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(gw.polls(), polls);
}
