use std::time::Duration;

use airlock_services::{BroadcastEnd, NodeSettings};

use crate::*;

/// A line typed at R shows up at L as "<ip> R > <line>".
#[tokio::test]
async fn chat_reaches_other_member() -> Result<()> {
    let mut l = spawn_node("L").await?;
    let r = spawn_joined("R", &l).await?;

    r.node.broadcaster().say("hello").await;

    let line = l.next_chat().await?;
    assert_eq!(line.name, "R");
    assert_eq!(line.body, "hello");
    assert_eq!(line.to_string(), "127.0.0.1 R > hello");
    Ok(())
}

/// Broadcasting from the bootstrap reaches every member, and nobody hears themself.
#[tokio::test]
async fn chat_fans_out_to_whole_circle() -> Result<()> {
    let mut a = spawn_node("A").await?;
    let mut b = spawn_joined("B", &a).await?;
    let mut c = spawn_joined("C", &b).await?;
    assert!(wait_for(|| a.knows(&c) && a.knows(&b)).await);

    a.node.broadcaster().say("from A").await;

    assert_eq!(b.next_chat().await?.body, "from A");
    assert_eq!(c.next_chat().await?.body, "from A");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(a.chat.try_recv().is_err(), "sender received its own line");
    Ok(())
}

/// The broadcaster loop: chat lines go out, the leave command ends it.
#[tokio::test]
async fn broadcaster_input_then_leave() -> Result<()> {
    let mut l = spawn_node("L").await?;
    let r = spawn_joined("R", &l).await?;
    assert!(wait_for(|| l.knows(&r)).await);

    let end = r
        .node
        .broadcaster()
        .run(&b"first\nsecond\n/quit\n"[..])
        .await?;
    assert_eq!(end, BroadcastEnd::Left);

    assert_eq!(l.next_chat().await?.body, "first");
    assert_eq!(l.next_chat().await?.body, "second");
    assert!(wait_for(|| !l.knows(&r)).await);
    Ok(())
}

/// Idle peers get no chat but stay listed; a heartbeat from them revives them.
#[tokio::test]
async fn idle_peer_skipped_until_heartbeat() -> Result<()> {
    let settings = NodeSettings {
        idle_threshold: Duration::from_millis(100),
        ..test_settings()
    };
    let l = spawn_node_with("L", settings).await?;
    let r_settings = NodeSettings {
        heartbeat_interval: Duration::from_millis(30),
        ..test_settings()
    };
    let mut r = spawn_node_with("R", r_settings).await?;
    r.node.join(l.addr()).await?;
    assert!(wait_for(|| l.knows(&r)).await);

    tokio::time::sleep(Duration::from_millis(250)).await;

    let report = l.node.broadcaster().say("anyone?").await;
    assert_eq!(report.sent, 0);
    assert_eq!(report.skipped, 1);
    assert!(l.knows(&r), "idleness never evicts");

    let heartbeat = r.node.start_heartbeat();
    let revived = wait_for(|| {
        l.node
            .directory()
            .get(&r.addr())
            .is_some_and(|p| p.last_seen.elapsed() < Duration::from_millis(100))
    })
    .await;
    heartbeat.abort();
    assert!(revived, "heartbeat did not refresh R");

    let report = l.node.broadcaster().say("there you are").await;
    assert_eq!(report.sent, 1);
    assert_eq!(r.next_chat().await?.body, "there you are");
    Ok(())
}
