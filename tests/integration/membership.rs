use std::time::Duration;

use airlock_services::{DiscoveryError, NodeSettings};

use crate::*;

/// R joins through L; afterwards each lists the other.
#[tokio::test]
async fn two_nodes_learn_each_other() -> Result<()> {
    let l = spawn_node("L").await?;
    let r = spawn_joined("R", &l).await?;

    assert!(r.knows(&l), "joiner keeps its bootstrap");
    assert!(wait_for(|| l.knows(&r)).await, "bootstrap never added the joiner");

    assert_eq!(l.node.directory().len(), 1);
    assert_eq!(r.node.directory().len(), 1);
    assert_eq!(
        l.node.directory().get(&r.addr()).unwrap().display_name,
        "R",
        "name comes from the join request"
    );
    Ok(())
}

/// A ← B ← C: C only ever talks to B, yet everyone ends up knowing everyone.
#[tokio::test]
async fn chain_join_spreads_membership() -> Result<()> {
    let a = spawn_node("A").await?;
    let b = spawn_joined("B", &a).await?;
    assert!(wait_for(|| a.knows(&b)).await);

    let c = spawn_joined("C", &b).await?;

    assert!(c.knows(&a) && c.knows(&b), "C learned A from B's reply");
    assert!(wait_for(|| b.knows(&c)).await);
    assert!(wait_for(|| a.knows(&c)).await, "C's join request was not flooded to A");

    for n in [&a, &b, &c] {
        assert_eq!(n.node.directory().len(), 2, "{} has a wrong view", n.node.local().display_name);
    }
    Ok(())
}

/// M and N both join through L; N learns M from L's reply and introduces itself.
#[tokio::test]
async fn shared_bootstrap_introduces_later_joiner() -> Result<()> {
    let l = spawn_node("L").await?;
    let m = spawn_joined("M", &l).await?;
    assert!(wait_for(|| l.knows(&m)).await);

    let n = spawn_joined("N", &l).await?;
    assert!(n.knows(&m), "L's reply to N listed M");

    assert!(wait_for(|| m.knows(&n)).await, "N never introduced itself to M");
    assert!(wait_for(|| l.knows(&n)).await);
    assert!(m.knows(&l));
    Ok(())
}

/// Joining through yourself is refused up front.
#[tokio::test]
async fn self_bootstrap_is_refused() -> Result<()> {
    let l = spawn_node("L").await?;
    let err = l.node.join(l.addr()).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::SelfBootstrap(_)));
    assert!(l.node.directory().is_empty());
    Ok(())
}

/// Nobody listening at the bootstrap: the join times out and nothing is added.
#[tokio::test]
async fn silent_bootstrap_times_out() -> Result<()> {
    let silent = std::net::UdpSocket::bind("127.0.0.1:0")?;
    let bootstrap = PeerAddress::from(silent.local_addr()?);

    let settings = NodeSettings {
        discovery_timeout: Some(Duration::from_millis(200)),
        ..NodeSettings::default()
    };
    let r = spawn_node_with("R", settings).await?;

    let err = r.node.join(bootstrap).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Timeout { .. }));
    assert!(r.node.directory().is_empty());
    Ok(())
}

/// Leave removes the sender everywhere it reaches.
#[tokio::test]
async fn leave_removes_member() -> Result<()> {
    let l = spawn_node("L").await?;
    let r = spawn_joined("R", &l).await?;
    assert!(wait_for(|| l.knows(&r)).await);

    let report = r.node.broadcaster().leave().await;
    assert_eq!(report.sent, 1);

    assert!(wait_for(|| !l.knows(&r)).await, "L still lists R after leave");
    Ok(())
}

/// A heartbeat refreshes the sender's last-seen time.
#[tokio::test]
async fn heartbeat_refreshes_last_seen() -> Result<()> {
    let l = spawn_node("L").await?;

    let settings = NodeSettings {
        heartbeat_interval: Duration::from_millis(50),
        ..test_settings()
    };
    let r = spawn_node_with("R", settings).await?;
    r.node.join(l.addr()).await?;
    assert!(wait_for(|| l.knows(&r)).await);

    let before = l.node.directory().get(&r.addr()).unwrap().last_seen;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let heartbeat = r.node.start_heartbeat();

    let refreshed = wait_for(|| {
        l.node
            .directory()
            .get(&r.addr())
            .is_some_and(|p| p.last_seen > before)
    })
    .await;
    heartbeat.abort();

    assert!(refreshed, "heartbeat did not refresh last_seen");
    Ok(())
}
