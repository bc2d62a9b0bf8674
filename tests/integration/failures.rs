use crate::*;

use std::time::{Duration, Instant};

// ══════════════════════════════════════════════════════════════════════════════
//  Remote errors, timeouts and send failures
// ══════════════════════════════════════════════════════════════════════════════

fn retrying(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        query_timeout: Some(Duration::from_secs(10)),
        max_retries,
        retry_on_remote_error: true,
    }
}

/// Default policy: a remote error leaves every waiter pending and the cache
/// empty, and only a fresh announcement starts over.
#[test]
fn test_remote_error_starves_all_waiters() -> Result<()> {
    let mut h = Harness::new();
    let mut flaky = SimResponder::new("app", "v1", &["jabber:iq:version"]);
    flaky.errors_first = 1;
    h.add_peer("p1", flaky.clone());
    h.add_peer("p2", flaky);

    h.announce("p1");
    h.announce("p2");
    h.deliver("app#v1")?;

    assert!(h.resolved.is_empty());
    assert!(h.coord.capability_cache().is_empty());
    assert_eq!(h.coord.pending_peers(), 2);
    assert_eq!(h.coord.pending_queries(), 0);

    let stats = h.coord.diagnostics().snapshot();
    assert_eq!(stats.remote_errors, 1);
    assert_eq!(stats.peers_starved, 2);

    // Only p1 re-announces; the fresh query serves it alone.
    h.announce("p1");
    h.deliver("app#v1")?;
    assert_eq!(h.resolved_peers(), vec!["p1"]);
    assert_eq!(h.coord.pending_peers(), 1);
    Ok(())
}

#[test]
fn test_remote_error_retried_when_enabled() -> Result<()> {
    let mut h = Harness::with_policy(retrying(2));
    let mut flaky = SimResponder::new("app", "v1", &["jabber:iq:version"]);
    flaky.errors_first = 2;
    h.add_peer("p1", flaky);

    h.announce("p1");
    h.deliver_all();
    assert!(h.resolved.is_empty());
    h.deliver_all();
    assert!(h.resolved.is_empty());
    h.deliver_all();

    assert_eq!(h.resolved_peers(), vec!["p1"]);
    assert_eq!(h.sent_nodes(), vec!["app#v1", "app#v1", "app#v1"]);
    assert_eq!(h.coord.diagnostics().snapshot().retries, 2);
    Ok(())
}

#[test]
fn test_remote_error_retry_budget_runs_out() {
    let mut h = Harness::with_policy(retrying(1));
    let mut flaky = SimResponder::new("app", "v1", &["jabber:iq:version"]);
    flaky.errors_first = 5;
    h.add_peer("p1", flaky);

    h.announce("p1");
    let delivered = h.deliver_shuffled(7);

    assert_eq!(delivered, 2);
    assert!(h.resolved.is_empty());
    assert_eq!(h.coord.pending_queries(), 0);
    assert_eq!(h.coord.diagnostics().snapshot().peers_starved, 1);
}

#[test]
fn test_silent_responder_times_out_and_retries() -> Result<()> {
    let mut h = Harness::with_policy(retrying(1));
    let mut silent = SimResponder::new("app", "v1", &["jabber:iq:version"]);
    silent.silent = true;
    h.add_peer("p1", silent);

    h.announce("p1");
    h.deliver_all();
    assert_eq!(h.coord.pending_queries(), 1);

    let report = h.coord.expire_stale(Instant::now() + Duration::from_secs(11));
    assert_eq!((report.expired, report.retried), (1, 1));
    assert_eq!(h.sent_nodes(), vec!["app#v1", "app#v1"]);

    // The responder wakes up in time for the resend.
    h.coord
        .transport_mut()
        .responders
        .get_mut(&PeerId::from("p1"))
        .unwrap()
        .silent = false;
    h.deliver("app#v1")?;
    assert_eq!(h.resolved_peers(), vec!["p1"]);
    Ok(())
}

#[test]
fn test_no_timeout_configured_never_expires() {
    let mut h = Harness::new();
    let mut silent = SimResponder::new("app", "v1", &[]);
    silent.silent = true;
    h.add_peer("p1", silent);

    h.announce("p1");
    h.deliver_all();

    let report = h.coord.expire_stale(Instant::now() + Duration::from_secs(3600));
    assert_eq!(report.expired, 0);
    assert_eq!(h.coord.pending_queries(), 1);
    assert!(h.coord.is_peer_pending(&PeerId::from("p1")));
}

#[test]
fn test_unreachable_peer_stays_pending() {
    let mut h = Harness::new();
    h.add_peer("p1", SimResponder::new("app", "v1", &["jabber:iq:version"]));

    // "ghost" has no responder, so the transport refuses to address it.
    let announcement = CapabilityAnnouncement::new("ghost", Fingerprint::new("app", "v1"));
    h.announce_with(announcement);

    assert_eq!(h.coord.pending_queries(), 0);
    assert!(h.coord.is_peer_pending(&PeerId::from("ghost")));
    assert_eq!(h.coord.diagnostics().snapshot().transport_failures, 1);

    // ghost was never a waiter on the query p1 triggers.
    h.announce("p1");
    h.deliver_all();
    assert_eq!(h.resolved_peers(), vec!["p1"]);
    assert!(h.coord.is_peer_pending(&PeerId::from("ghost")));
}

#[test]
fn test_missing_extension_on_responder() {
    let mut h = Harness::new();
    h.add_peer("p1", SimResponder::new("app", "v1", &["jabber:iq:version"]));

    // Announces an extension the responder doesn't know about.
    let announcement = CapabilityAnnouncement::new("p1", Fingerprint::new("app", "v1"))
        .with_extensions(["bogus-ext"]);
    h.announce_with(announcement);
    h.deliver_all();

    assert!(h.resolved.is_empty());
    assert!(h.coord.capability_cache().get(&Fingerprint::new("app", "v1")).is_some());
    assert!(h.coord.is_peer_pending(&PeerId::from("p1")));
    assert_eq!(h.coord.diagnostics().snapshot().remote_errors, 1);
}
