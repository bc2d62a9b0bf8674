use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Resolution scenarios
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_single_peer_main_set() -> Result<()> {
    let mut h = Harness::new();
    h.add_peer("p1", SimResponder::new("app", "v1", &["jabber:iq:version"]));

    h.announce("p1");
    assert!(h.resolved.is_empty(), "resolved before any response");
    assert_eq!(h.sent_nodes(), vec!["app#v1"]);

    h.deliver("app#v1")?;
    assert_eq!(h.resolved_peers(), vec!["p1"]);
    assert_eq!(supported(&h.resolved[0]), vec!["version"]);
    assert_eq!(h.coord.pending_peers(), 0);
    assert_eq!(h.coord.pending_queries(), 0);
    Ok(())
}

#[test]
fn test_many_peers_one_query() -> Result<()> {
    let mut h = Harness::new();
    let peers: Vec<String> = (0..20).map(|i| format!("p{i}")).collect();
    for peer in &peers {
        h.add_peer(peer, SimResponder::new("app", "v1", &["urn:xmpp:ping"]));
    }

    for peer in &peers {
        h.announce(peer);
    }
    assert_eq!(h.sent_nodes(), vec!["app#v1"]);

    h.deliver_all();
    assert_eq!(h.resolved.len(), peers.len());
    for peer in &peers {
        let event = h.resolved_for(peer).expect("every peer resolves");
        assert!(event.capabilities.supports("ping"));
    }

    let stats = h.coord.diagnostics().snapshot();
    assert_eq!(stats.queries_sent, 1);
    assert_eq!(stats.requests_coalesced, peers.len() as u64 - 1);
    Ok(())
}

#[test]
fn test_cached_main_only_extension_queried() -> Result<()> {
    let mut h = Harness::new();
    let responder = SimResponder::new("app", "v1", &["jabber:iq:version", "urn:xmpp:ping"])
        .with_extension("ext1", &["urn:xmpp:ping", "urn:xmpp:receipts"]);
    h.add_peer("p0", responder.clone());
    h.add_peer("p1", responder);

    // p0 advertises no extensions, so its cycle caches only the main set.
    let plain = CapabilityAnnouncement::new("p0", Fingerprint::new("app", "v1"));
    h.announce_with(plain);
    h.deliver("app#v1")?;
    assert_eq!(h.resolved_peers(), vec!["p0"]);

    h.announce("p1");
    assert_eq!(h.sent_nodes(), vec!["app#v1", "app#v1#ext1"]);

    h.deliver("app#v1#ext1")?;
    assert_eq!(h.resolved_peers(), vec!["p0", "p1"]);
    let event = h.resolved_for("p1").expect("p1 resolves");
    assert_eq!(
        event.capabilities.features,
        vec!["jabber:iq:version", "urn:xmpp:ping", "urn:xmpp:receipts"]
    );
    assert_eq!(supported(event), vec!["ping", "receipts", "version"]);
    Ok(())
}

#[test]
fn test_unknown_correlation_is_ignored() {
    let mut h = Harness::new();
    h.add_peer("p1", SimResponder::new("app", "v1", &["jabber:iq:version"]));
    h.announce("p1");

    h.inject(DiscoveryResponse::features("never-issued", ["jabber:iq:version"]));

    assert!(h.resolved.is_empty());
    assert!(h.coord.capability_cache().is_empty());
    assert_eq!(h.coord.pending_peers(), 1);
    assert_eq!(h.coord.pending_queries(), 1);
    assert_eq!(h.coord.diagnostics().snapshot().responses_discarded, 1);
}

#[test]
fn test_second_wave_resolves_from_cache() -> Result<()> {
    let mut h = Harness::new();
    let responder = SimResponder::new("app", "v1", &["jabber:iq:version"])
        .with_extension("voice-v1", &["http://www.google.com/xmpp/protocol/voice/v1"]);
    h.add_peer("p1", responder.clone());
    h.add_peer("p2", responder);

    h.announce("p1");
    h.deliver_all();
    assert_eq!(h.resolved_peers(), vec!["p1"]);
    let queries_before = h.net().sent.len();

    h.announce("p2");
    assert_eq!(h.resolved_peers(), vec!["p1", "p2"]);
    assert_eq!(h.net().sent.len(), queries_before, "cache hit must not query");
    assert!(h.resolved_for("p2").unwrap().capabilities.supports("voice"));
    Ok(())
}

#[test]
fn test_same_node_different_versions_are_independent() -> Result<()> {
    let mut h = Harness::new();
    h.add_peer("old", SimResponder::new("app", "v1", &["jabber:iq:version"]));
    h.add_peer("new", SimResponder::new("app", "v2", &["jabber:iq:version", "urn:xmpp:ping"]));

    h.announce("old");
    h.announce("new");
    assert_eq!(h.sent_nodes(), vec!["app#v1", "app#v2"]);

    h.deliver("app#v2")?;
    assert_eq!(h.resolved_peers(), vec!["new"]);
    h.deliver("app#v1")?;
    assert_eq!(h.resolved_peers(), vec!["new", "old"]);

    assert!(!h.resolved_for("old").unwrap().capabilities.supports("ping"));
    assert!(h.resolved_for("new").unwrap().capabilities.supports("ping"));
    Ok(())
}

#[test]
fn test_client_name_and_hash_reach_the_application() -> Result<()> {
    let mut h = Harness::new();
    let mut responder = SimResponder::new("app", "v1", &["jabber:iq:version"]);
    responder.client_name = Some("Psi".into());
    h.add_peer("p1", responder);

    let announcement = h.net().responders[&PeerId::from("p1")]
        .announcement("p1")
        .with_hash("sha-1");
    h.announce_with(announcement);
    h.deliver("app#v1")?;

    let caps = &h.resolved_for("p1").unwrap().capabilities;
    assert_eq!(caps.client_name.as_deref(), Some("Psi"));
    assert_eq!(caps.hash.as_deref(), Some("sha-1"));
    Ok(())
}
