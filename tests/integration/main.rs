//! capdisco integration test harness.
//!
//! Drives a real `DiscoveryCoordinator` against a simulated network of
//! responders. Queries are held in flight until a test delivers them, so
//! tests control exactly when and in what order responses arrive.
//!
//!   cargo test --test integration

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use capdisco_core::{
    CapabilityAnnouncement, CorrelationId, DiscoveryResponse, Fingerprint,
    PeerCapabilitiesResolved, PeerId,
};
use capdisco_services::{DiscoveryCoordinator, DiscoveryTransport, RetryPolicy, TransportError};

mod failures;
mod scenarios;

// ── Harness ───────────────────────────────────────────────────────────────────

/// How a simulated peer answers discovery queries.
#[derive(Debug, Clone, Default)]
pub struct SimResponder {
    pub node: String,
    pub ver: String,
    pub features: Vec<String>,
    pub extensions: BTreeMap<String, Vec<String>>,
    pub client_name: Option<String>,
    /// Answer this many queries with an error before answering properly.
    pub errors_first: u32,
    /// Never answer.
    pub silent: bool,
}

impl SimResponder {
    pub fn new(node: &str, ver: &str, features: &[&str]) -> Self {
        Self {
            node: node.to_string(),
            ver: ver.to_string(),
            features: features.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_extension(mut self, ext: &str, features: &[&str]) -> Self {
        self.extensions
            .insert(ext.to_string(), features.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(self.node.as_str(), self.ver.as_str())
    }

    /// The announcement this responder's peer would send.
    pub fn announcement(&self, peer: &str) -> CapabilityAnnouncement {
        CapabilityAnnouncement::new(peer, self.fingerprint())
            .with_extensions(self.extensions.keys().map(String::as_str))
    }

    fn answer(&mut self, id: CorrelationId, node: &str) -> Option<DiscoveryResponse> {
        if self.silent {
            return None;
        }
        if self.errors_first > 0 {
            self.errors_first -= 1;
            return Some(DiscoveryResponse::error(id, "service-unavailable"));
        }

        let main = self.fingerprint().query_node();
        let features = if node == main {
            Some(self.features.clone())
        } else {
            node.strip_prefix(main.as_str())
                .and_then(|rest| rest.strip_prefix('#'))
                .and_then(|ext| self.extensions.get(ext).cloned())
        };

        Some(match features {
            Some(features) => {
                let response = DiscoveryResponse::features(id, features);
                match &self.client_name {
                    Some(name) => response.with_client_name(name.as_str()),
                    None => response,
                }
            }
            None => DiscoveryResponse::error(id, "item-not-found"),
        })
    }
}

/// A query sent but not yet answered.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub id: CorrelationId,
    pub target: PeerId,
    pub node: String,
}

/// Transport that parks queries until the test delivers them.
#[derive(Debug, Default)]
pub struct SimNetwork {
    pub responders: HashMap<PeerId, SimResponder>,
    pub in_flight: Vec<InFlight>,
    pub sent: Vec<InFlight>,
    next_id: u64,
}

impl DiscoveryTransport for SimNetwork {
    fn send_query(&mut self, target: &PeerId, node: &str) -> Result<CorrelationId, TransportError> {
        if !self.responders.contains_key(target) {
            return Err(TransportError::InvalidTarget(target.clone()));
        }
        self.next_id += 1;
        let query = InFlight {
            id: CorrelationId::new(format!("sim-{}", self.next_id)),
            target: target.clone(),
            node: node.to_string(),
        };
        self.in_flight.push(query.clone());
        self.sent.push(query.clone());
        Ok(query.id)
    }
}

pub struct Harness {
    pub coord: DiscoveryCoordinator<SimNetwork>,
    pub resolved: Vec<PeerCapabilitiesResolved>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            coord: DiscoveryCoordinator::with_policy(SimNetwork::default(), policy),
            resolved: Vec::new(),
        }
    }

    pub fn add_peer(&mut self, peer: &str, responder: SimResponder) {
        self.coord
            .transport_mut()
            .responders
            .insert(PeerId::from(peer), responder);
    }

    /// Announce as `peer`, using its responder's fingerprint.
    pub fn announce(&mut self, peer: &str) {
        let announcement = self.net().responders[&PeerId::from(peer)].announcement(peer);
        self.announce_with(announcement);
    }

    pub fn announce_with(&mut self, announcement: CapabilityAnnouncement) {
        let events = self.coord.handle_announcement(announcement);
        self.resolved.extend(events);
    }

    pub fn net(&self) -> &SimNetwork {
        self.coord.transport()
    }

    pub fn sent_nodes(&self) -> Vec<String> {
        self.net().sent.iter().map(|q| q.node.clone()).collect()
    }

    /// Deliver the in-flight query for `node`. Errors if none is in flight.
    pub fn deliver(&mut self, node: &str) -> Result<()> {
        let net = self.coord.transport_mut();
        let Some(pos) = net.in_flight.iter().position(|q| q.node == node) else {
            bail!("no query in flight for {node}");
        };
        let query = net.in_flight.remove(pos);
        self.respond(query);
        Ok(())
    }

    /// Deliver everything in flight, in send order. Returns how many.
    pub fn deliver_all(&mut self) -> usize {
        let queries = std::mem::take(&mut self.coord.transport_mut().in_flight);
        let n = queries.len();
        for query in queries {
            self.respond(query);
        }
        n
    }

    /// Deliver everything in flight in a seeded random order, repeating
    /// until the network is quiet. Returns how many were delivered.
    pub fn deliver_shuffled(&mut self, seed: u64) -> usize {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut total = 0;
        loop {
            let mut queries = std::mem::take(&mut self.coord.transport_mut().in_flight);
            if queries.is_empty() {
                return total;
            }
            queries.shuffle(&mut rng);
            total += queries.len();
            for query in queries {
                self.respond(query);
            }
        }
    }

    /// Feed a response straight to the coordinator.
    pub fn inject(&mut self, response: DiscoveryResponse) {
        let events = self.coord.handle_response(response);
        self.resolved.extend(events);
    }

    fn respond(&mut self, query: InFlight) {
        let response = self
            .coord
            .transport_mut()
            .responders
            .get_mut(&query.target)
            .and_then(|r| r.answer(query.id, &query.node));
        if let Some(response) = response {
            self.inject(response);
        }
    }

    pub fn resolved_peers(&self) -> Vec<&str> {
        self.resolved.iter().map(|r| r.peer.as_str()).collect()
    }

    pub fn resolved_for(&self, peer: &str) -> Option<&PeerCapabilitiesResolved> {
        self.resolved.iter().find(|r| r.peer.as_str() == peer)
    }
}

/// The well-known short names that are true in a resolution.
pub fn supported(event: &PeerCapabilitiesResolved) -> Vec<&str> {
    event
        .capabilities
        .named
        .iter()
        .filter(|(_, on)| **on)
        .map(|(name, _)| name.as_str())
        .collect()
}
