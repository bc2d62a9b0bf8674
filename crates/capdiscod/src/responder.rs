//! Answers discovery queries about this daemon's own identity.

use capdisco_core::config::IdentityConfig;
use capdisco_core::wire::{Frame, ITEM_NOT_FOUND};
use capdisco_core::Fingerprint;

/// Build the reply to a `query` frame.
///
/// `node#ver` returns the main feature list, `node#ver#ext` the features of
/// a configured extension. Anything else gets `item-not-found`.
pub fn answer(identity: &IdentityConfig, id: String, node: &str) -> Frame {
    let own = Fingerprint::new(identity.node.as_str(), identity.ver.as_str()).query_node();

    let features = if node == own {
        Some(identity.features.clone())
    } else {
        node.strip_prefix(own.as_str())
            .and_then(|rest| rest.strip_prefix('#'))
            .and_then(|ext| identity.extensions.get(ext))
            .cloned()
    };

    match features {
        Some(features) => Frame::Result {
            id,
            features,
            client_name: Some(identity.client_name.clone()),
        },
        None => {
            tracing::debug!(node, "query for a node we don't serve");
            Frame::Error {
                id,
                condition: ITEM_NOT_FOUND.to_string(),
            }
        }
    }
}
