//! Feature translator — raw feature identifiers to short boolean flags.
//!
//! The table is fixed. Several identifiers may map to one short name (the
//! legacy and current namespaces for entity time, say); the flag is true if
//! any of them is present. Identifiers not in the table are kept in the raw
//! feature list but produce no flag.
//!
//! | Identifier                                          | Name            |
//! |-----------------------------------------------------|-----------------|
//! | `http://jabber.org/protocol/caps`                   | `caps`          |
//! | `http://jabber.org/protocol/disco#info`             | `disco_info`    |
//! | `http://jabber.org/protocol/disco#items`            | `disco_items`   |
//! | `jabber:iq:version`                                 | `version`       |
//! | `jabber:iq:last`                                    | `last_activity` |
//! | `jabber:iq:time`, `urn:xmpp:time`                   | `time`          |
//! | `urn:xmpp:ping`                                     | `ping`          |
//! | `http://jabber.org/protocol/muc`                    | `muc`           |
//! | `http://jabber.org/protocol/chatstates`             | `chat_states`   |
//! | `http://jabber.org/protocol/xhtml-im`               | `xhtml`         |
//! | `urn:xmpp:receipts`                                 | `receipts`      |
//! | `http://jabber.org/protocol/si/profile/file-transfer` | `file_transfer` |
//! | `urn:xmpp:jingle:1`                                 | `jingle`        |
//! | `urn:xmpp:jingle:apps:rtp:audio`, `http://www.google.com/xmpp/protocol/voice/v1` | `voice` |
//! | `urn:xmpp:jingle:apps:rtp:video`, `http://www.google.com/xmpp/protocol/video/v1` | `video` |
//! | `http://www.google.com/xmpp/protocol/camera/v1`     | `camera`        |
//! | `vcard-temp`                                        | `vcard`         |
//! | `urn:xmpp:avatar:metadata+notify`                   | `avatar`        |
//! | `http://jabber.org/protocol/nick`                   | `nick`          |

use std::collections::BTreeMap;

/// (identifier, short name) pairs.
pub const FEATURE_TABLE: &[(&str, &str)] = &[
    ("http://jabber.org/protocol/caps", "caps"),
    ("http://jabber.org/protocol/disco#info", "disco_info"),
    ("http://jabber.org/protocol/disco#items", "disco_items"),
    ("jabber:iq:version", "version"),
    ("jabber:iq:last", "last_activity"),
    ("jabber:iq:time", "time"),
    ("urn:xmpp:time", "time"),
    ("urn:xmpp:ping", "ping"),
    ("http://jabber.org/protocol/muc", "muc"),
    ("http://jabber.org/protocol/chatstates", "chat_states"),
    ("http://jabber.org/protocol/xhtml-im", "xhtml"),
    ("urn:xmpp:receipts", "receipts"),
    ("http://jabber.org/protocol/si/profile/file-transfer", "file_transfer"),
    ("urn:xmpp:jingle:1", "jingle"),
    ("urn:xmpp:jingle:apps:rtp:audio", "voice"),
    ("http://www.google.com/xmpp/protocol/voice/v1", "voice"),
    ("urn:xmpp:jingle:apps:rtp:video", "video"),
    ("http://www.google.com/xmpp/protocol/video/v1", "video"),
    ("http://www.google.com/xmpp/protocol/camera/v1", "camera"),
    ("vcard-temp", "vcard"),
    ("urn:xmpp:avatar:metadata+notify", "avatar"),
    ("http://jabber.org/protocol/nick", "nick"),
];

/// Short name for a raw identifier, if it is a well-known feature.
pub fn short_name(feature: &str) -> Option<&'static str> {
    FEATURE_TABLE
        .iter()
        .find(|(id, _)| *id == feature)
        .map(|(_, name)| *name)
}

/// Every short name in the table, sorted and deduplicated.
pub fn feature_names() -> Vec<&'static str> {
    let mut names: Vec<_> = FEATURE_TABLE.iter().map(|(_, name)| *name).collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// Translate raw identifiers into the full named-flag map.
///
/// Every short name is present in the output; absent features map to false.
/// The map is ordered, so equal inputs serialize byte-identically.
pub fn translate_features<S: AsRef<str>>(features: &[S]) -> BTreeMap<String, bool> {
    let mut named: BTreeMap<String, bool> = feature_names()
        .into_iter()
        .map(|name| (name.to_string(), false))
        .collect();

    for feature in features {
        if let Some(name) = short_name(feature.as_ref()) {
            named.insert(name.to_string(), true);
        }
    }
    named
}
