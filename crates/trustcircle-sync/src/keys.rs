//! Message key codec.
//!
//! Maps circle names and peer ids onto the flat string key namespace of the
//! external key/value store, and back:
//!
//! | Kind | Key |
//! |---|---|
//! | Circle | `o<circle>` |
//! | Retirement | `-<circle>|<peer>` |
//! | Message | `<circle>|<from>:<to>` |
//! | Key parameters | `>KeyParameters` |
//! | Initial sync | `^InitialSync` |
//! | Account changed | `^AccountChanged` |
//!
//! Classification never fails: anything that does not parse is
//! [`KeyKind::Unknown`].

use trustcircle_core::PeerId;

/// First character of a circle key.
pub const CIRCLE_PREFIX: char = 'o';
/// First character of a retirement key.
pub const RETIREMENT_PREFIX: char = '-';
/// First character of the parameters key.
pub const PARAMETERS_PREFIX: char = '>';
/// First character of marker keys.
pub const MARKER_PREFIX: char = '^';

pub const KEY_PARAMETERS_KEY: &str = ">KeyParameters";
pub const INITIAL_SYNC_KEY: &str = "^InitialSync";
pub const ACCOUNT_CHANGED_KEY: &str = "^AccountChanged";

const CIRCLE_SEPARATOR: char = '|';
const PEER_SEPARATOR: char = ':';

/// A classified store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Circle { circle: String },
    Retirement { circle: String, peer: PeerId },
    Message { circle: String, from: PeerId, to: PeerId },
    KeyParameters,
    InitialSync,
    AccountChanged,
    Unknown,
}

impl KeyKind {
    /// Whether this is a message key whose recipient is `peer`.
    pub fn is_addressed_to(&self, peer: &PeerId) -> bool {
        matches!(self, KeyKind::Message { to, .. } if to == peer)
    }

    /// Rebuild the key string. `None` for `Unknown`.
    pub fn to_key(&self) -> Option<String> {
        Some(match self {
            KeyKind::Circle { circle } => circle_key(circle),
            KeyKind::Retirement { circle, peer } => retirement_key(circle, peer),
            KeyKind::Message { circle, from, to } => message_key(circle, from, to),
            KeyKind::KeyParameters => KEY_PARAMETERS_KEY.to_owned(),
            KeyKind::InitialSync => INITIAL_SYNC_KEY.to_owned(),
            KeyKind::AccountChanged => ACCOUNT_CHANGED_KEY.to_owned(),
            KeyKind::Unknown => return None,
        })
    }
}

/// Classify a store key.
pub fn classify(key: &str) -> KeyKind {
    let Some(first) = key.chars().next() else {
        return KeyKind::Unknown;
    };

    match first {
        CIRCLE_PREFIX => KeyKind::Circle {
            circle: key[first.len_utf8()..].to_owned(),
        },
        RETIREMENT_PREFIX => classify_retirement(&key[first.len_utf8()..]),
        PARAMETERS_PREFIX if key == KEY_PARAMETERS_KEY => KeyKind::KeyParameters,
        MARKER_PREFIX if key == INITIAL_SYNC_KEY => KeyKind::InitialSync,
        MARKER_PREFIX if key == ACCOUNT_CHANGED_KEY => KeyKind::AccountChanged,
        PARAMETERS_PREFIX | MARKER_PREFIX => KeyKind::Unknown,
        _ => classify_message(key),
    }
}

fn classify_retirement(rest: &str) -> KeyKind {
    match rest.rsplit_once(CIRCLE_SEPARATOR) {
        Some((circle, peer)) => KeyKind::Retirement {
            circle: circle.to_owned(),
            peer: PeerId::from(peer),
        },
        None => KeyKind::Unknown,
    }
}

fn classify_message(key: &str) -> KeyKind {
    let Some((circle, peers)) = key.rsplit_once(CIRCLE_SEPARATOR) else {
        return KeyKind::Unknown;
    };
    match peers.rsplit_once(PEER_SEPARATOR) {
        Some((from, to)) if !from.is_empty() => KeyKind::Message {
            circle: circle.to_owned(),
            from: PeerId::from(from),
            to: PeerId::from(to),
        },
        _ => KeyKind::Unknown,
    }
}

/// Key holding a circle's state.
pub fn circle_key(circle: &str) -> String {
    format!("{}{}", CIRCLE_PREFIX, circle)
}

/// Key announcing that `peer` left `circle`.
pub fn retirement_key(circle: &str, peer: &PeerId) -> String {
    format!("{}{}{}{}", RETIREMENT_PREFIX, circle, CIRCLE_SEPARATOR, peer)
}

/// Key carrying coder frames from `from` to `to`.
pub fn message_key(circle: &str, from: &PeerId, to: &PeerId) -> String {
    format!("{}{}{}{}{}", circle, CIRCLE_SEPARATOR, from, PEER_SEPARATOR, to)
}

/// Circle keys for every named circle.
pub fn circle_keys_for<'a>(circles: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    circles.into_iter().map(circle_key).collect()
}

/// Message keys in both directions between `local` and each of `peers`.
pub fn message_keys_between<'a>(
    circle: &str,
    local: &PeerId,
    peers: impl IntoIterator<Item = &'a PeerId>,
) -> Vec<String> {
    peers
        .into_iter()
        .filter(|peer| *peer != local)
        .flat_map(|peer| [message_key(circle, local, peer), message_key(circle, peer, local)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn peer(s: &str) -> PeerId {
        PeerId::from(s)
    }

    #[test]
    fn test_classify_each_kind() {
        assert_eq!(
            classify("oAccount"),
            KeyKind::Circle {
                circle: "Account".into()
            }
        );
        assert_eq!(
            classify("-Account|p1"),
            KeyKind::Retirement {
                circle: "Account".into(),
                peer: peer("p1")
            }
        );
        assert_eq!(
            classify("Account|p1:p2"),
            KeyKind::Message {
                circle: "Account".into(),
                from: peer("p1"),
                to: peer("p2")
            }
        );
        assert_eq!(classify(">KeyParameters"), KeyKind::KeyParameters);
        assert_eq!(classify("^InitialSync"), KeyKind::InitialSync);
        assert_eq!(classify("^AccountChanged"), KeyKind::AccountChanged);
    }

    #[test]
    fn test_malformed_is_unknown() {
        for key in [
            "",
            ">Other",
            "^Other",
            "^InitialSyncX",
            "-Account",
            "Account",
            "Account|p1",
            "Account|:p2",
            "no-separator:here",
        ] {
            assert_eq!(classify(key), KeyKind::Unknown, "key {:?}", key);
        }
    }

    #[test]
    fn test_message_splits_on_last_separators() {
        assert_eq!(
            classify("a|b|c:d:e"),
            KeyKind::Message {
                circle: "a|b".into(),
                from: peer("c:d"),
                to: peer("e")
            }
        );
        assert_eq!(
            classify("-a|b|c"),
            KeyKind::Retirement {
                circle: "a|b".into(),
                peer: peer("c")
            }
        );
    }

    #[test]
    fn test_is_addressed_to() {
        let kind = classify(&message_key("c", &peer("a"), &peer("b")));
        assert!(kind.is_addressed_to(&peer("b")));
        assert!(!kind.is_addressed_to(&peer("a")));
        assert!(!classify("oc").is_addressed_to(&peer("b")));
    }

    #[test]
    fn test_message_keys_between_both_directions() {
        let local = peer("me");
        let others = [peer("a"), peer("me"), peer("b")];
        let keys = message_keys_between("c", &local, &others);
        assert_eq!(keys, ["c|me:a", "c|a:me", "c|me:b", "c|b:me"]);
    }

    #[test]
    fn test_circle_keys_for() {
        assert_eq!(circle_keys_for(["A", "B"]), ["oA", "oB"]);
    }

    #[test]
    fn test_unknown_has_no_key() {
        assert_eq!(KeyKind::Unknown.to_key(), None);
    }

    fn circle_name() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_ .]{0,12}".prop_filter("reserved prefix", |s| {
            !s.starts_with([CIRCLE_PREFIX, RETIREMENT_PREFIX, PARAMETERS_PREFIX, MARKER_PREFIX])
        })
    }

    fn peer_id() -> impl Strategy<Value = PeerId> {
        "[a-z0-9-]{1,16}".prop_map(PeerId::new)
    }

    proptest! {
        #[test]
        fn prop_message_round_trip(circle in circle_name(), from in peer_id(), to in peer_id()) {
            let key = message_key(&circle, &from, &to);
            let kind = classify(&key);
            prop_assert_eq!(&kind, &KeyKind::Message { circle, from, to });
            prop_assert_eq!(kind.to_key(), Some(key));
        }

        #[test]
        fn prop_retirement_round_trip(circle in circle_name(), peer in peer_id()) {
            let key = retirement_key(&circle, &peer);
            prop_assert_eq!(classify(&key), KeyKind::Retirement { circle, peer });
        }

        #[test]
        fn prop_circle_round_trip(circle in "[^|]{0,12}") {
            prop_assert_eq!(classify(&circle_key(&circle)), KeyKind::Circle { circle });
        }

        #[test]
        fn prop_classify_never_panics(key in ".{0,40}") {
            let _ = classify(&key);
        }
    }
}
