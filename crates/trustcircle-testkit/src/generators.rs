//! Proptest generators for property-based testing.

use proptest::prelude::*;

use trustcircle_core::{EncryptionPublicKey, Keypair, PeerId, PermanentInfo};
use trustcircle_sync::keys::{CIRCLE_PREFIX, MARKER_PREFIX, PARAMETERS_PREFIX, RETIREMENT_PREFIX};
use trustcircle_sync::KeyKind;

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a peer id that is safe inside any key.
pub fn peer_id() -> impl Strategy<Value = PeerId> {
    "[a-z0-9-]{1,24}".prop_map(PeerId::new)
}

/// Generate a circle name that does not start with a reserved prefix.
pub fn circle_name() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_ .]{0,16}".prop_filter("reserved prefix", |s| {
        !s.starts_with([CIRCLE_PREFIX, RETIREMENT_PREFIX, PARAMETERS_PREFIX, MARKER_PREFIX])
    })
}

/// Generate a hardware model id.
pub fn model_id() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Mac14,2".to_owned()),
        Just("iPhone15,3".to_owned()),
        Just("Watch6,1".to_owned()),
        "[A-Za-z]{1,8}[0-9]{1,2},[0-9]".prop_map(String::from),
    ]
}

/// Generate a well-formed PermanentInfo with a derived peer id.
pub fn permanent_info() -> impl Strategy<Value = PermanentInfo> {
    (any::<[u8; 32]>(), any::<[u8; 32]>(), model_id(), 0u64..4).prop_map(
        |(seed, encryption, model_id, epoch)| {
            let keypair = Keypair::from_seed(&seed);
            PermanentInfo::new(
                model_id,
                keypair.public_key(),
                EncryptionPublicKey::from_bytes(encryption),
                epoch,
            )
        },
    )
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate any key kind other than `Unknown`.
pub fn key_kind() -> impl Strategy<Value = KeyKind> {
    prop_oneof![
        circle_name().prop_map(|circle| KeyKind::Circle { circle }),
        (circle_name(), peer_id()).prop_map(|(circle, peer)| KeyKind::Retirement { circle, peer }),
        (circle_name(), peer_id(), peer_id())
            .prop_map(|(circle, from, to)| KeyKind::Message { circle, from, to }),
        Just(KeyKind::KeyParameters),
        Just(KeyKind::InitialSync),
        Just(KeyKind::AccountChanged),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustcircle_sync::classify;

    proptest! {
        #[test]
        fn test_key_round_trip(kind in key_kind()) {
            let key = kind.to_key().unwrap();
            prop_assert_eq!(classify(&key), kind);
        }

        #[test]
        fn test_permanent_info_validates(info in permanent_info()) {
            prop_assert!(info.validate().is_ok());
        }

        #[test]
        fn test_peer_id_derivation_deterministic(seed in any::<[u8; 32]>(), enc in any::<[u8; 32]>()) {
            let keypair = Keypair::from_seed(&seed);
            let a = PeerId::derive(&keypair.public_key(), &EncryptionPublicKey::from_bytes(enc));
            let b = PeerId::derive(&keypair.public_key(), &EncryptionPublicKey::from_bytes(enc));
            prop_assert_eq!(a, b);
        }
    }
}
