use sealchat_crypto::{CryptoError, codec};

#[test]
fn non_utf8_bytes_roundtrip() {
    let bytes = [0xff, 0xfe, 0x00, 0xc3, 0x28, 0x80];
    assert_eq!(codec::decode(&codec::encode(bytes)).unwrap(), bytes);
}

#[test]
fn padding_is_preserved() {
    for len in 0..8 {
        let bytes = vec![0x5a; len];
        let text = codec::encode(&bytes);
        assert_eq!(text.len() % 4, 0, "length {len} produced unpadded {text}");
        assert_eq!(codec::decode(&text).unwrap(), bytes);
    }
}

#[test]
fn out_of_alphabet_rejected() {
    for text in ["ab$d", "aGVsbG8", "aGVs\nbG8=", "====", "a"] {
        assert!(
            matches!(codec::decode(text), Err(CryptoError::MalformedInput(_))),
            "{text:?} should be rejected"
        );
    }
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn decode_inverts_encode(bytes in proptest::collection::vec(any::<u8>(), 0..1024)) {
            prop_assert_eq!(codec::decode(&codec::encode(&bytes)).unwrap(), bytes);
        }
    }
}
