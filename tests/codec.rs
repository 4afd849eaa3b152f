use proptest::prelude::*;
use ttl_schemes::codec::Alphabet;
use ttl_schemes::codec::ReversibleIdCodec;
use ttl_schemes::codec::BASE62_SYMBOLS;
use ttl_schemes::error::CodecError;

#[test]
fn first_ten_thousand_ids() {
    let codec = ReversibleIdCodec::default();
    let mut previous = 0u128;
    for raw in 1..=10_000u64 {
        let code = codec.encode(raw).unwrap();
        assert!(code.len() >= 6, "{raw} -> {code}");
        assert_eq!(codec.decode(&code), Some(raw), "{raw} -> {code}");
        // Codes grow with the id.
        let prepared = codec.prepare(raw).unwrap();
        assert!(prepared > previous);
        previous = prepared;
    }
}

#[test]
fn smallest_id() {
    let codec = ReversibleIdCodec::default();
    assert_eq!(codec.encode(1).unwrap(), "100000");
    assert_eq!(codec.decode("100000"), Some(1));
    assert_eq!(codec.decode("000000"), None);
    assert_eq!(codec.encode(0), Err(CodecError::ZeroId));
}

#[test]
fn other_alphabets() {
    let codec = ReversibleIdCodec::new(Alphabet::base52(), 6).unwrap();
    for raw in [1u64, 2, 52, 1_000_000] {
        let code = codec.encode(raw).unwrap();
        assert!(code.chars().all(|c| c.is_ascii_alphabetic()));
        assert_eq!(codec.decode(&code), Some(raw));
    }

    let hex = ReversibleIdCodec::new(Alphabet::new("0123456789abcdef").unwrap(), 4).unwrap();
    assert_eq!(hex.encode(1).unwrap(), "1000");
    assert_eq!(hex.encode(3).unwrap(), "1004");
    assert_eq!(hex.decode("1004"), Some(3));
    assert_eq!(hex.decode("1003"), None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn round_trip(raw in 1u64..) {
        let codec = ReversibleIdCodec::default();
        let code = codec.encode(raw).unwrap();
        prop_assert!(code.len() >= 6);
        prop_assert_eq!(codec.decode(&code), Some(raw));
    }

    #[test]
    fn forged_codes_never_panic(code in "\\PC{0,30}") {
        let codec = ReversibleIdCodec::default();
        if let Some(raw) = codec.decode(&code) {
            // Anything accepted must be exactly what encode produces.
            prop_assert_eq!(codec.encode(raw).unwrap(), code);
        }
    }

    #[test]
    fn alphabet_codes_decode_to_their_encoding(code in "[0-9A-Za-z]{1,24}") {
        let codec = ReversibleIdCodec::default();
        match codec.decode(&code) {
            Some(raw) => prop_assert_eq!(codec.encode(raw).unwrap(), code),
            None => prop_assert!(
                code.starts_with('0')
                    || code.chars().any(|c| !BASE62_SYMBOLS.contains(c))
                    || codec.alphabet().decode(&code).and_then(|p| codec.resolve(p)).is_none()
            ),
        }
    }
}
