//! Issuance → parse → hash flow for prefixed keys

use apikey_codec::{decode, generate, PrefixedKey, TokenError, GLOBAL_PREFIX, SECRET_LENGTH};

fn replace_char(s: &str, index: usize, with: char) -> String {
    s.char_indices()
        .map(|(i, c)| if i == index { with } else { c })
        .collect()
}

/// Pick a replacement that stays inside the segment's alphabet but differs
fn other_hex(c: char) -> char {
    if c == '0' {
        '1'
    } else {
        '0'
    }
}

fn other_alnum(c: char) -> char {
    if c == 'a' {
        'b'
    } else {
        'a'
    }
}

#[test]
fn test_issue_decode_hash_round_trip() {
    let issued = generate("sa").expect("generation should succeed");

    assert!(issued.client_secret.starts_with("glsa_"));

    let key = decode(&issued.client_secret).expect("issued key should decode");
    assert_eq!(key.service_id, "sa");
    assert_eq!(key.secret.len(), SECRET_LENGTH);
    assert_eq!(key.checksum.len(), 8);
    assert!(key.checksum.chars().all(|c| c.is_ascii_hexdigit()));

    assert_eq!(key.hash().expect("hash"), issued.hashed_key);
}

#[test]
fn test_round_trip_other_service_ids() {
    for service_id in ["sa", "ak", "svc"] {
        let issued = generate(service_id).unwrap();
        let key: PrefixedKey = issued.client_secret.parse().unwrap();
        assert_eq!(key.service_id, service_id);
        assert_eq!(key.to_string(), issued.client_secret);
    }
}

#[test]
fn test_hashed_key_does_not_contain_secret() {
    let issued = generate("sa").unwrap();
    let key = decode(&issued.client_secret).unwrap();
    assert!(!issued.hashed_key.contains(&key.secret));
}

#[test]
fn test_two_issuances_differ() {
    let a = generate("sa").unwrap();
    let b = generate("sa").unwrap();
    assert_ne!(a.client_secret, b.client_secret);
    assert_ne!(a.hashed_key, b.hashed_key);
}

#[test]
fn test_every_checksum_character_is_tamper_evident() {
    let issued = generate("sa").unwrap();
    let token = issued.client_secret;
    let checksum_start = token.len() - 8;

    for index in checksum_start..token.len() {
        let original = token.as_bytes()[index] as char;
        let tampered = replace_char(&token, index, other_hex(original));

        let err = decode(&tampered).expect_err("tampered checksum must be rejected");
        assert!(matches!(err, TokenError::InvalidToken { .. }));
    }
}

#[test]
fn test_secret_tampering_without_new_checksum_is_rejected() {
    let issued = generate("sa").unwrap();
    let token = issued.client_secret;
    let secret_start = GLOBAL_PREFIX.len() + "sa_".len();

    for index in secret_start..secret_start + SECRET_LENGTH {
        let original = token.as_bytes()[index] as char;
        let tampered = replace_char(&token, index, other_alnum(original));

        assert!(decode(&tampered).is_err(), "secret flip at {index} accepted");
    }
}

#[test]
fn test_fixture_hash_matches_recomputation() {
    let key = decode("glsa_yscW25imSKJIuav8zF37RZmnbiDvB05G_fcaaf58a").unwrap();

    let rebuilt = PrefixedKey {
        service_id: "sa".to_string(),
        secret: "yscW25imSKJIuav8zF37RZmnbiDvB05G".to_string(),
        checksum: "fcaaf58a".to_string(),
    };

    assert_eq!(key, rebuilt);
    assert_eq!(key.hash().unwrap(), rebuilt.hash().unwrap());
}
