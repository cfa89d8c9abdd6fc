use rand::{distributions::Alphanumeric, thread_rng, Rng};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Generates a fresh withdrawal request reference, e.g. `WR-4K7KQX2M9PBF`.
pub fn new_request_ref() -> String {
    let suffix = thread_rng().sample_iter(&Alphanumeric).take(12).map(char::from).collect::<String>();
    format!("WR-{}", suffix.to_uppercase())
}

/// Bank transaction references as entered by finance staff. Alphanumeric with the separators
/// banks actually use, between 6 and 64 characters.
pub fn is_valid_transaction_reference(value: &str) -> bool {
    let re = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9/_-]{5,63}$").unwrap();
    re.is_match(value)
}

/// Nigerian NUBAN account numbers are exactly ten digits.
pub fn is_valid_account_number(value: &str) -> bool {
    value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit())
}

/// Admin API keys are stored as lowercase hex SHA-256 digests, never in the clear.
pub fn hash_api_key(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_refs_are_unique_and_well_formed() {
        let a = new_request_ref();
        let b = new_request_ref();
        assert_ne!(a, b);
        assert!(a.starts_with("WR-"));
        assert_eq!(a.len(), 15);
        assert!(a[3..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn transaction_references_are_format_checked() {
        assert!(is_valid_transaction_reference("FT24123456789012"));
        assert!(is_valid_transaction_reference("NIP/2024/0612/000123"));
        assert!(!is_valid_transaction_reference(""));
        assert!(!is_valid_transaction_reference("short"));
        assert!(!is_valid_transaction_reference("has spaces in it"));
        assert!(!is_valid_transaction_reference("/leading-separator"));
    }

    #[test]
    fn account_numbers_are_ten_digits() {
        assert!(is_valid_account_number("0123456789"));
        assert!(!is_valid_account_number("012345678"));
        assert!(!is_valid_account_number("01234567890"));
        assert!(!is_valid_account_number("01234S6789"));
    }

    #[test]
    fn api_keys_hash_to_hex_sha256() {
        let hash = hash_api_key("super-secret-key");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, hash_api_key("super-secret-key"));
        assert_ne!(hash, hash_api_key("other-key"));
    }
}
