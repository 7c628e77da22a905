//! Shared helper functions.

use rand::Rng;

/// Random lowercase hex string, `bytes` bytes of entropy.
pub(crate) fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    hex::encode(buf)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_hex_length_and_charset() {
        let token = random_hex(32);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_random_hex_is_not_constant() {
        assert_ne!(random_hex(16), random_hex(16));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Bob@X.COM "), "bob@x.com");
    }
}
