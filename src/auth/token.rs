use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};

/// 256 bits of entropy per token, well past the point where guessing or
/// birthday collisions are a concern.
pub const TOKEN_BYTES: usize = 32;

/// An opaque, URL- and cookie-safe credential token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_have_expected_length() {
        // 32 bytes base64url-unpadded
        assert_eq!(generate_token().len(), 43);
    }

    #[test]
    fn tokens_are_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
    }

    #[test]
    fn tokens_are_cookie_safe() {
        let token = generate_token();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
