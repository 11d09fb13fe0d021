//! SASL DIGEST-MD5 (RFC 2831) and the Base64 helpers it needs.
//!
//! Only the pieces an XMPP client uses are here: parsing the server
//! challenge, computing the response digest for `qop=auth`, and wrapping
//! the response in Base64.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::prelude::*;
use md5::{Digest, Md5};
use rand::Rng;

use crate::ProtocolError;

/// Mechanism name offered in `<auth mechanism='...'>`.
pub const MECHANISM_DIGEST_MD5: &str = "DIGEST-MD5";

/// Nonce count for the single response a client ever sends.
const NONCE_COUNT: &str = "00000001";

/// Standard-alphabet decoder that tolerates missing padding and stray
/// trailing bits.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Encodes bytes as padded standard Base64.
pub fn base64_encode(data: &[u8]) -> String {
    BASE64_STANDARD.encode(data)
}

/// Decodes Base64 leniently.
///
/// Characters outside the alphabet (line breaks, spaces) are ignored and
/// decoding stops at the first `=`. A dangling sixth-bit group that
/// cannot form a byte is dropped.
pub fn base64_decode(text: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut clean: String = text
        .chars()
        .take_while(|&c| c != '=')
        .filter(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '/')
        .collect();
    if clean.len() % 4 == 1 {
        clean.pop();
    }
    LENIENT
        .decode(clean)
        .map_err(|e| ProtocolError::InvalidSasl(e.to_string()))
}

/// Decodes a Base64 challenge into text.
pub fn decode_challenge(text: &str) -> Result<String, ProtocolError> {
    let bytes = base64_decode(text)?;
    String::from_utf8(bytes).map_err(|e| ProtocolError::InvalidSasl(e.to_string()))
}

/// Extracts `key=value` from a decoded DIGEST-MD5 challenge.
///
/// The value may be quoted or bare and ends at the next `"` or `,`. A
/// value that never terminates runs to the end of the text. The key must
/// start the text or follow a separator, so `nonce` does not match
/// inside `cnonce`.
pub fn challenge_param(challenge: &str, key: &str) -> Option<String> {
    let needle = format!("{key}=");
    let mut from = 0;
    while let Some(offset) = challenge[from..].find(&needle) {
        let start = from + offset;
        let at_boundary = challenge[..start]
            .chars()
            .next_back()
            .is_none_or(|c| c == ',' || c.is_whitespace());
        if at_boundary {
            let rest = &challenge[start + needle.len()..];
            let rest = rest.strip_prefix('"').unwrap_or(rest);
            let end = rest.find(['"', ',']).unwrap_or(rest.len());
            return Some(rest[..end].to_owned());
        }
        from = start + needle.len();
    }
    None
}

/// Inputs to the DIGEST-MD5 response computation.
#[derive(Debug, Clone, Copy)]
pub struct DigestParams<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub realm: &'a str,
    pub nonce: &'a str,
    pub cnonce: &'a str,
    pub digest_uri: &'a str,
}

/// Computes the 32-char lowercase hex `response` value for `qop=auth`.
///
/// ```text
/// X   = MD5(user ":" realm ":" pass)              raw 16 bytes
/// HA1 = hex(MD5(X ":" nonce ":" cnonce))
/// HA2 = hex(MD5("AUTHENTICATE:" digest-uri))
/// response = hex(MD5(HA1 ":" nonce ":00000001:" cnonce ":auth:" HA2))
/// ```
pub fn digest_response_hex(params: &DigestParams<'_>) -> String {
    let mut hasher = Md5::new();
    hasher.update(params.username.as_bytes());
    hasher.update(b":");
    hasher.update(params.realm.as_bytes());
    hasher.update(b":");
    hasher.update(params.password.as_bytes());
    let secret = hasher.finalize();

    let mut hasher = Md5::new();
    hasher.update(secret);
    hasher.update(b":");
    hasher.update(params.nonce.as_bytes());
    hasher.update(b":");
    hasher.update(params.cnonce.as_bytes());
    let ha1 = hex::encode(hasher.finalize());

    let ha2 = hex::encode(Md5::digest(
        format!("AUTHENTICATE:{}", params.digest_uri).as_bytes(),
    ));

    hex::encode(Md5::digest(
        format!(
            "{ha1}:{}:{NONCE_COUNT}:{}:auth:{ha2}",
            params.nonce, params.cnonce
        )
        .as_bytes(),
    ))
}

/// Builds the Base64 payload for the client's `<response>` to the first
/// challenge.
pub fn digest_response(params: &DigestParams<'_>) -> String {
    let text = format!(
        "username=\"{}\",realm=\"{}\",nonce=\"{}\",nc={NONCE_COUNT},cnonce=\"{}\",\
         qop=auth,digest-uri=\"{}\",response=\"{}\",charset=utf-8",
        params.username,
        params.realm,
        params.nonce,
        params.cnonce,
        params.digest_uri,
        digest_response_hex(params),
    );
    base64_encode(text.as_bytes())
}

/// Generates a fresh client nonce: 128 random bits as lowercase hex.
pub fn generate_cnonce() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfc2831_params() -> DigestParams<'static> {
        DigestParams {
            username: "chris",
            password: "secret",
            realm: "elwood.innosoft.com",
            nonce: "OA6MG9tEQGm2hh",
            cnonce: "OA6MHXh6VqTrRk",
            digest_uri: "imap/elwood.innosoft.com",
        }
    }

    #[test]
    fn test_digest_response_hex_matches_rfc2831_example() {
        assert_eq!(
            digest_response_hex(&rfc2831_params()),
            "d388dad90d4bbd760a152321f2143af7"
        );
    }

    #[test]
    fn test_digest_response_contains_all_fields() {
        let payload = digest_response(&rfc2831_params());
        let text = decode_challenge(&payload).expect("decode");
        assert_eq!(
            text,
            "username=\"chris\",realm=\"elwood.innosoft.com\",\
             nonce=\"OA6MG9tEQGm2hh\",nc=00000001,cnonce=\"OA6MHXh6VqTrRk\",\
             qop=auth,digest-uri=\"imap/elwood.innosoft.com\",\
             response=\"d388dad90d4bbd760a152321f2143af7\",charset=utf-8"
        );
    }

    #[test]
    fn test_base64_encode_known_values() {
        assert_eq!(base64_encode(b""), "");
        assert_eq!(base64_encode(b"f"), "Zg==");
        assert_eq!(base64_encode(b"fo"), "Zm8=");
        assert_eq!(base64_encode(b"foo"), "Zm9v");
        assert_eq!(base64_encode(b"foobar"), "Zm9vYmFy");
    }

    #[test]
    fn test_base64_decode_ignores_noise_and_padding() {
        assert_eq!(base64_decode("Zm9v\r\nYmFy").expect("decode"), b"foobar");
        assert_eq!(base64_decode("Zm8=").expect("decode"), b"fo");
        assert_eq!(base64_decode("Zm8").expect("decode"), b"fo");
        assert_eq!(base64_decode("Zg==garbage").expect("decode"), b"f");
    }

    #[test]
    fn test_base64_decode_drops_dangling_char() {
        assert_eq!(base64_decode("Zm9vY").expect("decode"), b"foo");
    }

    #[test]
    fn test_challenge_param_quoted_and_bare() {
        let challenge =
            "realm=\"example.org\",nonce=\"abc123\",qop=\"auth\",charset=utf-8,algorithm=md5-sess";
        assert_eq!(challenge_param(challenge, "nonce").as_deref(), Some("abc123"));
        assert_eq!(challenge_param(challenge, "realm").as_deref(), Some("example.org"));
        assert_eq!(challenge_param(challenge, "charset").as_deref(), Some("utf-8"));
        assert_eq!(challenge_param(challenge, "algorithm").as_deref(), Some("md5-sess"));
        assert_eq!(challenge_param(challenge, "missing"), None);
    }

    #[test]
    fn test_challenge_param_unterminated_runs_to_end() {
        assert_eq!(challenge_param("nonce=\"xyz", "nonce").as_deref(), Some("xyz"));
    }

    #[test]
    fn test_challenge_param_skips_suffix_matches() {
        let text = "cnonce=\"client\",nonce=\"server\"";
        assert_eq!(challenge_param(text, "nonce").as_deref(), Some("server"));
    }

    #[test]
    fn test_generate_cnonce_is_hex_and_unique() {
        let a = generate_cnonce();
        let b = generate_cnonce();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
