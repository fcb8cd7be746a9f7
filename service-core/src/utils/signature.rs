use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` keyed with `secret`.
pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex HMAC-SHA256 signature using constant-time comparison.
///
/// Hex case is ignored; surrounding whitespace in the supplied signature is not.
pub fn verify_hmac_sha256_hex(
    secret: &str,
    payload: &[u8],
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected = hmac_sha256_hex(secret, payload)?;
    let supplied = signature.to_ascii_lowercase();

    let expected_bytes = expected.as_bytes();
    let signature_bytes = supplied.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let signature = hmac_sha256_hex("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_signature_generation_and_verification() {
        let secret = "my_secret_key";
        let payload = b"order_123|pay_456";

        let signature = hmac_sha256_hex(secret, payload).unwrap();
        assert!(verify_hmac_sha256_hex(secret, payload, &signature).unwrap());
        assert!(verify_hmac_sha256_hex(secret, payload, &signature.to_uppercase()).unwrap());
    }

    #[test]
    fn test_invalid_signature() {
        let secret = "my_secret_key";
        let payload = b"order_123|pay_456";

        let signature = hmac_sha256_hex(secret, payload).unwrap();
        let flipped = format!("{}{}", if signature.starts_with('a') { "b" } else { "a" }, &signature[1..]);

        assert!(!verify_hmac_sha256_hex(secret, payload, &flipped).unwrap());
        assert!(!verify_hmac_sha256_hex(secret, payload, "short").unwrap());
        assert!(!verify_hmac_sha256_hex(secret, payload, "").unwrap());
    }

    #[test]
    fn test_tampered_payload() {
        let secret = "my_secret_key";
        let signature = hmac_sha256_hex(secret, br#"{"event":"payment.captured"}"#).unwrap();

        assert!(
            !verify_hmac_sha256_hex(secret, br#"{"event":"payment.failed"}"#, &signature).unwrap()
        );
        assert!(
            !verify_hmac_sha256_hex("other_secret", br#"{"event":"payment.captured"}"#, &signature)
                .unwrap()
        );
    }
}
