use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

/// Computes the handshake signature the platform attaches to `GET /weixin`.
///
/// The token, timestamp and nonce are sorted lexicographically, concatenated
/// and hashed with SHA-1; the digest is returned as lowercase hex. Values are
/// hashed exactly as received.
pub fn compute_signature(token: &str, timestamp: &str, nonce: &str) -> String {
    let mut parts = [token, timestamp, nonce];
    parts.sort_unstable();

    let mut sha = Sha1::new();
    sha.update(parts.concat());
    hex::encode(sha.finalize())
}

/// Returns `true` when `signature` matches the one derived from `token`.
pub fn verify_signature(token: &str, signature: &str, timestamp: &str, nonce: &str) -> bool {
    let supplied = signature.trim().to_ascii_lowercase();
    if supplied.is_empty() {
        return false;
    }
    let expected = compute_signature(token, timestamp, nonce);
    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}
