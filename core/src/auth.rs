use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate a session token. Returns `(full_token, sha256_hash)`.
/// Format: `curio_st_` + 32 random bytes hex-encoded.
pub fn generate_session_token() -> (String, String) {
    let raw = random_hex(32);
    let full_token = format!("curio_st_{raw}");
    let hash = hash_token(&full_token);
    (full_token, hash)
}

/// SHA-256 hex digest of a token string.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of two hex digests.
pub fn digests_match(left: &str, right: &str) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.bytes()
        .zip(right.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn random_hex(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    let buf: Vec<u8> = (0..bytes).map(|_| rng.r#gen::<u8>()).collect();
    hex::encode(buf)
}
