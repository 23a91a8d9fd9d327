use sha2::{Digest, Sha512};

/// Computes the `sign` header: hex encoded SHA-512 of `app_id`, `app_secret` and the decimal
/// `timestamp` concatenated without separators.
pub fn sign(app_id: &str, app_secret: &str, timestamp: i64) -> String {
    let mut hasher = Sha512::new();
    hasher.update(app_id.as_bytes());
    hasher.update(app_secret.as_bytes());
    hasher.update(timestamp.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
