use rand::Rng;
use uuid::Uuid;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random lowercase alphanumeric string, used for temporary queue names.
pub fn random_string(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Hyphen-less v4 uuid, used for job keys and correlation ids.
pub fn random_uuid() -> String {
    Uuid::new_v4().simple().to_string()
}
