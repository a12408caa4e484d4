//! Claim token generation.
//!
//! A claim token is minted every time a command is handed to a device and is
//! the sole proof of ownership for extending or completing that claim. Tokens
//! are single-use in practice: a re-queued command gets a fresh token on its
//! next claim, which silently invalidates the old one.

use rand::Rng;

/// Number of random bytes in a claim token (hex-encoded to twice this length).
const CLAIM_TOKEN_BYTES: usize = 16;

/// Generates a random claim token (16 bytes, hex encoded).
pub fn generate_claim_token() -> String {
    let bytes: [u8; CLAIM_TOKEN_BYTES] = rand::thread_rng().gen();
    hex::encode(bytes)
}
