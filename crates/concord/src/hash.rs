//! Salted PBKDF2 hashes of local secret digests.
//!
//! The password material is the lowercase hex rendering of the local
//! digest, not its raw bytes. It lives in a `Zeroizing` guard and is
//! overwritten on every exit path.
//!
//! Published wire format: `base64url(salt) ":" base64(hash)`.

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;
use zeroize::Zeroizing;

use concord_common::constants::{HASH_LENGTH_BYTES, PBKDF2_ITERATIONS, SALT_LENGTH_BYTES};
use concord_common::{ConcordError, PublishedEntry, Result};

/// Derive the verification hash for `digest` under `salt`.
///
/// PBKDF2-HMAC-SHA512, 5000 iterations, 512-bit output. Deterministic for a
/// given `(digest, salt)` pair.
pub fn salted_hash(digest: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; HASH_LENGTH_BYTES]>> {
    let mut password = Zeroizing::new(vec![0u8; digest.len() * 2]);
    hex::encode_to_slice(digest, &mut password[..])
        .map_err(|e| ConcordError::Derivation(format!("cannot encode password material: {e}")))?;

    let mut key = Zeroizing::new([0u8; HASH_LENGTH_BYTES]);
    pbkdf2_hmac::<Sha512>(&password[..], salt, PBKDF2_ITERATIONS, &mut key[..]);
    Ok(key)
}

/// Generate a fresh random salt
pub fn random_salt() -> [u8; SALT_LENGTH_BYTES] {
    let mut salt = [0u8; SALT_LENGTH_BYTES];
    rand::Rng::fill(&mut rand::rng(), &mut salt);
    salt
}

/// Salt and hash `digest`, producing an entry ready to publish
pub fn publish_entry(digest: &[u8]) -> Result<PublishedEntry> {
    let salt = random_salt();
    let hash = salted_hash(digest, &salt)?;
    Ok(PublishedEntry::new(
        URL_SAFE_NO_PAD.encode(salt),
        STANDARD.encode(&hash[..]),
    ))
}

/// Decode the salt text of a published entry.
///
/// Returns `None` if the text is not valid unpadded URL-safe base64.
pub fn decode_salt(salt: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(salt).ok()
}

/// Recompute the base64 hash of `digest` under an already decoded salt
pub fn encoded_hash(digest: &[u8], salt: &[u8]) -> Result<String> {
    let hash = salted_hash(digest, salt)?;
    Ok(STANDARD.encode(&hash[..]))
}

/// Check that the PBKDF2-HMAC-SHA512 primitive yields the expected output.
///
/// Run once when the service is constructed.
pub fn self_test() -> Result<()> {
    let first = salted_hash(b"self-test", b"salt")?;
    let second = salted_hash(b"self-test", b"salt")?;
    if first.iter().all(|b| *b == 0) || first[..] != second[..] {
        return Err(ConcordError::MissingAlgorithm("PBKDF2WithHmacSHA512"));
    }
    Ok(())
}
