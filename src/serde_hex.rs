// We define in our crate:
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use ed25519_dalek::PublicKey;
use ed25519_dalek::Signature;
use std::borrow::Cow;

pub use hex_buffer_serde::Hex;
// a single-purpose type for use in `#[serde(with)]`
pub enum EdPublicKeyHex {}

impl Hex<PublicKey> for EdPublicKeyHex {
    type Error = String;

    fn create_bytes(public_key: &PublicKey) -> Cow<[u8]> {
        public_key.as_ref().into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<PublicKey, String> {
        PublicKey::from_bytes(bytes).map_err(|e| format!("{}", e))
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum EdSignatureHex {}

impl Hex<Signature> for EdSignatureHex {
    type Error = String;

    fn create_bytes(sig: &Signature) -> Cow<[u8]> {
        let bytes = sig.to_bytes().to_vec();
        Cow::from(bytes)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Signature, String> {
        Signature::from_bytes(bytes).map_err(|e| format!("{}", e))
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum RistrettoHex {}

impl Hex<RistrettoPoint> for RistrettoHex {
    type Error = String;

    fn create_bytes(point: &RistrettoPoint) -> Cow<[u8]> {
        Cow::from(point.compress().to_bytes().to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> Result<RistrettoPoint, String> {
        if bytes.len() != 32 {
            return Err("ristretto point must be 32 bytes".to_string());
        }
        CompressedRistretto::from_slice(bytes)
            .decompress()
            .ok_or_else(|| "invalid ristretto point encoding".to_string())
    }
}

/// Decode a hex-encoded compressed ristretto point (the wire form of
/// ciphertext components and partial decryptions).
pub fn point_from_hex(s: &str) -> Result<RistrettoPoint, crate::Error> {
    let bytes = hex::decode(s).map_err(|e| crate::Error::MalformedPoint(format!("{}", e)))?;
    <RistrettoHex as Hex<RistrettoPoint>>::from_bytes(&bytes).map_err(crate::Error::MalformedPoint)
}

pub fn point_to_hex(point: &RistrettoPoint) -> String {
    hex::encode(point.compress().to_bytes())
}
