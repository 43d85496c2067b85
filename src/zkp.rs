//! Verification of ballot well-formedness proofs.
//!
//! Proofs are produced upstream by a snarkjs/circom toolchain; this module
//! only consumes the artifacts: a `verification_key.json` registered per
//! election and `{pi_a, pi_b, pi_c}` proof objects with decimal-string
//! coordinates. Verification fails closed: anything that cannot be parsed
//! into valid curve points is an error, and only a structurally valid proof
//! that fails the pairing check comes back as `Ok(false)`.

use crate::*;
use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_crypto_primitives::snark::SNARK;
use ark_ec::AffineRepr;
use ark_ff::PrimeField;
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, VerifyingKey};
use num_bigint::BigUint;
use std::collections::HashMap;
use std::str::FromStr;

/// Leading bytes of a WASM witness-generator binary.
pub const WASM_MAGIC: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

/// Leading bytes of a snarkjs proving key (`.zkey`).
pub const ZKEY_MAGIC: [u8; 4] = *b"zkey";

/// A Groth16 proof as produced by snarkjs: G1/G2 points with decimal-string
/// coordinates in projective form (`z` of `1`, or `0` for infinity).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProofJson {
    pub pi_a: [String; 3],
    pub pi_b: [[String; 2]; 3],
    pub pi_c: [String; 3],
}

/// The subset of `verification_key.json` the pairing check needs.
/// Extra fields (`vk_alphabeta_12` and friends) are ignored.
#[derive(Deserialize, Clone)]
pub struct VerificationKeyJson {
    pub protocol: String,
    pub curve: String,

    #[serde(rename = "nPublic")]
    pub n_public: usize,

    pub vk_alpha_1: [String; 3],
    pub vk_beta_2: [[String; 2]; 3],
    pub vk_gamma_2: [[String; 2]; 3],
    pub vk_delta_2: [[String; 2]; 3],

    #[serde(rename = "IC")]
    pub ic: Vec<[String; 3]>,
}

struct RegisteredKey {
    pvk: PreparedVerifyingKey<Bn254>,
    n_public: usize,
}

/// Holds one prepared verification key per election and checks submitted
/// proofs against them. A proof only ever verifies under the key of the
/// election it was generated for.
#[derive(Default)]
pub struct ZkpVerifier {
    keys: HashMap<ElectionId, RegisteredKey>,
}

impl ZkpVerifier {
    pub fn new() -> Self {
        ZkpVerifier::default()
    }

    /// Register an election's verification key from the raw
    /// `verification_key.json` contents.
    pub fn register_key(&mut self, election_id: ElectionId, json: &str) -> Result<(), Error> {
        let parsed: VerificationKeyJson = serde_json::from_str(json)?;

        if parsed.protocol != "groth16" {
            return Err(Error::MalformedVerificationKey(format!(
                "unsupported protocol {:?}",
                parsed.protocol
            )));
        }
        if parsed.curve != "bn128" {
            return Err(Error::MalformedVerificationKey(format!(
                "unsupported curve {:?}",
                parsed.curve
            )));
        }
        if parsed.ic.len() != parsed.n_public + 1 {
            return Err(Error::MalformedVerificationKey(format!(
                "IC length {} inconsistent with nPublic {}",
                parsed.ic.len(),
                parsed.n_public
            )));
        }

        let vk = VerifyingKey::<Bn254> {
            alpha_g1: g1_from_strings(&parsed.vk_alpha_1).map_err(Error::MalformedVerificationKey)?,
            beta_g2: g2_from_strings(&parsed.vk_beta_2).map_err(Error::MalformedVerificationKey)?,
            gamma_g2: g2_from_strings(&parsed.vk_gamma_2).map_err(Error::MalformedVerificationKey)?,
            delta_g2: g2_from_strings(&parsed.vk_delta_2).map_err(Error::MalformedVerificationKey)?,
            gamma_abc_g1: parsed
                .ic
                .iter()
                .map(|p| g1_from_strings(p))
                .collect::<Result<Vec<_>, _>>()
                .map_err(Error::MalformedVerificationKey)?,
        };

        let pvk = Groth16::<Bn254>::process_vk(&vk)
            .map_err(|e| Error::MalformedVerificationKey(format!("{:?}", e)))?;

        self.keys.insert(
            election_id,
            RegisteredKey {
                pvk,
                n_public: parsed.n_public,
            },
        );
        log::info!("registered verification key for election {}", election_id);
        Ok(())
    }

    /// Verify a proof against an election's registered key.
    ///
    /// Deterministic: identical inputs always produce the identical result,
    /// whether checked at cast time or re-checked later by an auditor.
    pub fn verify(
        &self,
        election_id: ElectionId,
        proof: &ProofJson,
        public_signals: &[String],
    ) -> Result<bool, Error> {
        let key = self
            .keys
            .get(&election_id)
            .ok_or(Error::VerificationKeyMissing(election_id))?;

        if public_signals.len() != key.n_public {
            return Err(Error::PublicSignalMismatch {
                expected: key.n_public,
                got: public_signals.len(),
            });
        }

        let parsed = Proof::<Bn254> {
            a: g1_from_strings(&proof.pi_a).map_err(Error::MalformedProof)?,
            b: g2_from_strings(&proof.pi_b).map_err(Error::MalformedProof)?,
            c: g1_from_strings(&proof.pi_c).map_err(Error::MalformedProof)?,
        };

        let signals = public_signals
            .iter()
            .map(|s| fr_from_str(s))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Error::MalformedProof)?;

        Groth16::<Bn254>::verify_with_processed_vk(&key.pvk, &signals, &parsed)
            .map_err(|e| Error::VerificationError(format!("{:?}", e)))
    }

    /// The auditor path: a stored proof/public-signal pair re-verified from
    /// raw JSON (e.g. a file upload). Parse failures are errors, distinct
    /// from a well-formed proof that simply does not verify.
    pub fn verify_raw(
        &self,
        election_id: ElectionId,
        proof_json: &str,
        public_signals: &[String],
    ) -> Result<bool, Error> {
        let proof: ProofJson = serde_json::from_str(proof_json)?;
        self.verify(election_id, &proof, public_signals)
    }

    pub fn has_key(&self, election_id: ElectionId) -> bool {
        self.keys.contains_key(&election_id)
    }
}

/// Check the magic header of a WASM witness-generator artifact.
pub fn check_witness_generator(bytes: &[u8]) -> Result<(), Error> {
    if bytes.len() < WASM_MAGIC.len() || bytes[..WASM_MAGIC.len()] != WASM_MAGIC {
        return Err(Error::BadArtifact(
            "witness generator is not a WASM binary".to_string(),
        ));
    }
    Ok(())
}

/// Check the magic header of a snarkjs proving key artifact.
pub fn check_proving_key(bytes: &[u8]) -> Result<(), Error> {
    if bytes.len() < ZKEY_MAGIC.len() || bytes[..ZKEY_MAGIC.len()] != ZKEY_MAGIC {
        return Err(Error::BadArtifact(
            "proving key is missing the zkey header".to_string(),
        ));
    }
    Ok(())
}

fn biguint_from_decimal(s: &str) -> Result<BigUint, String> {
    BigUint::from_str(s).map_err(|e| format!("bad decimal coordinate {:?}: {}", s, e))
}

fn fq_from_str(s: &str) -> Result<Fq, String> {
    let big = biguint_from_decimal(s)?;
    Ok(Fq::from_le_bytes_mod_order(&big.to_bytes_le()))
}

fn fr_from_str(s: &str) -> Result<Fr, String> {
    let big = biguint_from_decimal(s)?;
    Ok(Fr::from_le_bytes_mod_order(&big.to_bytes_le()))
}

/// Build a G1 point from snarkjs projective coordinates. Only `z` of `1`
/// (ordinary point) or `0` (infinity) appears in snarkjs output.
fn g1_from_strings(coords: &[String; 3]) -> Result<G1Affine, String> {
    match coords[2].as_str() {
        "0" => Ok(G1Affine::zero()),
        "1" => {
            let point = G1Affine::new_unchecked(fq_from_str(&coords[0])?, fq_from_str(&coords[1])?);
            if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
                return Err("G1 point is not on the curve".to_string());
            }
            Ok(point)
        }
        other => Err(format!("unexpected G1 projective z coordinate {:?}", other)),
    }
}

fn g2_from_strings(coords: &[[String; 2]; 3]) -> Result<G2Affine, String> {
    match (coords[2][0].as_str(), coords[2][1].as_str()) {
        ("0", "0") => Ok(G2Affine::zero()),
        ("1", "0") => {
            let x = Fq2::new(fq_from_str(&coords[0][0])?, fq_from_str(&coords[0][1])?);
            let y = Fq2::new(fq_from_str(&coords[1][0])?, fq_from_str(&coords[1][1])?);
            let point = G2Affine::new_unchecked(x, y);
            if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
                return Err("G2 point is not on the curve".to_string());
            }
            Ok(point)
        }
        other => Err(format!("unexpected G2 projective z coordinate {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::{CurveGroup, Group};

    fn g1_strings(point: G1Affine) -> [String; 3] {
        [point.x.to_string(), point.y.to_string(), "1".to_string()]
    }

    fn g2_strings(point: G2Affine) -> [[String; 2]; 3] {
        [
            [point.x.c0.to_string(), point.x.c1.to_string()],
            [point.y.c0.to_string(), point.y.c1.to_string()],
            ["1".to_string(), "0".to_string()],
        ]
    }

    fn g1(scalar: u64) -> G1Affine {
        (ark_bn254::G1Projective::generator() * Fr::from(scalar)).into_affine()
    }

    fn g2(scalar: u64) -> G2Affine {
        (ark_bn254::G2Projective::generator() * Fr::from(scalar)).into_affine()
    }

    /// A hand-built key/proof pair satisfying the Groth16 equation
    /// e(A, B) = e(alpha, beta) * e(IC0 + s*IC1, gamma) * e(C, delta)
    /// in the exponent: 7*8 = 2*3 + (4 + 7*5) + 11.
    fn fixture_key_json(ic0: u64, ic1: u64) -> String {
        serde_json::json!({
            "protocol": "groth16",
            "curve": "bn128",
            "nPublic": 1,
            "vk_alpha_1": g1_strings(g1(2)),
            "vk_beta_2": g2_strings(g2(3)),
            "vk_gamma_2": g2_strings(g2(1)),
            "vk_delta_2": g2_strings(g2(1)),
            "vk_alphabeta_12": [],
            "IC": [g1_strings(g1(ic0)), g1_strings(g1(ic1))],
        })
        .to_string()
    }

    fn fixture_proof() -> ProofJson {
        ProofJson {
            pi_a: g1_strings(g1(7)),
            pi_b: g2_strings(g2(8)),
            pi_c: g1_strings(g1(11)),
        }
    }

    fn verifier() -> ZkpVerifier {
        let mut verifier = ZkpVerifier::new();
        verifier.register_key(1, &fixture_key_json(4, 5)).unwrap();
        // Election 2 uses a different circuit, hence a different key
        verifier.register_key(2, &fixture_key_json(6, 9)).unwrap();
        verifier
    }

    #[test]
    fn valid_proof_verifies_and_is_deterministic() {
        let verifier = verifier();
        let proof = fixture_proof();
        let signals = vec!["7".to_string()];

        assert!(verifier.verify(1, &proof, &signals).unwrap());
        assert!(verifier.verify(1, &proof, &signals).unwrap());
    }

    #[test]
    fn tampered_signals_fail_the_pairing_check() {
        let verifier = verifier();
        let proof = fixture_proof();

        assert!(!verifier.verify(1, &proof, &["8".to_string()]).unwrap());
    }

    #[test]
    fn proof_does_not_verify_under_another_elections_key() {
        let verifier = verifier();
        let proof = fixture_proof();
        let signals = vec!["7".to_string()];

        assert!(verifier.verify(1, &proof, &signals).unwrap());
        assert!(!verifier.verify(2, &proof, &signals).unwrap());
    }

    #[test]
    fn malformed_proof_json_is_an_error_not_false() {
        let verifier = verifier();

        let result = verifier.verify_raw(1, "{\"pi_a\": \"garbage\"", &["7".to_string()]);
        assert!(matches!(result, Err(Error::JSONDeserialization(_))));
    }

    #[test]
    fn off_curve_point_is_an_error() {
        let verifier = verifier();
        let mut proof = fixture_proof();
        proof.pi_a = ["1".to_string(), "1".to_string(), "1".to_string()];

        assert!(matches!(
            verifier.verify(1, &proof, &["7".to_string()]),
            Err(Error::MalformedProof(_))
        ));
    }

    #[test]
    fn wrong_signal_count_is_an_error() {
        let verifier = verifier();
        let proof = fixture_proof();

        assert!(matches!(
            verifier.verify(1, &proof, &[]),
            Err(Error::PublicSignalMismatch { expected: 1, got: 0 })
        ));
    }

    #[test]
    fn missing_key_is_an_error() {
        let verifier = ZkpVerifier::new();
        assert!(matches!(
            verifier.verify(9, &fixture_proof(), &[]),
            Err(Error::VerificationKeyMissing(9))
        ));
    }

    #[test]
    fn key_registration_validates_structure() {
        let mut verifier = ZkpVerifier::new();

        let mut bad: serde_json::Value = serde_json::from_str(&fixture_key_json(4, 5)).unwrap();
        bad["protocol"] = "plonk".into();
        assert!(matches!(
            verifier.register_key(1, &bad.to_string()),
            Err(Error::MalformedVerificationKey(_))
        ));

        let mut bad: serde_json::Value = serde_json::from_str(&fixture_key_json(4, 5)).unwrap();
        bad["nPublic"] = 3.into();
        assert!(matches!(
            verifier.register_key(1, &bad.to_string()),
            Err(Error::MalformedVerificationKey(_))
        ));
    }

    #[test]
    fn artifact_headers() {
        let wasm = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, 0xff];
        assert!(check_witness_generator(&wasm).is_ok());
        assert!(check_witness_generator(b"not wasm").is_err());

        assert!(check_proving_key(b"zkey\x01\x02").is_ok());
        assert!(check_proving_key(b"pkey").is_err());
        assert!(check_proving_key(b"zk").is_err());
    }
}
