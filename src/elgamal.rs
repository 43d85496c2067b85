//! Exponential ElGamal over the Ristretto group, with t-of-n key sharing.
//!
//! The election secret `s` is split with Shamir secret sharing: a random
//! polynomial `f` of degree `t - 1` with `f(0) = s`, each authority `i`
//! holding `f(i)`. A partial decryption of a ciphertext `(c1, c2)` is
//! `d_i = f(i) * c1`; any `t` of them combine via Lagrange interpolation in
//! the exponent to `s * c1`, and `c2 - s * c1 = m * G` recovers the
//! plaintext point.

use crate::*;
use curve25519_dalek::constants::{RISTRETTO_BASEPOINT_POINT, RISTRETTO_BASEPOINT_TABLE};
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, RngCore};

/// One authority's long-term share of the election decryption key.
///
/// Dealt at setup, never mutated, and never transmitted during decryption;
/// only partial decryptions derived from it go on the wire.
#[derive(Serialize, Deserialize, Clone)]
pub struct KeyShare {
    pub id: KeyShareId,
    pub authority_id: AuthorityId,
    pub share: Scalar,
}

/// An ElGamal ciphertext pair, immutable once cast.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct Ciphertext {
    #[serde(with = "RistrettoHex")]
    pub c1: RistrettoPoint,

    #[serde(with = "RistrettoHex")]
    pub c2: RistrettoPoint,
}

/// Generate the master decryption key and the joint public key.
///
/// In production the master key exists only transiently inside the dealing
/// ceremony; callers must discard it once shares are dealt.
pub fn generate_master_key<R: RngCore + CryptoRng>(rng: &mut R) -> (Scalar, RistrettoPoint) {
    let secret = Scalar::random(rng);
    let public = &secret * &RISTRETTO_BASEPOINT_TABLE;
    (secret, public)
}

/// Deal `total` Shamir shares of `secret` with reconstruction threshold
/// `threshold`. Share `i` (1-based) belongs to the authority with that index.
pub fn deal_shares<R: RngCore + CryptoRng>(
    secret: &Scalar,
    meta: &CryptoMeta,
    rng: &mut R,
) -> Result<Vec<KeyShare>, Error> {
    if meta.threshold == 0 || meta.threshold > meta.total_shares {
        return Err(Error::InvalidThreshold);
    }

    // f(x) = secret + a_1 x + ... + a_{t-1} x^{t-1}
    let mut coefficients = vec![*secret];
    for _ in 1..meta.threshold {
        coefficients.push(Scalar::random(rng));
    }

    let mut shares = Vec::with_capacity(meta.total_shares);
    for index in 1..=meta.total_shares as u32 {
        let x = Scalar::from(index);
        let mut value = Scalar::zero();
        let mut power = Scalar::one();
        for coefficient in &coefficients {
            value += coefficient * power;
            power *= x;
        }
        shares.push(KeyShare {
            id: index,
            authority_id: index,
            share: value,
        });
    }

    Ok(shares)
}

/// Encrypt a small plaintext value (a candidate id) to the joint public key.
pub fn encrypt<R: RngCore + CryptoRng>(
    public_key: &RistrettoPoint,
    value: CandidateId,
    rng: &mut R,
) -> Ciphertext {
    let r = Scalar::random(rng);
    let c1 = &r * &RISTRETTO_BASEPOINT_TABLE;
    let c2 = &Scalar::from(value) * &RISTRETTO_BASEPOINT_TABLE + r * public_key;
    Ciphertext { c1, c2 }
}

/// Compute one authority's contribution toward decrypting a ciphertext.
pub fn partial_decrypt(share: &KeyShare, ciphertext: &Ciphertext) -> RistrettoPoint {
    share.share * ciphertext.c1
}

/// Lagrange coefficient at zero for share index `i` among `indexes`.
///
/// `indexes` must be distinct and non-zero.
pub fn lagrange_coefficient(i: AuthorityId, indexes: &[AuthorityId]) -> Scalar {
    let xi = Scalar::from(i);
    let mut numerator = Scalar::one();
    let mut denominator = Scalar::one();

    for &j in indexes {
        if j == i {
            continue;
        }
        let xj = Scalar::from(j);
        numerator *= xj;
        denominator *= xj - xi;
    }

    numerator * denominator.invert()
}

/// Combine partial decryptions from distinct authorities into the plaintext
/// point `m * G`. Any permutation of any valid t-subset yields the same
/// result; the caller is responsible for supplying at least `threshold`
/// distinct contributions.
pub fn combine_partials(
    ciphertext: &Ciphertext,
    partials: &[(AuthorityId, RistrettoPoint)],
) -> RistrettoPoint {
    let indexes: Vec<AuthorityId> = partials.iter().map(|(id, _)| *id).collect();

    let mut shared_secret = RistrettoPoint::identity();
    for (id, partial) in partials {
        shared_secret += lagrange_coefficient(*id, &indexes) * partial;
    }

    ciphertext.c2 - shared_secret
}

/// Decode a plaintext point `m * G` back to `m` by scanning the candidate
/// domain. Candidate ids are small (a few dozen per position), so a linear
/// scan is fine.
pub fn decode_plaintext(point: &RistrettoPoint, max_value: CandidateId) -> Result<CandidateId, Error> {
    let mut candidate = RistrettoPoint::identity();

    for value in 0..=max_value {
        if candidate == *point {
            return Ok(value);
        }
        candidate += RISTRETTO_BASEPOINT_POINT;
    }

    Err(Error::PlaintextOutOfDomain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_over_candidate_domain() {
        let mut rng = rand::rngs::OsRng {};
        let meta = CryptoMeta::new(3, 5).unwrap();
        let (secret, public_key) = generate_master_key(&mut rng);
        let shares = deal_shares(&secret, &meta, &mut rng).unwrap();

        for value in 1..=50u32 {
            let ciphertext = encrypt(&public_key, value, &mut rng);

            let partials: Vec<(AuthorityId, RistrettoPoint)> = shares[..3]
                .iter()
                .map(|s| (s.authority_id, partial_decrypt(s, &ciphertext)))
                .collect();

            let plaintext = combine_partials(&ciphertext, &partials);
            assert_eq!(decode_plaintext(&plaintext, 50).unwrap(), value);
        }
    }

    #[test]
    fn any_t_subset_reconstructs_identically() {
        let mut rng = rand::rngs::OsRng {};
        let meta = CryptoMeta::new(3, 5).unwrap();
        let (secret, public_key) = generate_master_key(&mut rng);
        let shares = deal_shares(&secret, &meta, &mut rng).unwrap();

        let ciphertext = encrypt(&public_key, 42, &mut rng);
        let partial =
            |i: usize| (shares[i].authority_id, partial_decrypt(&shares[i], &ciphertext));

        let subsets: [[usize; 3]; 4] = [[0, 1, 2], [2, 3, 4], [0, 2, 4], [4, 1, 0]];
        for subset in &subsets {
            let partials: Vec<_> = subset.iter().map(|&i| partial(i)).collect();
            let plaintext = combine_partials(&ciphertext, &partials);
            assert_eq!(decode_plaintext(&plaintext, 50).unwrap(), 42);
        }
    }

    #[test]
    fn fewer_than_threshold_shares_decrypt_garbage() {
        let mut rng = rand::rngs::OsRng {};
        let meta = CryptoMeta::new(3, 5).unwrap();
        let (secret, public_key) = generate_master_key(&mut rng);
        let shares = deal_shares(&secret, &meta, &mut rng).unwrap();

        let ciphertext = encrypt(&public_key, 7, &mut rng);
        let partials: Vec<_> = shares[..2]
            .iter()
            .map(|s| (s.authority_id, partial_decrypt(s, &ciphertext)))
            .collect();

        let plaintext = combine_partials(&ciphertext, &partials);
        assert!(decode_plaintext(&plaintext, 1000).is_err());
    }

    #[test]
    fn dealing_rejects_bad_threshold() {
        let mut rng = rand::rngs::OsRng {};
        let (secret, _) = generate_master_key(&mut rng);
        let meta = CryptoMeta {
            threshold: 6,
            total_shares: 5,
        };
        assert!(matches!(
            deal_shares(&secret, &meta, &mut rng),
            Err(Error::InvalidThreshold)
        ));
    }
}
