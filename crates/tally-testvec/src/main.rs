//! Test vector generator for the Tally reward engine.
//!
//! Generates `test_vectors.json` with the permit digest, escrow account
//! derivation, decay curve and fixed-point rounding vectors. Other
//! implementations of the engine check themselves against this file.
//!
//! Usage:
//!   tally-testvec              # Print test vectors as JSON
//!   tally-testvec --verify     # Verify tests/fixtures/test_vectors.json

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_crypto::blake3::{self, contexts};
use tally_crypto::ed25519::KeyPair;
use tally_crypto::typed_data::SigningDomain;
use tally_locker::decay;
use tally_rewards::PermitClaim;
use tally_types::math::{self, HALF_RAY, RAY};
use tally_types::U256;

#[derive(Serialize, Deserialize)]
struct TestVectors {
    version: String,
    generated_by: String,
    vectors: BTreeMap<String, TestVector>,
}

#[derive(Serialize, Deserialize)]
struct TestVector {
    description: String,
    inputs: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
}

fn entry(pairs: &[(&str, String)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn generate_account_vectors() -> BTreeMap<String, TestVector> {
    let mut vectors = BTreeMap::new();

    let pool = blake3::derive_account(contexts::POOL_ACCOUNT, b"locker");
    vectors.insert(
        "account_pool_locker".to_string(),
        TestVector {
            description: "derive_key(\"Tally v1 pool-account\", b\"locker\")".to_string(),
            inputs: entry(&[("label", "locker".to_string())]),
            outputs: entry(&[("account", hex::encode(pool))]),
        },
    );

    let vault = blake3::derive_account(contexts::VAULT_ACCOUNT, b"staking-vault");
    vectors.insert(
        "account_vault".to_string(),
        TestVector {
            description: "derive_key(\"Tally v1 vault-account\", b\"staking-vault\")".to_string(),
            inputs: entry(&[("label", "staking-vault".to_string())]),
            outputs: entry(&[("account", hex::encode(vault))]),
        },
    );

    vectors
}

fn generate_permit_vectors() -> BTreeMap<String, TestVector> {
    let mut vectors = BTreeMap::new();

    let domain = SigningDomain {
        name: "PermitFreezerRewardPool".to_string(),
        version: "1".to_string(),
        chain_id: 1,
        verifying_contract: [0x11; 32],
    };
    let signer = KeyPair::from_bytes(&[0x42; 32]);
    let claim = PermitClaim {
        provider: signer.address(),
        spender: [0x22; 32],
        value: U256::from(1_000_000u64),
        deadline: 1_000,
    };
    let nonce = U256::zero();
    let signature = claim.sign(&signer.signing_key, &domain, nonce);

    vectors.insert(
        "permit_digest_nonce0".to_string(),
        TestVector {
            description: "Permit claim digest and Ed25519 signature, nonce 0".to_string(),
            inputs: entry(&[
                ("domain_name", domain.name.clone()),
                ("domain_version", domain.version.clone()),
                ("chain_id", domain.chain_id.to_string()),
                ("verifying_contract", hex::encode(domain.verifying_contract)),
                ("signer_secret", hex::encode([0x42u8; 32])),
                ("spender", hex::encode(claim.spender)),
                ("value", claim.value.to_string()),
                ("nonce", nonce.to_string()),
                ("deadline", claim.deadline.to_string()),
            ]),
            outputs: entry(&[
                ("provider", hex::encode(claim.provider)),
                ("domain_separator", hex::encode(domain.separator())),
                ("struct_hash", hex::encode(claim.struct_hash(nonce))),
                ("digest", hex::encode(claim.digest(&domain, nonce))),
                ("signature", hex::encode(signature.to_bytes())),
            ]),
        },
    );

    // Same claim one nonce later: the digest must change.
    let next = U256::one();
    vectors.insert(
        "permit_digest_nonce1".to_string(),
        TestVector {
            description: "Permit claim digest, same fields, nonce 1".to_string(),
            inputs: entry(&[("nonce", next.to_string())]),
            outputs: entry(&[("digest", hex::encode(claim.digest(&domain, next)))]),
        },
    );

    vectors
}

fn generate_decay_vectors() -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();
    let (start, end) = (100u64, 1_100u64);

    let weights = [100u64, 350, 600, 1_100]
        .iter()
        .map(|t| Ok(decay::decay_weight_at(start, end, *t)?.to_string()))
        .collect::<anyhow::Result<Vec<_>>>()?;
    vectors.insert(
        "decay_weight_at".to_string(),
        TestVector {
            description: "Instantaneous ray weight of a lock [100, 1100] at 100, 350, 600, 1100"
                .to_string(),
            inputs: entry(&[("start", start.to_string()), ("end", end.to_string())]),
            outputs: entry(&[("weights", weights.join(","))]),
        },
    );

    let full = decay::calc_decay_for_reward(start, end, start, end)?;
    let first_half = decay::calc_decay_for_reward(start, end, start, 600)?;
    let second_half = decay::calc_decay_for_reward(start, end, 600, end)?;
    vectors.insert(
        "decay_for_reward".to_string(),
        TestVector {
            description: "Mean ray weight over the whole lock and each half".to_string(),
            inputs: entry(&[("start", start.to_string()), ("end", end.to_string())]),
            outputs: entry(&[
                ("full", full.to_string()),
                ("first_half", first_half.to_string()),
                ("second_half", second_half.to_string()),
                ("half_ray", HALF_RAY.to_string()),
            ]),
        },
    );

    let parts = [(start, 333u64), (333, 777), (777, end)]
        .iter()
        .map(|(from, to)| Ok(decay::calc_decay_integral(start, end, *from, *to)?))
        .collect::<anyhow::Result<Vec<U256>>>()?;
    let sum = parts
        .iter()
        .try_fold(U256::zero(), |acc, x| math::add(acc, *x))?;
    vectors.insert(
        "decay_integral_additive".to_string(),
        TestVector {
            description: "Integral shares of [100,333], [333,777], [777,1100] sum to RAY"
                .to_string(),
            inputs: entry(&[("start", start.to_string()), ("end", end.to_string())]),
            outputs: entry(&[
                (
                    "parts",
                    parts.iter().map(U256::to_string).collect::<Vec<_>>().join(","),
                ),
                ("sum", sum.to_string()),
                ("ray", RAY.to_string()),
            ]),
        },
    );

    Ok(vectors)
}

fn generate_math_vectors() -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();

    let a = U256::from(3u64) * RAY / U256::from(2u64);
    let b = U256::from(7u64);
    vectors.insert(
        "math_ray_rounding".to_string(),
        TestVector {
            description: "ray_mul, ray_div and percent_mul rounding".to_string(),
            inputs: entry(&[
                ("a", a.to_string()),
                ("b", b.to_string()),
                ("bps", "3333".to_string()),
            ]),
            outputs: entry(&[
                ("ray_mul", math::ray_mul(b, a)?.to_string()),
                ("ray_div", math::ray_div(b, a)?.to_string()),
                ("percent_mul", math::percent_mul(U256::from(1_001u64), 3_333)?.to_string()),
                ("mul_div_up", math::mul_div_up(b, U256::one(), U256::from(3u64))?.to_string()),
            ]),
        },
    );

    Ok(vectors)
}

fn generate_all_vectors() -> anyhow::Result<TestVectors> {
    let mut all_vectors = BTreeMap::new();
    all_vectors.extend(generate_account_vectors());
    all_vectors.extend(generate_permit_vectors());
    all_vectors.extend(generate_decay_vectors()?);
    all_vectors.extend(generate_math_vectors()?);

    Ok(TestVectors {
        version: "1.0".to_string(),
        generated_by: "tally-testvec".to_string(),
        vectors: all_vectors,
    })
}

fn verify_vectors(vectors: &TestVectors) -> anyhow::Result<bool> {
    let regenerated = generate_all_vectors()?;
    let mut all_pass = true;

    for (name, expected) in &vectors.vectors {
        match regenerated.vectors.get(name) {
            Some(actual) if actual.outputs == expected.outputs => eprintln!("PASS: {name}"),
            Some(actual) => {
                eprintln!("FAIL: {name}");
                eprintln!("  expected: {:?}", expected.outputs);
                eprintln!("  actual:   {:?}", actual.outputs);
                all_pass = false;
            }
            None => {
                eprintln!("MISSING: {name}");
                all_pass = false;
            }
        }
    }

    Ok(all_pass)
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--verify") {
        let path = "tests/fixtures/test_vectors.json";
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {path}: {e}"))?;
        let vectors: TestVectors = serde_json::from_str(&content)?;
        if verify_vectors(&vectors)? {
            eprintln!("All test vectors verified successfully.");
            Ok(())
        } else {
            anyhow::bail!("test vector verification failed")
        }
    } else {
        let vectors = generate_all_vectors()?;
        println!("{}", serde_json::to_string_pretty(&vectors)?);
        Ok(())
    }
}
