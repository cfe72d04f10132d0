//! Integration test: distribution fairness and supply conservation.
//!
//! Randomized (seeded) deposits into a token-weighted pool, checked against
//! the exact proportional share. Also checks that the reward token supply
//! always equals what participants claimed, that frozen reward melts
//! monotonically until everything is paid at the melt-down tick, that
//! same-tick operations give the same result in any order, and that accrued
//! reward is conserved across freeze changes.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tally_integration_tests::{controller, participant, token_weighted_pool, update, ADMIN, PROVIDER, TOKEN};
use tally_rewards::FreezeSchedule;
use tally_types::ledger::TokenLedger;
use tally_types::U256;

#[test]
fn proportional_split_with_random_balances() {
    let mut rng = StdRng::seed_from_u64(0x7A11);
    let (mut controller, clock) = controller(FreezeSchedule::default());
    let pool = token_weighted_pool(&mut controller, "deposits", 997);

    let balances: Vec<u64> = (0..12).map(|_| rng.gen_range(1..1_000_000)).collect();
    let mut total = 0u64;
    for (n, balance) in balances.iter().enumerate() {
        total += balance;
        let user = participant(n as u8);
        controller
            .handle_balance_update(&PROVIDER, pool, &TOKEN, &update(user, 0, *balance, total))
            .expect("deposit");
    }

    let elapsed = 1_234u64;
    clock.mine_to_tick(elapsed);
    let emitted = 997 * elapsed;

    let mut claimed_sum = U256::zero();
    for (n, balance) in balances.iter().enumerate() {
        let claimed = controller
            .claim_reward(&participant(n as u8))
            .expect("claim")
            .claimed;
        let exact = U256::from(emitted) * U256::from(*balance) / U256::from(total);
        assert!(claimed <= exact, "participant {n} overpaid");
        assert!(exact - claimed <= U256::from(2), "participant {n} underpaid");
        claimed_sum += claimed;
    }
    assert!(claimed_sum <= U256::from(emitted));
    assert_eq!(controller.ledger().total_supply(), claimed_sum);
}

#[test]
fn supply_matches_claims_under_churn() {
    let mut rng = StdRng::seed_from_u64(42);
    let (mut controller, clock) = controller(FreezeSchedule {
        freeze_percentage: 2_500,
        melt_down_at: 500,
    });
    let pool = token_weighted_pool(&mut controller, "deposits", 50);
    let users: Vec<_> = (1..=4).map(participant).collect();
    let mut balances = [0u64; 4];

    for step in 1..=40u64 {
        clock.mine_to_tick(step * 10);
        let i = rng.gen_range(0..users.len());
        let before = balances[i];
        let after = rng.gen_range(0..10_000);
        balances[i] = after;
        let total: u64 = balances.iter().sum();
        controller
            .handle_balance_update(&PROVIDER, pool, &TOKEN, &update(users[i], before, after, total))
            .expect("update");
        if rng.gen_bool(0.3) {
            controller.claim_reward(&users[i]).expect("claim");
        }
    }

    let claimed: U256 = users
        .iter()
        .map(|u| controller.claimed_total(u))
        .fold(U256::zero(), |acc, x| acc + x);
    assert_eq!(controller.ledger().total_supply(), claimed);
    assert!(claimed <= U256::from(50 * 400));
}

#[test]
fn frozen_reward_melts_monotonically() {
    let (mut controller, clock) = controller(FreezeSchedule {
        freeze_percentage: 5_000,
        melt_down_at: 100,
    });
    let pool = token_weighted_pool(&mut controller, "deposits", 10);
    let alice = participant(1);
    controller
        .handle_balance_update(&PROVIDER, pool, &TOKEN, &update(alice, 0, 1_000, 1_000))
        .expect("deposit");

    let mut last_total = U256::zero();
    for tick in (10..=100).step_by(10) {
        clock.mine_to_tick(tick);
        let outcome = controller.claim_reward(&alice).expect("claim");
        assert!(outcome.total_claimed >= last_total);
        last_total = outcome.total_claimed;
    }
    // Everything emitted by the melt-down tick is paid, nothing stays frozen.
    assert_eq!(last_total, U256::from(1_000));
    assert_eq!(controller.frozen_balance(&alice), U256::zero());
    assert_eq!(controller.ledger().balance_of(&alice), U256::from(1_000));
}

#[derive(Clone, Copy, Debug)]
enum Op {
    /// Set participant `i`'s balance.
    Set(usize, u64),
    /// Claim for participant `i`.
    Claim(usize),
}

const PARTICIPANTS: usize = 6;

fn same_tick_schedule(seed: u64) -> Vec<(u64, Vec<Op>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (1..=20u64)
        .map(|step| {
            let mut who: Vec<usize> = (0..PARTICIPANTS).collect();
            who.shuffle(&mut rng);
            who.truncate(rng.gen_range(2..=4));
            let mut ops: Vec<Op> = who
                .iter()
                .map(|i| Op::Set(*i, rng.gen_range(0..50_000)))
                .collect();
            if rng.gen_bool(0.5) {
                ops.push(Op::Claim(rng.gen_range(0..PARTICIPANTS)));
            }
            (step * 5, ops)
        })
        .collect()
}

/// Replay `schedule` with each tick's operations shuffled by `order_seed`.
/// Returns every participant's `(claimed, frozen)` after a final claim.
fn replay_in_order(schedule: &[(u64, Vec<Op>)], order_seed: u64) -> Vec<(U256, U256)> {
    let mut rng = StdRng::seed_from_u64(order_seed);
    let (mut controller, clock) = controller(FreezeSchedule {
        freeze_percentage: 3_000,
        melt_down_at: 1_000,
    });
    let pools = [
        token_weighted_pool(&mut controller, "full", 101),
        token_weighted_pool(&mut controller, "half", 37),
    ];
    let users: Vec<_> = (1..=PARTICIPANTS as u8).map(participant).collect();
    let mut balances = [[0u64; PARTICIPANTS]; 2];

    for (tick, ops) in schedule {
        clock.mine_to_tick(*tick);
        let mut ops = ops.clone();
        ops.shuffle(&mut rng);
        for op in ops {
            match op {
                Op::Set(i, amount) => {
                    for (p, pool) in pools.iter().enumerate() {
                        let after = amount >> p;
                        let before = balances[p][i];
                        balances[p][i] = after;
                        let total = balances[p].iter().sum();
                        controller
                            .handle_balance_update(&PROVIDER, *pool, &TOKEN, &update(users[i], before, after, total))
                            .expect("update");
                    }
                }
                Op::Claim(i) => {
                    controller.claim_reward(&users[i]).expect("claim");
                }
            }
        }
    }

    clock.mine_to_tick(150);
    users
        .iter()
        .map(|user| {
            let outcome = controller.claim_reward(user).expect("final claim");
            (outcome.total_claimed, outcome.frozen)
        })
        .collect()
}

#[test]
fn same_tick_order_does_not_matter() {
    let schedule = same_tick_schedule(0x0DE5);
    let reference = replay_in_order(&schedule, 1);
    assert!(reference.iter().any(|(claimed, _)| !claimed.is_zero()));
    for order_seed in 2..=5 {
        assert_eq!(replay_in_order(&schedule, order_seed), reference, "order seed {order_seed}");
    }
}

#[test]
fn accrued_reward_conserved_across_freeze_changes() {
    let mut rng = StdRng::seed_from_u64(0xC0DE);
    let (mut controller, clock) = controller(FreezeSchedule {
        freeze_percentage: 2_500,
        melt_down_at: 400,
    });
    let shared = token_weighted_pool(&mut controller, "shared", 97);
    let solo = token_weighted_pool(&mut controller, "solo", 13);
    controller
        .set_pool_freeze_percentage(&ADMIN, shared, Some(4_000))
        .expect("override");
    controller
        .set_pool_melt_down_at(&ADMIN, shared, Some(300))
        .expect("melt override");

    let users: Vec<_> = (1..=5).map(participant).collect();
    let balances: Vec<u64> = users.iter().map(|_| rng.gen_range(1..100_000)).collect();
    let mut total = 0u64;
    for (user, balance) in users.iter().zip(&balances) {
        total += balance;
        controller
            .handle_balance_update(&PROVIDER, shared, &TOKEN, &update(*user, 0, *balance, total))
            .expect("shared deposit");
    }
    controller
        .handle_balance_update(&PROVIDER, solo, &TOKEN, &update(users[0], 0, 1, 1))
        .expect("solo deposit");

    clock.mine_to_tick(50);
    controller.set_freeze_percentage(&ADMIN, 6_000).expect("global");
    clock.mine_to_tick(120);
    controller
        .set_pool_freeze_percentage(&ADMIN, shared, Some(0))
        .expect("override");
    clock.mine_to_tick(150);

    for (n, (user, balance)) in users.iter().zip(&balances).enumerate() {
        let mut exact = U256::from(97u64 * 150) * U256::from(*balance) / U256::from(total);
        let mut tolerance = U256::one();
        if n == 0 {
            exact += U256::from(13u64 * 150);
            tolerance += U256::one();
        }
        let preview = controller.claimable_reward(user).expect("preview");
        let accrued = preview.claimable + preview.extra;
        assert!(accrued <= exact, "participant {n} overpaid");
        assert!(exact - accrued <= tolerance, "participant {n} underpaid");

        let outcome = controller.claim_reward(user).expect("claim");
        assert_eq!(outcome.claimed, preview.claimable, "participant {n}");
        assert_eq!(outcome.claimed + outcome.frozen, accrued, "participant {n}");
    }
    // Solo reward recorded at 25% before tick 50 is still melting.
    assert!(!controller.frozen_balance(&users[0]).is_zero());
}
