//! Integration test: boost emission capped by work, and excess sweeping.
//!
//! A work pool and a boost pool both track the same deposits. Each claim
//! pays boost only up to the boost factor of the work drained in the same
//! claim; the remainder accumulates as excess and is swept to a target once
//! the grace period has passed.

use tally_integration_tests::{controller, participant, token_weighted_pool, update, ADMIN, PROVIDER, TOKEN};
use tally_rewards::{Booster, BoosterParams, FreezeSchedule, RewardError};
use tally_types::clock::ManualClock;
use tally_types::ledger::{InMemoryLedger, TokenLedger};
use tally_types::{PoolId, U256};

const SINK: [u8; 32] = [0x5E; 32];

struct Fixture {
    booster: Booster<InMemoryLedger>,
    clock: ManualClock,
    work: PoolId,
    boost: PoolId,
}

fn fixture(schedule: FreezeSchedule) -> Fixture {
    let (mut controller, clock) = controller(schedule);
    let work = token_weighted_pool(&mut controller, "work", 10);
    let boost = token_weighted_pool(&mut controller, "boost", 100);
    let mut booster = Booster::new(controller, BoosterParams { grace_period: 50 });
    booster.set_boost_pool(&ADMIN, boost).expect("boost pool");
    booster.set_boost_factor(&ADMIN, work, 5_000).expect("factor");
    Fixture {
        booster,
        clock,
        work,
        boost,
    }
}

fn deposit(fx: &mut Fixture, user: [u8; 32], amount: u64, total: u64) {
    for id in [fx.work, fx.boost] {
        fx.booster
            .controller_mut()
            .handle_balance_update(&PROVIDER, id, &TOKEN, &update(user, 0, amount, total))
            .expect("deposit");
    }
}

#[test]
fn boost_capped_and_excess_swept() {
    let mut fx = fixture(FreezeSchedule::default());
    let alice = participant(1);
    deposit(&mut fx, alice, 1_000, 1_000);

    fx.clock.mine_to_tick(10);
    let preview = fx.booster.claimable_reward(&alice).expect("preview");
    // work 100, boost capped at 50% of it.
    assert_eq!(preview.claimable, U256::from(150));

    let outcome = fx.booster.claim_reward(&alice).expect("claim");
    assert_eq!(outcome.claimed, U256::from(150));
    assert_eq!(fx.booster.excess(), U256::from(950));

    // No target yet: nothing moves.
    assert_eq!(fx.booster.sweep_boost_excess().expect("sweep"), U256::zero());
    fx.booster
        .set_boost_excess_target(&ADMIN, Some(SINK), true)
        .expect("target");
    // Still inside the grace period.
    assert_eq!(fx.booster.sweep_boost_excess().expect("sweep"), U256::zero());

    fx.clock.mine_to_tick(50);
    assert_eq!(fx.booster.sweep_boost_excess().expect("sweep"), U256::from(950));
    assert_eq!(fx.booster.excess(), U256::zero());

    let ledger = fx.booster.controller().ledger();
    assert_eq!(ledger.balance_of(&SINK), U256::from(950));
    // Every unit emitted up to the claim ended up somewhere.
    assert_eq!(ledger.total_supply(), U256::from(1_100));
}

#[test]
fn boost_split_between_participants() {
    let mut fx = fixture(FreezeSchedule::default());
    let (alice, bob) = (participant(1), participant(2));
    deposit(&mut fx, alice, 1_000, 1_000);
    deposit(&mut fx, bob, 1_000, 2_000);
    fx.booster
        .set_boost_factor(&ADMIN, fx.work, 10_000)
        .expect("factor");

    fx.clock.mine_to_tick(20);
    let a = fx.booster.claim_reward(&alice).expect("alice");
    let b = fx.booster.claim_reward(&bob).expect("bob");
    // Each drained 100 work and 1000 boost; boost capped at 100.
    assert_eq!(a.claimed, U256::from(200));
    assert_eq!(b.claimed, U256::from(200));
    assert_eq!(fx.booster.excess(), U256::from(1_800));
}

#[test]
fn boost_respects_freeze() {
    let mut fx = fixture(FreezeSchedule {
        freeze_percentage: 5_000,
        melt_down_at: 1_000,
    });
    let alice = participant(1);
    deposit(&mut fx, alice, 1_000, 1_000);

    fx.clock.mine_to_tick(10);
    let outcome = fx.booster.claim_reward(&alice).expect("claim");
    assert_eq!(outcome.claimed, U256::from(75));
    assert_eq!(outcome.frozen, U256::from(75));
}

#[test]
fn boost_admin_checks() {
    let mut fx = fixture(FreezeSchedule::default());
    let alice = participant(1);
    assert_eq!(
        fx.booster.set_boost_factor(&alice, fx.work, 1),
        Err(RewardError::Unauthorized)
    );
    assert_eq!(
        fx.booster.set_boost_factor(&ADMIN, fx.boost, 1),
        Err(RewardError::UnsupportedOperation { kind: "boost" })
    );
    assert_eq!(
        fx.booster.set_boost_factor(&ADMIN, 99, 1),
        Err(RewardError::UnknownPool(99))
    );
    fx.booster
        .set_boost_factor(&ADMIN, fx.work, 30_000)
        .expect("factor above 1x");
    assert_eq!(fx.booster.boost_factor(fx.work), 30_000);
}
