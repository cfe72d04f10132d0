//! Integration test crate for the Tally reward engine.
//!
//! Holds the fixtures shared by the end-to-end scenarios in `tests/`, which
//! drive several workspace crates together: vault share changes feeding
//! pools, lockers inside the controller, permits, and the booster.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p tally-integration-tests
//! ```

use tally_rewards::{FreezeSchedule, RewardController, RewardPool};
use tally_types::clock::ManualClock;
use tally_types::ledger::InMemoryLedger;
use tally_types::{Address, BalanceUpdate, PoolId, TokenId, U256};

/// Controller admin used by every scenario.
pub const ADMIN: Address = [0xAD; 32];

/// Default reward provider.
pub const PROVIDER: Address = [0x50; 32];

/// Default staked token reported by [`PROVIDER`].
pub const TOKEN: TokenId = [0x70; 32];

/// Deterministic participant address `n`.
pub fn participant(n: u8) -> Address {
    let mut addr = [0u8; 32];
    addr[0] = 0xA0;
    addr[31] = n;
    addr
}

/// A controller over a fresh in-memory ledger, plus the clock driving it.
pub fn controller(schedule: FreezeSchedule) -> (RewardController<InMemoryLedger>, ManualClock) {
    let clock = ManualClock::new(0);
    let controller = RewardController::new(clock.shared(), InMemoryLedger::new(), ADMIN, schedule)
        .expect("valid freeze schedule");
    (controller, clock)
}

/// Register a token-weighted pool with [`PROVIDER`]/[`TOKEN`] authorized.
pub fn token_weighted_pool(
    controller: &mut RewardController<InMemoryLedger>,
    name: &str,
    rate: u64,
) -> PoolId {
    let now = controller.now();
    let id = controller
        .add_reward_pool(&ADMIN, RewardPool::token_weighted(name, U256::from(rate), now))
        .expect("add pool");
    controller
        .add_reward_provider(&ADMIN, id, PROVIDER, TOKEN)
        .expect("add provider");
    id
}

/// Balance change of `user` from `before` to `after`, with the new total.
pub fn update(user: Address, before: u64, after: u64, total_after: u64) -> BalanceUpdate {
    BalanceUpdate {
        user,
        before: U256::from(before),
        after: U256::from(after),
        total_after: U256::from(total_after),
    }
}
