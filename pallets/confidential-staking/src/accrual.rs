//! Interest accrual between two checkpoints of a position.
//!
//! Accrual is linear in the time elapsed since the last checkpoint and runs
//! entirely on ciphertexts:
//!
//! - native stake: `stake * elapsed / seconds_per_day / eth_to_reward_scale`,
//!   i.e. one whole native unit staked for a day earns one whole reward unit;
//! - asset stake: `stake * elapsed / (seconds_per_day * asset_daily_divisor)`,
//!   i.e. `1 / asset_daily_divisor` of the stake per day.
//!
//! Divisions floor; the remainder of each step is dropped, not carried into
//! the next checkpoint. The second in which the checkpoint lands is excluded
//! from `elapsed`.

use crate::{Position, LOG_TARGET};
use confidential_staking_primitives::{Coprocessor, Handle, Operand, Width};
use sp_runtime::{DispatchError, RuntimeDebug};

/// Rate parameters, read from the pallet config.
#[derive(Clone, Copy, PartialEq, Eq, RuntimeDebug)]
pub struct AccrualRates {
    pub seconds_per_day: u64,
    pub eth_to_reward_scale: u128,
    pub asset_daily_divisor: u128,
    pub reward_width: Width,
}

/// Outcome of one accrual step.
#[derive(Clone, Copy, PartialEq, Eq, RuntimeDebug)]
pub struct Accrued {
    pub position: Position,
    /// `position.pending_rewards` is a fresh handle nobody holds a grant on yet.
    pub rewards_updated: bool,
}

/// Bring `position` up to `now`.
///
/// The returned position always carries `last_updated = now` (never moving
/// backwards), whether or not interest was added.
pub fn accrue<AccountId, C: Coprocessor<AccountId>>(
    position: Position,
    now: u64,
    rates: &AccrualRates,
) -> Result<Accrued, DispatchError> {
    let mut next = position;
    next.last_updated = now.max(position.last_updated);

    if position.is_untouched() {
        log::debug!(target: LOG_TARGET, "bootstrap checkpoint at {}", now);
        return Ok(Accrued {
            position: next,
            rewards_updated: false,
        });
    }

    let elapsed = now
        .saturating_sub(position.last_updated)
        .saturating_sub(1);
    if elapsed == 0 {
        return Ok(Accrued {
            position: next,
            rewards_updated: false,
        });
    }

    let eth_interest = if C::is_initialized(&position.eth_stake) {
        let per_day = linear::<AccountId, C>(
            position.eth_stake,
            elapsed,
            rates.seconds_per_day as u128,
        )?;
        let scaled = C::div(per_day, Operand::Plain(rates.eth_to_reward_scale))?;
        Some(C::cast(scaled, rates.reward_width)?)
    } else {
        None
    };

    let asset_interest = if C::is_initialized(&position.asset_stake) {
        let divisor = (rates.seconds_per_day as u128).saturating_mul(rates.asset_daily_divisor);
        let interest = linear::<AccountId, C>(position.asset_stake, elapsed, divisor)?;
        Some(C::cast(interest, rates.reward_width)?)
    } else {
        None
    };

    let interest = match (eth_interest, asset_interest) {
        (Some(eth), Some(asset)) => C::add(eth, Operand::Encrypted(asset))?,
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => {
            return Ok(Accrued {
                position: next,
                rewards_updated: false,
            })
        }
    };

    next.pending_rewards = if C::is_initialized(&position.pending_rewards) {
        C::add(position.pending_rewards, Operand::Encrypted(interest))?
    } else {
        interest
    };
    log::debug!(
        target: LOG_TARGET,
        "accrued {} seconds, pending rewards now {:?}",
        elapsed,
        next.pending_rewards
    );

    Ok(Accrued {
        position: next,
        rewards_updated: true,
    })
}

// stake * elapsed / divisor, computed in the 128-bit domain.
fn linear<AccountId, C: Coprocessor<AccountId>>(
    stake: Handle,
    elapsed: u64,
    divisor: u128,
) -> Result<Handle, DispatchError> {
    let wide = C::cast(stake, Width::U128)?;
    let scaled = C::mul(wide, Operand::Plain(elapsed as u128))?;
    C::div(scaled, Operand::Plain(divisor))
}
