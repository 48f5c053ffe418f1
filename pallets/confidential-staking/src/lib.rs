//! **pallet-confidential-staking**
//!
//! A staking pool whose balances and rewards stay encrypted. Users stake two
//! assets:
//! - the native currency, paid in as a plaintext amount and kept as an
//!   encrypted stake, and
//! - a confidential token, pulled in from the user's encrypted balance.
//!
//! Both stakes earn rewards in the confidential token. Rewards accrue on every
//! interaction (see [`accrual`]) and are minted to the user on claim.
//!
//! Arithmetic on ciphertexts is delegated to a [`Coprocessor`]. Every handle the
//! pallet writes into a [`Position`] is immediately shared through the
//! [`PermissionRegistry`] with the pallet account and the position owner, and
//! marked publicly decryptable. The last part is what makes withdrawals
//! possible without a trusted oracle: a withdrawal carries a decryption proof
//! for the owner's *live* stake handle, and the pallet only releases native
//! funds up to the attested amount.
//!
//! Every call is transactional: a failure at any step, including the final
//! native transfer, leaves no trace of accrual, grants or stake updates.

#![cfg_attr(not(feature = "std"), no_std)]

use frame_support::{
    pallet_prelude::*,
    traits::{fungible, tokens::Preservation, UnixTime},
    PalletId,
};
use frame_system::pallet_prelude::*;
use parity_scale_codec::DecodeAll;
use sp_runtime::{
    traits::{AccountIdConversion, Zero},
    RuntimeDebug,
};

use confidential_staking_primitives::{
    ConfidentialRewardAsset, Coprocessor, DecryptedValue, DecryptionProof, ExternalInput, Handle,
    InputProof, Operand, PermissionRegistry, Width,
};

pub use pallet::*;

pub mod accrual;

#[cfg(test)]
mod mock;

pub(crate) const LOG_TARGET: &str = "runtime::confidential-staking";

pub type BalanceOf<T> = <<T as Config>::Currency as fungible::Inspect<
    <T as frame_system::Config>::AccountId,
>>::Balance;

/// Per-account staking record.
#[derive(
    Encode, Decode, Clone, Copy, PartialEq, Eq, TypeInfo, MaxEncodedLen, Default, RuntimeDebug,
)]
pub struct Position {
    /// Native stake, in native base units.
    pub eth_stake: Handle,
    /// Confidential token stake, in token base units.
    pub asset_stake: Handle,
    /// Accrued, unclaimed rewards, in token base units.
    pub pending_rewards: Handle,
    /// Unix seconds of the last checkpoint; 0 until the first interaction.
    pub last_updated: u64,
}

impl Position {
    pub const fn untouched() -> Self {
        Position {
            eth_stake: Handle::UNINITIALIZED,
            asset_stake: Handle::UNINITIALIZED,
            pending_rewards: Handle::UNINITIALIZED,
            last_updated: 0,
        }
    }

    #[inline]
    pub fn is_untouched(&self) -> bool {
        self.last_updated == 0
    }
}

#[frame_support::pallet]
pub mod pallet {
    use super::*;

    #[pallet::config]
    pub trait Config: frame_system::Config {
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

        /// Homomorphic arithmetic, input validation and decryption proofs.
        type Coprocessor: Coprocessor<Self::AccountId>;

        /// Decrypt grants for every handle the pallet produces.
        type Permissions: PermissionRegistry<Self::AccountId>;

        /// Confidential token staked as the second asset and minted as rewards.
        type RewardAsset: ConfidentialRewardAsset<Self::AccountId>;

        /// Native currency staked as the first asset.
        type Currency: fungible::Mutate<Self::AccountId>;

        type Time: UnixTime;

        /// Derives the pallet account that holds staked funds.
        #[pallet::constant]
        type PalletId: Get<PalletId>;

        #[pallet::constant]
        type SecondsPerDay: Get<u64>;

        /// 10^(native decimals - reward decimals).
        #[pallet::constant]
        type EthToRewardScale: Get<u128>;

        /// The asset stake earns `1 / AssetDailyRateDivisor` of itself per day.
        #[pallet::constant]
        type AssetDailyRateDivisor: Get<u128>;

        /// Ciphertext width of the native stake.
        #[pallet::constant]
        type EthStakeWidth: Get<Width>;

        /// Ciphertext width of the reward token (asset stake and rewards).
        #[pallet::constant]
        type RewardWidth: Get<Width>;

        type WeightInfo: WeightData;
    }

    pub trait WeightData {
        fn deposit_eth() -> Weight;
        fn deposit_asset() -> Weight;
        fn sync_rewards() -> Weight;
        fn claim_rewards() -> Weight;
        fn withdraw_eth() -> Weight;
    }
    impl WeightData for () {
        fn deposit_eth() -> Weight {
            Weight::from_parts(60_000, 0)
        }
        fn deposit_asset() -> Weight {
            Weight::from_parts(90_000, 0)
        }
        fn sync_rewards() -> Weight {
            Weight::from_parts(40_000, 0)
        }
        fn claim_rewards() -> Weight {
            Weight::from_parts(70_000, 0)
        }
        fn withdraw_eth() -> Weight {
            Weight::from_parts(90_000, 0)
        }
    }

    #[pallet::pallet]
    pub struct Pallet<T>(_);

    /// Positions by owner. Read through [`Pallet::position`], which also covers
    /// accounts that never interacted.
    #[pallet::storage]
    pub type Positions<T: Config> =
        StorageMap<_, Blake2_128Concat, T::AccountId, Position, OptionQuery>;

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        EthDeposited {
            who: T::AccountId,
            amount: BalanceOf<T>,
            eth_stake: Handle,
        },
        AssetDeposited {
            who: T::AccountId,
            /// Amount the token actually moved into custody.
            transferred: Handle,
            asset_stake: Handle,
        },
        RewardsSynced {
            who: T::AccountId,
            pending_rewards: Handle,
        },
        RewardsClaimed {
            who: T::AccountId,
            amount: Handle,
        },
        EthWithdrawn {
            who: T::AccountId,
            amount: BalanceOf<T>,
            eth_stake: Handle,
        },
    }

    #[pallet::error]
    pub enum Error<T> {
        /// Zero, or wider than the stake's ciphertext width, or above the
        /// attested stake.
        InvalidAmount,
        /// Claim with nothing accrued yet.
        NoRewardsAvailable,
        /// Decryption proof does not attest the live stake handle.
        ProofVerificationFailed,
        /// Native transfer, token transfer or reward mint did not go through.
        TransferFailed,
        /// Withdrawal from a position that never staked the native asset.
        StakeUninitialized,
        /// The pallet account is not an operator of the caller on the token.
        OperatorNotAuthorized,
        /// External ciphertext rejected by the coprocessor.
        InvalidInput,
        /// Coprocessor arithmetic failed.
        Coprocessor,
    }

    #[pallet::hooks]
    impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
        fn integrity_test() {
            assert!(T::SecondsPerDay::get() > 0, "SecondsPerDay must be non-zero");
            assert!(T::EthToRewardScale::get() > 0, "EthToRewardScale must be non-zero");
            assert!(
                T::AssetDailyRateDivisor::get() > 0,
                "AssetDailyRateDivisor must be non-zero"
            );
        }
    }

    impl<T: Config> Pallet<T> {
        #[inline]
        pub fn ledger_account() -> T::AccountId {
            T::PalletId::get().into_account_truncating()
        }

        /// `who`'s position, or the untouched position if there is none yet.
        pub fn position(who: &T::AccountId) -> Position {
            Positions::<T>::get(who).unwrap_or_else(Position::untouched)
        }

        /// Accrue `who`'s rewards up to now and return the pending rewards handle.
        pub fn sync(who: &T::AccountId) -> Result<Handle, DispatchError> {
            Ok(Self::checkpoint(who)?.pending_rewards)
        }

        fn now() -> u64 {
            T::Time::now().as_secs()
        }

        fn rates() -> accrual::AccrualRates {
            accrual::AccrualRates {
                seconds_per_day: T::SecondsPerDay::get(),
                eth_to_reward_scale: T::EthToRewardScale::get(),
                asset_daily_divisor: T::AssetDailyRateDivisor::get(),
                reward_width: T::RewardWidth::get(),
            }
        }

        // Runs accrual and persists the result. The returned position is
        // stamped with the current time.
        fn checkpoint(who: &T::AccountId) -> Result<Position, DispatchError> {
            let accrued = accrual::accrue::<T::AccountId, T::Coprocessor>(
                Self::position(who),
                Self::now(),
                &Self::rates(),
            )
            .map_err(|e| {
                log::error!(target: LOG_TARGET, "accrual failed for {:?}: {:?}", who, e);
                Error::<T>::Coprocessor
            })?;
            if accrued.rewards_updated {
                Self::share(accrued.position.pending_rewards, who);
            }
            Positions::<T>::insert(who, accrued.position);
            Ok(accrued.position)
        }

        // Grants the pallet and `owner` access to a handle written into
        // `owner`'s position, and opens it to public decryption.
        fn share(handle: Handle, owner: &T::AccountId) {
            T::Permissions::allow(handle, &Self::ledger_account());
            T::Permissions::allow(handle, owner);
            T::Permissions::make_publicly_decryptable(handle);
        }

        fn accumulate(current: Handle, delta: Handle) -> Result<Handle, DispatchError> {
            if T::Coprocessor::is_initialized(&current) {
                T::Coprocessor::add(current, Operand::Encrypted(delta))
                    .map_err(|_| Error::<T>::Coprocessor.into())
            } else {
                Ok(delta)
            }
        }

        // Plaintext native amount, rejected when zero or too wide for the stake.
        fn native_amount(amount: BalanceOf<T>) -> Result<u128, DispatchError> {
            ensure!(!amount.is_zero(), Error::<T>::InvalidAmount);
            let raw: u128 = amount.try_into().map_err(|_| Error::<T>::InvalidAmount)?;
            ensure!(T::EthStakeWidth::get().fits(raw), Error::<T>::InvalidAmount);
            Ok(raw)
        }
    }

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Stake `amount` of the native currency.
        #[pallet::call_index(0)]
        #[pallet::weight(T::WeightInfo::deposit_eth())]
        pub fn deposit_eth(origin: OriginFor<T>, amount: BalanceOf<T>) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let mut position = Self::checkpoint(&who)?;
            let raw = Self::native_amount(amount)?;

            <T::Currency as fungible::Mutate<T::AccountId>>::transfer(
                &who,
                &Self::ledger_account(),
                amount,
                Preservation::Expendable,
            )
            .map_err(|_| Error::<T>::TransferFailed)?;

            let deposit = T::Coprocessor::encode(raw, T::EthStakeWidth::get())
                .map_err(|_| Error::<T>::Coprocessor)?;
            position.eth_stake = Self::accumulate(position.eth_stake, deposit)?;
            Self::share(position.eth_stake, &who);
            Positions::<T>::insert(&who, position);

            Self::deposit_event(Event::EthDeposited {
                who,
                amount,
                eth_stake: position.eth_stake,
            });
            Ok(())
        }

        /// Stake an encrypted amount of the confidential token.
        ///
        /// The pallet account must be an operator of the caller on the token.
        /// The stake grows by what the token actually moved, which is zero when
        /// the caller's balance does not cover `input`.
        #[pallet::call_index(1)]
        #[pallet::weight(T::WeightInfo::deposit_asset())]
        pub fn deposit_asset(
            origin: OriginFor<T>,
            input: ExternalInput,
            input_proof: InputProof,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let mut position = Self::checkpoint(&who)?;
            let ledger = Self::ledger_account();

            let amount = T::Coprocessor::validate_external_input(&input, &input_proof, &who)
                .map_err(|_| Error::<T>::InvalidInput)?;
            ensure!(
                T::RewardAsset::is_operator(&who, &ledger),
                Error::<T>::OperatorNotAuthorized
            );

            T::Permissions::allow(amount, &ledger);
            T::Permissions::allow(amount, &T::RewardAsset::account());
            let transferred =
                T::RewardAsset::confidential_transfer_from(&ledger, &who, &ledger, amount)
                    .map_err(|_| Error::<T>::TransferFailed)?;

            position.asset_stake = Self::accumulate(position.asset_stake, transferred)?;
            Self::share(position.asset_stake, &who);
            Positions::<T>::insert(&who, position);

            Self::deposit_event(Event::AssetDeposited {
                who,
                transferred,
                asset_stake: position.asset_stake,
            });
            Ok(())
        }

        /// Accrue rewards without moving any balance.
        #[pallet::call_index(2)]
        #[pallet::weight(T::WeightInfo::sync_rewards())]
        pub fn sync_rewards(origin: OriginFor<T>) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let pending_rewards = Self::sync(&who)?;
            Self::deposit_event(Event::RewardsSynced {
                who,
                pending_rewards,
            });
            Ok(())
        }

        /// Mint all pending rewards to the caller.
        #[pallet::call_index(3)]
        #[pallet::weight(T::WeightInfo::claim_rewards())]
        pub fn claim_rewards(origin: OriginFor<T>) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let mut position = Self::checkpoint(&who)?;
            ensure!(
                T::Coprocessor::is_initialized(&position.pending_rewards),
                Error::<T>::NoRewardsAvailable
            );

            let amount = position.pending_rewards;
            T::Permissions::allow(amount, &T::RewardAsset::account());
            T::Permissions::allow(amount, &who);

            // The reset is written before the mint is requested.
            position.pending_rewards = T::Coprocessor::encode(0, T::RewardWidth::get())
                .map_err(|_| Error::<T>::Coprocessor)?;
            Self::share(position.pending_rewards, &who);
            Positions::<T>::insert(&who, position);

            T::RewardAsset::mint_encrypted(&Self::ledger_account(), &who, amount)
                .map_err(|_| Error::<T>::TransferFailed)?;

            Self::deposit_event(Event::RewardsClaimed { who, amount });
            Ok(())
        }

        /// Withdraw `amount` of staked native currency.
        ///
        /// `decrypted` and `proof` must be a public decryption of the caller's
        /// current native stake handle; `amount` may not exceed the attested value.
        #[pallet::call_index(4)]
        #[pallet::weight(T::WeightInfo::withdraw_eth())]
        pub fn withdraw_eth(
            origin: OriginFor<T>,
            amount: BalanceOf<T>,
            decrypted: DecryptedValue,
            proof: DecryptionProof,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::checkpoint(&who)?;

            // Verify against the stored handle, not a copy taken earlier.
            let mut position = Self::position(&who);
            ensure!(
                T::Coprocessor::is_initialized(&position.eth_stake),
                Error::<T>::StakeUninitialized
            );
            T::Coprocessor::verify_decryption_proof(&[position.eth_stake], &decrypted, &proof)
                .map_err(|_| Error::<T>::ProofVerificationFailed)?;
            let attested = u128::decode_all(&mut &decrypted[..])
                .map_err(|_| Error::<T>::ProofVerificationFailed)?;

            let raw = Self::native_amount(amount)?;
            ensure!(raw <= attested, Error::<T>::InvalidAmount);

            position.eth_stake = T::Coprocessor::sub(position.eth_stake, Operand::Plain(raw))
                .map_err(|_| Error::<T>::Coprocessor)?;
            Self::share(position.eth_stake, &who);
            Positions::<T>::insert(&who, position);

            <T::Currency as fungible::Mutate<T::AccountId>>::transfer(
                &Self::ledger_account(),
                &who,
                amount,
                Preservation::Expendable,
            )
            .map_err(|_| Error::<T>::TransferFailed)?;

            Self::deposit_event(Event::EthWithdrawn {
                who,
                amount,
                eth_stake: position.eth_stake,
            });
            Ok(())
        }
    }
}
