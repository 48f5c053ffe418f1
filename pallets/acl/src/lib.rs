//! **pallet-acl**
//!
//! Permission registry for coprocessor handles. A handle is only useful to
//! the accounts holding a grant on it: a grant lets the account compute on
//! the handle and request a private decryption of it. A handle can
//! additionally be marked *publicly decryptable*, after which anyone may ask
//! for (and verify) its plaintext.
//!
//! Other pallets use the [`PermissionRegistry`] implementation directly.
//! Accounts can also share handles they already hold through the `allow` and
//! `allow_for_decryption` extrinsics.

#![cfg_attr(not(feature = "std"), no_std)]

pub use pallet::*;


const LOG_TARGET: &str = "runtime::acl";

#[frame_support::pallet]
pub mod pallet {
    use super::*;
    use confidential_staking_primitives::{Handle, PermissionRegistry};
    use frame_support::pallet_prelude::*;
    use frame_system::pallet_prelude::*;

    #[pallet::config]
    pub trait Config: frame_system::Config {
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

        type WeightInfo: WeightData;
    }

    pub trait WeightData {
        fn allow() -> Weight;
        fn allow_for_decryption() -> Weight;
    }
    impl WeightData for () {
        fn allow() -> Weight {
            Weight::from_parts(15_000, 0)
        }
        fn allow_for_decryption() -> Weight {
            Weight::from_parts(15_000, 0)
        }
    }

    #[pallet::pallet]
    pub struct Pallet<T>(_);

    /// (handle, account) pairs holding a decrypt grant.
    #[pallet::storage]
    pub type Allowed<T: Config> = StorageDoubleMap<
        _,
        Blake2_128Concat,
        Handle,
        Blake2_128Concat,
        T::AccountId,
        (),
        OptionQuery,
    >;

    #[pallet::storage]
    pub type PubliclyDecryptable<T> = StorageMap<_, Blake2_128Concat, Handle, (), OptionQuery>;

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// `who` may now decrypt `handle`.
        AccessGranted { handle: Handle, who: T::AccountId },
        /// `handle` may now be decrypted by anyone.
        PublicDecryptionAllowed { handle: Handle },
    }

    #[pallet::error]
    pub enum Error<T> {
        /// Caller holds no grant on the handle.
        NotAllowed,
    }

    impl<T: Config> Pallet<T> {
        pub fn grant(handle: Handle, who: &T::AccountId) {
            if Allowed::<T>::contains_key(handle, who) {
                return;
            }
            log::trace!(target: LOG_TARGET, "grant {:?} to {:?}", handle, who);
            Allowed::<T>::insert(handle, who, ());
            Self::deposit_event(Event::AccessGranted {
                handle,
                who: who.clone(),
            });
        }

        pub fn publish(handle: Handle) {
            if PubliclyDecryptable::<T>::contains_key(handle) {
                return;
            }
            log::trace!(target: LOG_TARGET, "publish {:?}", handle);
            PubliclyDecryptable::<T>::insert(handle, ());
            Self::deposit_event(Event::PublicDecryptionAllowed { handle });
        }

        #[inline]
        pub fn has_access(handle: Handle, who: &T::AccountId) -> bool {
            Allowed::<T>::contains_key(handle, who)
        }

        #[inline]
        pub fn is_public(handle: Handle) -> bool {
            PubliclyDecryptable::<T>::contains_key(handle)
        }
    }

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Share a handle the caller already holds with `account`.
        #[pallet::call_index(0)]
        #[pallet::weight(T::WeightInfo::allow())]
        pub fn allow(origin: OriginFor<T>, handle: Handle, account: T::AccountId) -> DispatchResult {
            let who = ensure_signed(origin)?;
            ensure!(Self::has_access(handle, &who), Error::<T>::NotAllowed);
            Self::grant(handle, &account);
            Ok(())
        }

        /// Mark a handle the caller holds as publicly decryptable.
        #[pallet::call_index(1)]
        #[pallet::weight(T::WeightInfo::allow_for_decryption())]
        pub fn allow_for_decryption(origin: OriginFor<T>, handle: Handle) -> DispatchResult {
            let who = ensure_signed(origin)?;
            ensure!(Self::has_access(handle, &who), Error::<T>::NotAllowed);
            Self::publish(handle);
            Ok(())
        }
    }

    impl<T: Config> PermissionRegistry<T::AccountId> for Pallet<T> {
        fn allow(handle: Handle, who: &T::AccountId) {
            Self::grant(handle, who)
        }

        fn make_publicly_decryptable(handle: Handle) {
            Self::publish(handle)
        }

        fn is_allowed(handle: Handle, who: &T::AccountId) -> bool {
            Self::has_access(handle, who)
        }

        fn is_publicly_decryptable(handle: Handle) -> bool {
            Self::is_public(handle)
        }
    }
}
