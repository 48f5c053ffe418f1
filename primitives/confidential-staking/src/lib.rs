//! Types and traits for the confidential staking crates
#![cfg_attr(not(feature = "std"), no_std)]

use frame_support::{pallet_prelude::*, BoundedVec};
use parity_scale_codec::DecodeWithMemTracking;
use sp_runtime::RuntimeDebug;

/// Opaque ciphertext handle issued by the coprocessor.
///
/// The all-zero handle is the *uninitialized* value (nothing was ever
/// encrypted behind it). Any other handle is backed by a real ciphertext,
/// possibly of zero. Two equal handles name the same ciphertext, but a fresh
/// operation always yields a fresh handle, so handle equality says nothing
/// about plaintexts over time.
#[derive(
    Encode,
    Decode,
    DecodeWithMemTracking,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    TypeInfo,
    MaxEncodedLen,
    Default,
    RuntimeDebug,
)]
pub struct Handle([u8; 32]);

impl Handle {
    /// The uninitialized handle.
    pub const UNINITIALIZED: Handle = Handle([0u8; 32]);

    /// Wrap raw handle bytes. Only coprocessor implementations should need this.
    pub const fn from_raw(raw: [u8; 32]) -> Self {
        Handle(raw)
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.0 != [0u8; 32]
    }
}

/// Bit width of the plaintext domain behind a handle.
#[derive(
    Encode,
    Decode,
    DecodeWithMemTracking,
    Clone,
    Copy,
    PartialEq,
    Eq,
    TypeInfo,
    MaxEncodedLen,
    RuntimeDebug,
)]
pub enum Width {
    U64,
    U128,
}

impl Width {
    /// Largest plaintext representable in this width.
    pub const fn max_value(self) -> u128 {
        match self {
            Width::U64 => u64::MAX as u128,
            Width::U128 => u128::MAX,
        }
    }

    #[inline]
    pub const fn fits(self, value: u128) -> bool {
        value <= self.max_value()
    }
}

/// Right-hand side of a coprocessor operation: another ciphertext or a
/// plaintext scalar.
#[derive(Clone, Copy, PartialEq, Eq, RuntimeDebug)]
pub enum Operand {
    Encrypted(Handle),
    Plain(u128),
}

/// Client-side encrypted input, not yet trusted by the chain.
pub type ExternalInput = [u8; 32];

/// Proof/aux data blob attached to an external input.
pub type MaxProofLen = ConstU32<8192>;
pub type InputProof = BoundedVec<u8, MaxProofLen>;

/// SCALE-encoded plaintext(s) attested by a decryption proof.
pub type MaxDecryptedLen = ConstU32<512>;
pub type DecryptedValue = BoundedVec<u8, MaxDecryptedLen>;

/// Decryption proof bytes (e.g. threshold signatures over the plaintext).
pub type DecryptionProof = BoundedVec<u8, MaxProofLen>;

/// Homomorphic coprocessor. Implement in the runtime.
///
/// Every operation returns a fresh handle. Arithmetic wraps within the width
/// of the left-hand operand; division is floor division.
pub trait Coprocessor<AccountId> {
    /// Trivially encrypt a plaintext. Fails if `value` does not fit `width`.
    fn encode(value: u128, width: Width) -> Result<Handle, DispatchError>;

    fn add(lhs: Handle, rhs: Operand) -> Result<Handle, DispatchError>;
    fn sub(lhs: Handle, rhs: Operand) -> Result<Handle, DispatchError>;
    fn mul(lhs: Handle, rhs: Operand) -> Result<Handle, DispatchError>;
    fn div(lhs: Handle, rhs: Operand) -> Result<Handle, DispatchError>;

    /// Re-interpret a ciphertext in another width (truncating when narrowing).
    fn cast(value: Handle, width: Width) -> Result<Handle, DispatchError>;

    fn is_initialized(value: &Handle) -> bool {
        value.is_initialized()
    }

    /// Check that `proof` attests `encoded_plaintext` as the decryption of
    /// `handles`, in order.
    fn verify_decryption_proof(
        handles: &[Handle],
        encoded_plaintext: &[u8],
        proof: &[u8],
    ) -> Result<(), DispatchError>;

    /// Accept a client-encrypted input bound to `owner`, returning a handle the
    /// chain may compute on.
    fn validate_external_input(
        input: &ExternalInput,
        proof: &[u8],
        owner: &AccountId,
    ) -> Result<Handle, DispatchError>;
}

/// Who may request decryption of which handle.
pub trait PermissionRegistry<AccountId> {
    /// Grant `who` the right to decrypt (and compute on) `handle`.
    fn allow(handle: Handle, who: &AccountId);

    /// Let anyone request a public decryption of `handle`.
    fn make_publicly_decryptable(handle: Handle);

    fn is_allowed(handle: Handle, who: &AccountId) -> bool;

    fn is_publicly_decryptable(handle: Handle) -> bool;
}

/// Confidential token used as the second staked asset and as the reward asset.
pub trait ConfidentialRewardAsset<AccountId> {
    /// Account the token acts as when it needs permissions on a handle.
    fn account() -> AccountId;

    /// Move `amount` from `from` to `to` on behalf of `spender`.
    ///
    /// Returns the amount actually moved, which may be smaller than `amount`
    /// (the token clamps against the sender's balance).
    fn confidential_transfer_from(
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Handle,
    ) -> Result<Handle, DispatchError>;

    /// Mint `amount` into `to`. Only the staking ledger or a privileged
    /// controller may act as `minter`.
    fn mint_encrypted(minter: &AccountId, to: &AccountId, amount: Handle) -> DispatchResult;

    /// True if `spender` may move `holder`'s balance.
    fn is_operator(holder: &AccountId, spender: &AccountId) -> bool;
}
