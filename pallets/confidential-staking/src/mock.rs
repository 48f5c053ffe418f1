use crate::pallet as pallet_confidential_staking;
use confidential_staking_primitives::{
    ConfidentialRewardAsset, Coprocessor, DecryptedValue, DecryptionProof, ExternalInput, Handle,
    InputProof, Operand, Width,
};
use frame_support::{
    construct_runtime, derive_impl, parameter_types,
    storage::unhashed,
    traits::{ConstU128, ConstU64},
    PalletId,
};
use parity_scale_codec::Encode;
use sp_runtime::{BuildStorage, DispatchError, DispatchResult};

pub type AccountId = u64;
pub type Balance = u128;
pub const ALICE: AccountId = 1;
pub const BOB: AccountId = 2;
pub const CHARLIE: AccountId = 3;
/// Account the mock token acts as.
pub const TOKEN: AccountId = 100;
/// Privileged token controller allowed to mint besides the staking pallet.
pub const CONTROLLER: AccountId = 101;

/// One whole native unit (18 decimals).
pub const ETH: Balance = 1_000_000_000_000_000_000;
/// One whole reward token unit (6 decimals).
pub const REWARD_UNIT: u128 = 1_000_000;
pub const DAY: u64 = 86_400;
/// Unix time of the first block in every test.
pub const T0: u64 = 1_700_000_000;

// --- Plaintext-backed coprocessor -------------------------------------------
// Ciphertexts are kept in plain sight in (unhashed) storage, so they follow the
// same transactional rollback as the pallet state.

const NEXT_HANDLE: &[u8] = b":mock:coprocessor:next";
const CIPHERTEXT: &[u8] = b":mock:coprocessor:ct";
const FAILING: &[u8] = b":mock:coprocessor:failing";

fn err(msg: &'static str) -> DispatchError {
    DispatchError::Other(msg)
}

pub struct MockCoprocessor;

impl MockCoprocessor {
    fn slot(h: &Handle) -> Vec<u8> {
        (CIPHERTEXT, h).encode()
    }

    /// While set, no new ciphertext can be produced.
    pub fn set_failing(failing: bool) {
        unhashed::put(FAILING, &failing);
    }

    fn fresh(value: u128, width: Width) -> Result<Handle, DispatchError> {
        if unhashed::get_or_default::<bool>(FAILING) {
            return Err(err("coprocessor unavailable"));
        }
        let n = unhashed::get_or_default::<u64>(NEXT_HANDLE) + 1;
        unhashed::put(NEXT_HANDLE, &n);
        let mut raw = [0u8; 32];
        raw[..8].copy_from_slice(&n.to_le_bytes());
        let h = Handle::from_raw(raw);
        unhashed::put(&Self::slot(&h), &(value & width.max_value(), width));
        Ok(h)
    }

    fn load(h: Handle) -> Result<(u128, Width), DispatchError> {
        unhashed::get(&Self::slot(&h)).ok_or(err("unknown handle"))
    }

    fn operand(rhs: Operand) -> Result<u128, DispatchError> {
        match rhs {
            Operand::Encrypted(h) => Ok(Self::load(h)?.0),
            Operand::Plain(v) => Ok(v),
        }
    }

    fn binary(
        lhs: Handle,
        rhs: Operand,
        op: impl FnOnce(u128, u128) -> Option<u128>,
    ) -> Result<Handle, DispatchError> {
        let (a, width) = Self::load(lhs)?;
        let b = Self::operand(rhs)?;
        let v = op(a, b).ok_or(err("arithmetic"))?;
        Self::fresh(v, width)
    }

    /// Test-only peek at the plaintext behind a handle.
    pub fn plaintext(h: Handle) -> u128 {
        Self::load(h).expect("known handle").0
    }

    fn attestation(handles: &[Handle], encoded: &[u8]) -> Vec<u8> {
        sp_io::hashing::blake2_256(&(b"decrypt", handles, encoded).encode()).to_vec()
    }

    fn input_binding(input: &ExternalInput, owner: &AccountId) -> Vec<u8> {
        sp_io::hashing::blake2_256(&(b"input", input, owner).encode()).to_vec()
    }
}

impl Coprocessor<AccountId> for MockCoprocessor {
    fn encode(value: u128, width: Width) -> Result<Handle, DispatchError> {
        if !width.fits(value) {
            return Err(err("value does not fit width"));
        }
        Self::fresh(value, width)
    }

    fn add(lhs: Handle, rhs: Operand) -> Result<Handle, DispatchError> {
        Self::binary(lhs, rhs, |a, b| Some(a.wrapping_add(b)))
    }

    fn sub(lhs: Handle, rhs: Operand) -> Result<Handle, DispatchError> {
        let (a, width) = Self::load(lhs)?;
        let b = Self::operand(rhs)?;
        // Wrap within the operand width, like the real thing.
        let v = a.wrapping_sub(b) & width.max_value();
        Self::fresh(v, width)
    }

    fn mul(lhs: Handle, rhs: Operand) -> Result<Handle, DispatchError> {
        Self::binary(lhs, rhs, |a, b| Some(a.wrapping_mul(b)))
    }

    fn div(lhs: Handle, rhs: Operand) -> Result<Handle, DispatchError> {
        Self::binary(lhs, rhs, |a, b| a.checked_div(b))
    }

    fn cast(value: Handle, width: Width) -> Result<Handle, DispatchError> {
        let (v, _) = Self::load(value)?;
        Self::fresh(v, width)
    }

    fn verify_decryption_proof(
        handles: &[Handle],
        encoded_plaintext: &[u8],
        proof: &[u8],
    ) -> Result<(), DispatchError> {
        let mut expected = Vec::new();
        for h in handles {
            if !Acl::is_public(*h) {
                return Err(err("not publicly decryptable"));
            }
            expected.extend(Self::load(*h)?.0.encode());
        }
        if expected != encoded_plaintext {
            return Err(err("wrong plaintext"));
        }
        if Self::attestation(handles, encoded_plaintext) != proof {
            return Err(err("bad proof"));
        }
        Ok(())
    }

    fn validate_external_input(
        input: &ExternalInput,
        proof: &[u8],
        owner: &AccountId,
    ) -> Result<Handle, DispatchError> {
        if Self::input_binding(input, owner) != proof {
            return Err(err("input not bound to owner"));
        }
        let mut value = [0u8; 16];
        value.copy_from_slice(&input[..16]);
        Self::encode(u128::from_le_bytes(value), Width::U64)
    }
}

/// Public decryption of `h` as a relayer would return it.
pub fn public_decrypt(h: Handle) -> (DecryptedValue, DecryptionProof) {
    let encoded = MockCoprocessor::plaintext(h).encode();
    let proof = MockCoprocessor::attestation(&[h], &encoded);
    (
        encoded.try_into().expect("bounded vec"),
        proof.try_into().expect("bounded vec"),
    )
}

/// Client-side encryption of `value` for `owner`.
pub fn encrypt_input(owner: AccountId, value: u64) -> (ExternalInput, InputProof) {
    let mut input = [0u8; 32];
    input[..16].copy_from_slice(&(value as u128).to_le_bytes());
    input[16..24].copy_from_slice(&owner.to_le_bytes());
    let proof = MockCoprocessor::input_binding(&input, &owner);
    (input, proof.try_into().expect("bounded vec"))
}

// --- Confidential token ----------------------------------------------------

const TOKEN_BALANCE: &[u8] = b":mock:token:balance";
const TOKEN_OPERATOR: &[u8] = b":mock:token:operator";
const TOKEN_FAILING: &[u8] = b":mock:token:failing";

pub struct MockRewardToken;

impl MockRewardToken {
    fn balance_key(who: &AccountId) -> Vec<u8> {
        (TOKEN_BALANCE, who).encode()
    }

    pub fn balance_handle(who: &AccountId) -> Handle {
        unhashed::get_or_default(&Self::balance_key(who))
    }

    pub fn balance_of(who: &AccountId) -> u128 {
        let h = Self::balance_handle(who);
        if h.is_initialized() {
            MockCoprocessor::plaintext(h)
        } else {
            0
        }
    }

    fn set_balance(who: &AccountId, value: u128) -> Result<(), DispatchError> {
        let h = MockCoprocessor::encode(value, Width::U64)?;
        Acl::grant(h, who);
        Acl::grant(h, &TOKEN);
        unhashed::put(&Self::balance_key(who), &h);
        Ok(())
    }

    pub fn fund(who: AccountId, value: u128) {
        Self::set_balance(&who, value).expect("fits u64");
    }

    pub fn set_operator(holder: AccountId, spender: AccountId) {
        unhashed::put(&(TOKEN_OPERATOR, holder, spender).encode(), &true);
    }

    /// While set, every transfer and mint is rejected.
    pub fn set_failing(failing: bool) {
        unhashed::put(TOKEN_FAILING, &failing);
    }

    fn ensure_live() -> Result<(), DispatchError> {
        if unhashed::get_or_default::<bool>(TOKEN_FAILING) {
            return Err(err("token paused"));
        }
        Ok(())
    }
}

impl ConfidentialRewardAsset<AccountId> for MockRewardToken {
    fn account() -> AccountId {
        TOKEN
    }

    fn confidential_transfer_from(
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Handle,
    ) -> Result<Handle, DispatchError> {
        Self::ensure_live()?;
        if spender != from && !Self::is_operator(from, spender) {
            return Err(err("not an operator"));
        }
        if !Acl::has_access(amount, &TOKEN) {
            return Err(err("token has no access to amount"));
        }
        let requested = MockCoprocessor::plaintext(amount);
        let available = Self::balance_of(from);
        // Insufficient balance moves nothing.
        let moved = if requested <= available { requested } else { 0 };

        Self::set_balance(from, available - moved)?;
        Self::set_balance(to, Self::balance_of(to) + moved)?;
        let transferred = MockCoprocessor::encode(moved, Width::U64)?;
        Acl::grant(transferred, from);
        Acl::grant(transferred, to);
        Ok(transferred)
    }

    fn mint_encrypted(minter: &AccountId, to: &AccountId, amount: Handle) -> DispatchResult {
        if *minter != ConfidentialStaking::ledger_account() && *minter != CONTROLLER {
            return Err(err("not a minter"));
        }
        if *minter == ConfidentialStaking::ledger_account() {
            // The ledger must have committed the reset before asking for the mint.
            let pending = ConfidentialStaking::position(to).pending_rewards;
            assert!(
                pending.is_initialized() && MockCoprocessor::plaintext(pending) == 0,
                "mint requested before pending rewards were reset"
            );
        }
        Self::ensure_live()?;
        if !Acl::has_access(amount, &TOKEN) {
            return Err(err("token has no access to amount"));
        }
        let minted = MockCoprocessor::plaintext(amount);
        Self::set_balance(to, Self::balance_of(to) + minted)
    }

    fn is_operator(holder: &AccountId, spender: &AccountId) -> bool {
        unhashed::get_or_default(&(TOKEN_OPERATOR, holder, spender).encode())
    }
}

// --- Runtime ---------------------------------------------------------------

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl frame_system::Config for Runtime {
    type Block = frame_system::mocking::MockBlock<Runtime>;
    type AccountData = pallet_balances::AccountData<Balance>;
}

#[derive_impl(pallet_balances::config_preludes::TestDefaultConfig)]
impl pallet_balances::Config for Runtime {
    type Balance = Balance;
    type ExistentialDeposit = ConstU128<1>;
    type AccountStore = System;
}

impl pallet_timestamp::Config for Runtime {
    type Moment = u64;
    type OnTimestampSet = ();
    type MinimumPeriod = ConstU64<1>;
    type WeightInfo = ();
}

impl pallet_acl::Config for Runtime {
    type RuntimeEvent = RuntimeEvent;
    type WeightInfo = ();
}

parameter_types! {
    pub const StakingPalletId: PalletId = PalletId(*b"CfStake_");
    pub const SecondsPerDay: u64 = DAY;
    // 18-decimal native asset, 6-decimal reward token.
    pub const EthToRewardScale: u128 = 1_000_000_000_000;
    // 1% per day.
    pub const AssetDailyRateDivisor: u128 = 100;
    pub const EthStakeWidth: Width = Width::U64;
    pub const RewardWidth: Width = Width::U64;
}

impl pallet_confidential_staking::Config for Runtime {
    type RuntimeEvent = RuntimeEvent;
    type Coprocessor = MockCoprocessor;
    type Permissions = Acl;
    type RewardAsset = MockRewardToken;
    type Currency = Balances;
    type Time = Timestamp;
    type PalletId = StakingPalletId;
    type SecondsPerDay = SecondsPerDay;
    type EthToRewardScale = EthToRewardScale;
    type AssetDailyRateDivisor = AssetDailyRateDivisor;
    type EthStakeWidth = EthStakeWidth;
    type RewardWidth = RewardWidth;
    type WeightInfo = ();
}

construct_runtime!(
    pub enum Runtime {
        System: frame_system,
        Balances: pallet_balances,
        Timestamp: pallet_timestamp,
        Acl: pallet_acl,
        ConfidentialStaking: pallet_confidential_staking,
    }
);

// Build a fresh externalities for each test. ALICE and BOB hold 10 native units.
pub fn new_test_ext() -> sp_io::TestExternalities {
    let mut t = frame_system::GenesisConfig::<Runtime>::default()
        .build_storage()
        .unwrap();
    pallet_balances::GenesisConfig::<Runtime> {
        balances: vec![(ALICE, 10 * ETH), (BOB, 10 * ETH)],
        ..Default::default()
    }
    .assimilate_storage(&mut t)
    .unwrap();
    let mut ext = sp_io::TestExternalities::new(t);
    ext.execute_with(|| {
        System::set_block_number(1);
        set_time(T0);
    });
    ext
}

/// Set the chain clock to `secs` Unix seconds.
pub fn set_time(secs: u64) {
    Timestamp::set_timestamp(secs * 1_000);
}
