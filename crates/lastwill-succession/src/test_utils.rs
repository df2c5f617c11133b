//! Shared test utilities for lastwill-succession tests.
//!
//! Provides deterministic addresses, an in-memory asset ledger, a simulated
//! multi-owner wallet that fires its transaction guard, and a fully wired
//! fixture (wallet + guard + module + two funded tokens).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::clock::ManualClock;
use crate::config::ModuleConfig;
use crate::custody::{AssetView, Custodian, CustodyError, TransactionGuard, WalletCall};
use crate::guard::ActivityGuard;
use crate::module::SuccessionModule;
use crate::types::{Address, Amount, ItemId, Timestamp};

/// Address used for the module in tests.
pub const MODULE_BYTE: u8 = 0xee;

/// Start time used by fixtures (Nov 2023).
pub const GENESIS: Timestamp = 1_700_000_000;

/// Deterministic address with every byte set to `byte`.
pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

/// Module at [`MODULE_BYTE`] with the given clock and config.
pub fn test_module(clock: ManualClock, config: ModuleConfig) -> SuccessionModule {
    SuccessionModule::new(addr(MODULE_BYTE), config, clock)
}

/// In-memory balances and item ownership.
#[derive(Debug, Clone, Default)]
pub struct AssetLedger {
    native: HashMap<Address, Amount>,
    fungible: HashMap<(Address, Address), Amount>,
    items: HashMap<(Address, ItemId), Address>,
    next_item: HashMap<Address, ItemId>,
}

impl AssetLedger {
    pub fn set_native(&mut self, holder: Address, amount: Amount) {
        self.native.insert(holder, amount);
    }

    pub fn mint_fungible(&mut self, asset: Address, to: Address, amount: Amount) {
        *self.fungible.entry((asset, to)).or_default() += amount;
    }

    /// Mint the next sequential item of `asset` (0, 1, 2, ...) to `to`.
    pub fn mint_item(&mut self, asset: Address, to: Address) -> ItemId {
        let next = self.next_item.entry(asset).or_default();
        let item = *next;
        *next += 1;
        self.items.insert((asset, item), to);
        item
    }

    pub fn transfer_native(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), CustodyError> {
        let available = self.native_balance(from);
        if available < amount {
            return Err(CustodyError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        self.native.insert(*from, available - amount);
        *self.native.entry(*to).or_default() += amount;
        Ok(())
    }

    pub fn transfer_fungible(
        &mut self,
        asset: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), CustodyError> {
        let available = self.fungible_balance(asset, from);
        if available < amount {
            return Err(CustodyError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        self.fungible.insert((*asset, *from), available - amount);
        *self.fungible.entry((*asset, *to)).or_default() += amount;
        Ok(())
    }

    pub fn transfer_item(
        &mut self,
        asset: &Address,
        from: &Address,
        to: &Address,
        item: ItemId,
    ) -> Result<(), CustodyError> {
        if self.owner_of(asset, item) != Some(*from) {
            return Err(CustodyError::NotItemOwner {
                asset: *asset,
                item,
                holder: *from,
            });
        }
        self.items.insert((*asset, item), *to);
        Ok(())
    }
}

impl AssetView for AssetLedger {
    fn native_balance(&self, holder: &Address) -> Amount {
        self.native.get(holder).copied().unwrap_or(0)
    }

    fn fungible_balance(&self, asset: &Address, holder: &Address) -> Amount {
        self.fungible.get(&(*asset, *holder)).copied().unwrap_or(0)
    }

    fn owner_of(&self, asset: &Address, item: ItemId) -> Option<Address> {
        self.items.get(&(*asset, item)).copied()
    }
}

/// Simulated multi-owner wallet.
///
/// Owner transactions need `threshold` distinct owner signers, bump the
/// nonce and fire the guard exactly once. Module executions skip both.
pub struct SimWallet {
    address: Address,
    owners: Vec<Address>,
    threshold: usize,
    nonce: u64,
    modules: BTreeSet<Address>,
    guard: Option<Arc<dyn TransactionGuard>>,
    assets: AssetLedger,
}

impl SimWallet {
    /// Wallet with no owners (any signer set is accepted).
    pub fn new(address: Address, assets: AssetLedger) -> Self {
        Self {
            address,
            owners: Vec::new(),
            threshold: 0,
            nonce: 0,
            modules: BTreeSet::new(),
            guard: None,
            assets,
        }
    }

    pub fn with_owners(mut self, owners: Vec<Address>, threshold: usize) -> Self {
        self.owners = owners;
        self.threshold = threshold;
        self
    }

    pub fn set_guard(&mut self, guard: Arc<dyn TransactionGuard>) {
        self.guard = Some(guard);
    }

    pub fn enable_module(&mut self, module: Address) {
        self.modules.insert(module);
    }

    pub fn disable_module(&mut self, module: &Address) {
        self.modules.remove(module);
    }

    pub fn assets(&self) -> &AssetLedger {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut AssetLedger {
        &mut self.assets
    }

    fn check_signers(&self, signers: &[Address]) -> Result<(), CustodyError> {
        let distinct: BTreeSet<&Address> = signers.iter().collect();
        if distinct.iter().any(|s| !self.owners.contains(s)) && !self.owners.is_empty() {
            return Err(CustodyError::Reverted("signer is not an owner".into()));
        }
        if distinct.len() < self.threshold {
            return Err(CustodyError::Reverted(format!(
                "{} of {} signatures",
                distinct.len(),
                self.threshold
            )));
        }
        Ok(())
    }

    /// Execute an owner-authorized transaction.
    ///
    /// `call` runs with the wallet as sender; its own result is returned
    /// untouched. The guard fires whether or not the inner call succeeded.
    pub fn exec_transaction<T>(
        &mut self,
        signers: &[Address],
        call: impl FnOnce(&mut SimWallet) -> T,
    ) -> Result<T, CustodyError> {
        self.check_signers(signers)?;
        self.nonce += 1;
        let result = call(self);
        if let Some(guard) = &self.guard {
            guard.on_transaction(&self.address);
        }
        Ok(result)
    }

    /// Apply a transfer from the wallet's own holdings.
    pub fn apply(&mut self, call: WalletCall) -> Result<(), CustodyError> {
        let from = self.address;
        match call {
            WalletCall::NativeTransfer { to, amount } => {
                self.assets.transfer_native(&from, &to, amount)
            }
            WalletCall::FungibleTransfer { asset, to, amount } => {
                self.assets.transfer_fungible(&asset, &from, &to, amount)
            }
            WalletCall::NonFungibleTransfer { asset, to, item } => {
                self.assets.transfer_item(&asset, &from, &to, item)
            }
        }
    }
}

impl AssetView for SimWallet {
    fn native_balance(&self, holder: &Address) -> Amount {
        self.assets.native_balance(holder)
    }

    fn fungible_balance(&self, asset: &Address, holder: &Address) -> Amount {
        self.assets.fungible_balance(asset, holder)
    }

    fn owner_of(&self, asset: &Address, item: ItemId) -> Option<Address> {
        self.assets.owner_of(asset, item)
    }
}

impl Custodian for SimWallet {
    fn address(&self) -> Address {
        self.address
    }

    fn nonce(&self) -> u64 {
        self.nonce
    }

    fn is_module_enabled(&self, module: &Address) -> bool {
        self.modules.contains(module)
    }

    fn exec_from_module(&mut self, module: &Address, call: WalletCall) -> Result<(), CustodyError> {
        if !self.is_module_enabled(module) {
            return Err(CustodyError::ModuleNotEnabled(*module));
        }
        self.apply(call)
    }
}

/// A two-owner wallet wired to a guard and module, holding two tokens.
///
/// Setting the guard and enabling the module are owner transactions, so
/// the wallet's record already exists when the fixture is returned.
pub struct SuccessionFixture {
    pub clock: ManualClock,
    pub module: Arc<SuccessionModule>,
    pub wallet: SimWallet,
    pub owners: [Address; 2],
    pub token_a: Address,
    pub token_b: Address,
}

impl SuccessionFixture {
    pub const WALLET_BYTE: u8 = 0x16;

    pub fn new() -> Self {
        Self::with_config(ModuleConfig::default())
    }

    pub fn with_config(config: ModuleConfig) -> Self {
        let clock = ManualClock::new(GENESIS);
        let module = Arc::new(test_module(clock.clone(), config));
        let owners = [addr(0x01), addr(0x02)];
        let token_a = addr(0x20);
        let token_b = addr(0x21);

        let mut assets = AssetLedger::default();
        assets.mint_fungible(token_a, addr(Self::WALLET_BYTE), 1_000_000);
        assets.mint_fungible(token_b, addr(Self::WALLET_BYTE), 2_000_000);

        let mut wallet =
            SimWallet::new(addr(Self::WALLET_BYTE), assets).with_owners(owners.to_vec(), 2);

        let guard: Arc<dyn TransactionGuard> = Arc::new(ActivityGuard::new(module.clone()));
        let module_address = *module.address();
        wallet
            .exec_transaction(&owners, |w| w.set_guard(guard))
            .expect("owners sign");
        wallet
            .exec_transaction(&owners, |w| w.enable_module(module_address))
            .expect("owners sign");
        module.take_events();

        Self {
            clock,
            module,
            wallet,
            owners,
            token_a,
            token_b,
        }
    }

    pub fn wallet_address(&self) -> Address {
        self.wallet.address()
    }

    /// Owner transaction calling `set_fungible_assets` on the module.
    pub fn set_fungible_assets(&mut self, assets: &[Address]) {
        let module = self.module.clone();
        self.wallet
            .exec_transaction(&self.owners, |w| {
                module.set_fungible_assets(&w.address(), assets)
            })
            .expect("owners sign");
    }

    /// Owner transaction calling `set_fungible_heirs` on the module.
    pub fn set_fungible_heirs(&mut self, heirs: &[Address]) {
        let module = self.module.clone();
        self.wallet
            .exec_transaction(&self.owners, |w| {
                module.set_fungible_heirs(&w.address(), heirs)
            })
            .expect("owners sign");
    }

    /// Owner transaction calling `set_non_fungible_heirs` on the module.
    pub fn set_non_fungible_heirs(
        &mut self,
        assets: &[Address],
        items: &[ItemId],
        heirs: &[Address],
    ) -> Result<(), crate::SuccessionError> {
        let module = self.module.clone();
        self.wallet
            .exec_transaction(&self.owners, |w| {
                module.set_non_fungible_heirs(&w.address(), assets, items, heirs)
            })
            .expect("owners sign")
    }
}

impl Default for SuccessionFixture {
    fn default() -> Self {
        Self::new()
    }
}
