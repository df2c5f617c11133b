//! The succession module.
//!
//! Owns, per wallet, the liveness record, the asset configuration and the
//! claim ledger. State is an arena keyed by wallet address: each wallet sits
//! behind its own mutex, so operations on one wallet serialize while
//! different wallets proceed in parallel.
//!
//! `propose`, `settle` and the `claim_*` operations are permissionless. The
//! configuration setters take the wallet's own address as `sender`; only the
//! wallet's execution pipeline should call them.
//!
//! No wallet lock is held while a claim executes its transfer: the claim is
//! reserved in the ledger first and released again if the wallet refuses.
//! A custodian that fires its guard from `exec_from_module` therefore cannot
//! deadlock the module.

use crate::assets::AssetConfiguration;
use crate::clock::Clock;
use crate::config::{DistributionPolicy, ModuleConfig};
use crate::custody::{Custodian, WalletCall};
use crate::error::SuccessionError;
use crate::events::{EventQueue, SuccessionEvent};
use crate::ledger::{AssetKey, ClaimLedger};
use crate::record::WalletSuccessionRecord;
use crate::state::{StateError, SuccessionState, WalletState};
use crate::types::{Address, Amount, ItemId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// What a successful claim paid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimReceipt {
    /// Pro-rata share of a fungible asset or the native balance
    Share {
        wallet: Address,
        asset: AssetKey,
        heir: Address,
        amount: Amount,
    },
    /// A single non-fungible item
    Item {
        wallet: Address,
        asset: Address,
        item: ItemId,
        heir: Address,
    },
}

impl ClaimReceipt {
    pub fn heir(&self) -> &Address {
        match self {
            ClaimReceipt::Share { heir, .. } | ClaimReceipt::Item { heir, .. } => heir,
        }
    }

    /// Amount paid; always 1 for an item.
    pub fn amount(&self) -> Amount {
        match self {
            ClaimReceipt::Share { amount, .. } => *amount,
            ClaimReceipt::Item { .. } => 1,
        }
    }
}

type WalletSlot = Arc<Mutex<WalletState>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SuccessionModule {
    address: Address,
    config: ModuleConfig,
    clock: Arc<dyn Clock>,
    wallets: RwLock<HashMap<Address, WalletSlot>>,
    events: Mutex<EventQueue>,
}

impl std::fmt::Debug for SuccessionModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuccessionModule")
            .field("address", &self.address)
            .field("config", &self.config)
            .field("wallets", &self.wallet_count())
            .finish()
    }
}

impl SuccessionModule {
    /// Create a module with no managed wallets.
    ///
    /// `address` is the identity wallets enable as a module executor.
    pub fn new(address: Address, config: ModuleConfig, clock: impl Clock + 'static) -> Self {
        Self::from_state(address, config, clock, SuccessionState::new())
    }

    /// Restore a module from a snapshot.
    pub fn from_state(
        address: Address,
        config: ModuleConfig,
        clock: impl Clock + 'static,
        state: SuccessionState,
    ) -> Self {
        let wallets = state
            .wallets
            .into_iter()
            .map(|(wallet, ws)| (wallet, Arc::new(Mutex::new(ws))))
            .collect();

        Self {
            address,
            config,
            clock: Arc::new(clock),
            wallets: RwLock::new(wallets),
            events: Mutex::new(EventQueue::default()),
        }
    }

    /// Restore a module from a snapshot written by an earlier run.
    ///
    /// Runs with the configuration recorded in `state`, and refuses to start
    /// when `requested` disagrees with it.
    pub fn resume(
        address: Address,
        requested: &ModuleConfig,
        clock: impl Clock + 'static,
        state: SuccessionState,
    ) -> Result<Self, StateError> {
        let config = state.resolve_config(requested)?;
        Ok(Self::from_state(address, config, clock, state))
    }

    /// Retain at most `capacity` undrained events; `0` disables capture.
    pub fn with_event_capacity(self, capacity: usize) -> Self {
        Self {
            events: Mutex::new(EventQueue::new(capacity)),
            ..self
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn threshold(&self) -> u64 {
        self.config.inactivity_threshold_secs
    }

    fn slot(&self, wallet: &Address) -> Option<WalletSlot> {
        self.wallets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(wallet)
            .cloned()
    }

    fn slot_or_insert(&self, wallet: &Address) -> WalletSlot {
        if let Some(slot) = self.slot(wallet) {
            return slot;
        }
        self.wallets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(*wallet)
            .or_default()
            .clone()
    }

    fn emit(&self, event: SuccessionEvent) {
        lock(&self.events).push(event);
    }

    // ========================================================================
    // Liveness state machine
    // ========================================================================

    /// Record wallet activity. Called by the [`ActivityGuard`](crate::ActivityGuard)
    /// for every wallet transaction.
    ///
    /// Cancels a pending proposal. A settled wallet stays settled.
    /// Returns the new epoch.
    pub fn heartbeat(&self, wallet: &Address) -> u64 {
        let slot = self.slot_or_insert(wallet);
        let mut ws = lock(&slot);
        let now = self.clock.now();

        let fresh = ws.record.is_none();
        let record = ws
            .record
            .get_or_insert_with(|| WalletSuccessionRecord::new(now));

        if fresh {
            log::info!("Tracking wallet {} from epoch {}", wallet, record.epoch);
        } else {
            let pending = record.proposal_epoch.unwrap_or_default();
            if record.heartbeat(now) {
                log::info!(
                    "Activity on {} cancelled proposal from epoch {}",
                    wallet,
                    pending
                );
                self.emit(SuccessionEvent::ProposalCancelled {
                    wallet: *wallet,
                    proposal_epoch: pending,
                });
            }
        }
        let epoch = record.epoch;

        log::debug!("Heartbeat for {} (epoch {})", wallet, epoch);
        self.emit(SuccessionEvent::Heartbeat {
            wallet: *wallet,
            epoch,
            at: now,
        });
        epoch
    }

    /// Declare `wallet` dead. Anyone may call this.
    ///
    /// Returns the epoch the proposal belongs to.
    pub fn propose(&self, wallet: &Address) -> Result<u64, SuccessionError> {
        let slot = self.slot(wallet).ok_or(SuccessionError::NotDead)?;
        let mut ws = lock(&slot);
        let now = self.clock.now();
        let record = ws.record.as_mut().ok_or(SuccessionError::NotDead)?;

        if let Err(e) = record.propose(now, self.threshold()) {
            log::debug!("Proposal for {} rejected: {}", wallet, e);
            return Err(e);
        }

        let epoch = record.epoch;
        log::info!(
            "Wallet {} proposed dead at epoch {} ({} days inactive)",
            wallet,
            epoch,
            record.inactive_for(now) / crate::clock::DAY_SECS
        );
        self.emit(SuccessionEvent::Proposed {
            wallet: *wallet,
            epoch,
            at: now,
        });
        Ok(epoch)
    }

    /// Finalize succession of a proposed wallet. Anyone may call this.
    pub fn settle(&self, wallet: &Address) -> Result<(), SuccessionError> {
        let slot = self.slot(wallet).ok_or(SuccessionError::NotDead)?;
        let mut ws = lock(&slot);
        let now = self.clock.now();
        let record = ws.record.as_mut().ok_or(SuccessionError::NotDead)?;

        if let Err(e) = record.settle(now, self.threshold()) {
            log::debug!("Settlement of {} rejected: {}", wallet, e);
            return Err(e);
        }

        log::info!("Wallet {} settled; claims are open", wallet);
        self.emit(SuccessionEvent::Settled {
            wallet: *wallet,
            at: now,
        });
        Ok(())
    }

    // ========================================================================
    // Configuration (sender is the wallet)
    // ========================================================================

    /// Replace the wallet's fungible asset list.
    pub fn set_fungible_assets(&self, sender: &Address, assets: &[Address]) {
        let slot = self.slot_or_insert(sender);
        let mut ws = lock(&slot);
        ws.assets.set_fungible_assets(assets.iter().copied());

        log::info!(
            "Wallet {} registered {} fungible assets",
            sender,
            ws.assets.fungible_assets.len()
        );
        self.emit(SuccessionEvent::AssetsConfigured {
            wallet: *sender,
            assets: ws.assets.fungible_assets.clone(),
        });
    }

    /// Replace the wallet's fungible heir set.
    pub fn set_fungible_heirs(&self, sender: &Address, heirs: &[Address]) {
        let slot = self.slot_or_insert(sender);
        let mut ws = lock(&slot);
        ws.assets.set_fungible_heirs(heirs.iter().copied());

        log::info!(
            "Wallet {} registered {} fungible heirs",
            sender,
            ws.assets.fungible_heirs.len()
        );
        self.emit(SuccessionEvent::HeirsConfigured {
            wallet: *sender,
            heirs: ws.assets.fungible_heirs.clone(),
        });
    }

    /// Assign non-fungible items to heirs from parallel slices.
    pub fn set_non_fungible_heirs(
        &self,
        sender: &Address,
        assets: &[Address],
        items: &[ItemId],
        heirs: &[Address],
    ) -> Result<(), SuccessionError> {
        let slot = self.slot_or_insert(sender);
        let mut ws = lock(&slot);
        let assigned = ws.assets.assign_items(assets, items, heirs)?;

        log::info!("Wallet {} assigned {} items", sender, assigned.len());
        self.emit(SuccessionEvent::ItemHeirsConfigured {
            wallet: *sender,
            count: assigned.len(),
        });
        Ok(())
    }

    // ========================================================================
    // Claims
    // ========================================================================

    /// Pay `heir` their share of `asset` held by `wallet`.
    ///
    /// Checks, in order: settled (`NotDead`), registered heir (`NotHeir`),
    /// registered asset, not yet claimed, module enabled.
    pub fn claim_fungible<W>(
        &self,
        wallet: &mut W,
        asset: &Address,
        heir: &Address,
    ) -> Result<ClaimReceipt, SuccessionError>
    where
        W: Custodian + ?Sized,
    {
        self.claim_share(wallet, AssetKey::Fungible(*asset), heir)
    }

    /// Pay `heir` their share of the wallet's native balance.
    pub fn claim_native<W>(&self, wallet: &mut W, heir: &Address) -> Result<ClaimReceipt, SuccessionError>
    where
        W: Custodian + ?Sized,
    {
        self.claim_share(wallet, AssetKey::Native, heir)
    }

    fn claim_share<W>(
        &self,
        wallet: &mut W,
        asset: AssetKey,
        heir: &Address,
    ) -> Result<ClaimReceipt, SuccessionError>
    where
        W: Custodian + ?Sized,
    {
        let wallet_address = wallet.address();
        let slot = self.slot(&wallet_address).ok_or(SuccessionError::NotDead)?;

        let amount = {
            let mut ws = lock(&slot);
            if !ws.is_settled() {
                return Err(SuccessionError::NotDead);
            }
            if !ws.assets.is_fungible_heir(heir) {
                return Err(SuccessionError::NotHeir);
            }
            if let AssetKey::Fungible(token) = asset {
                if !ws.assets.is_fungible_asset(&token) {
                    return Err(SuccessionError::AssetNotRegistered(token));
                }
            }
            if ws.ledger.is_share_claimed(&asset, heir) {
                return Err(SuccessionError::Claimed);
            }
            self.ensure_enabled(wallet)?;

            let balance = match asset {
                AssetKey::Native => wallet.native_balance(&wallet_address),
                AssetKey::Fungible(token) => wallet.fungible_balance(&token, &wallet_address),
            };
            let amount = share_of(balance, &ws.assets, &ws.ledger, &asset, self.config.distribution);
            ws.ledger.record_share(asset, *heir);
            amount
        };

        if amount > 0 {
            let call = match asset {
                AssetKey::Native => WalletCall::NativeTransfer { to: *heir, amount },
                AssetKey::Fungible(token) => WalletCall::FungibleTransfer {
                    asset: token,
                    to: *heir,
                    amount,
                },
            };
            if let Err(e) = wallet.exec_from_module(&self.address, call) {
                lock(&slot).ledger.release_share(&asset, heir);
                log::warn!("Share transfer of {} to {} failed: {}", asset, heir, e);
                return Err(e.into());
            }
        } else {
            log::warn!("Heir {} claimed an empty {} share of {}", heir, asset, wallet_address);
        }

        log::info!("Heir {} claimed {} of {} from {}", heir, amount, asset, wallet_address);
        self.emit(SuccessionEvent::ShareClaimed {
            wallet: wallet_address,
            asset,
            heir: *heir,
            amount,
        });

        Ok(ClaimReceipt::Share {
            wallet: wallet_address,
            asset,
            heir: *heir,
            amount,
        })
    }

    /// Transfer item `item` of `asset` to its assigned heir.
    pub fn claim_non_fungible<W>(
        &self,
        wallet: &mut W,
        asset: &Address,
        item: ItemId,
        heir: &Address,
    ) -> Result<ClaimReceipt, SuccessionError>
    where
        W: Custodian + ?Sized,
    {
        let wallet_address = wallet.address();
        let slot = self.slot(&wallet_address).ok_or(SuccessionError::NotHeir)?;

        {
            let mut ws = lock(&slot);
            if ws.assets.item_heir(asset, item) != Some(*heir) {
                return Err(SuccessionError::NotHeir);
            }
            if !ws.is_settled() {
                return Err(SuccessionError::NotDead);
            }
            if ws.ledger.is_item_claimed(asset, item) {
                return Err(SuccessionError::Claimed);
            }
            self.ensure_enabled(wallet)?;
            ws.ledger.record_item(*asset, item);
        }

        let call = WalletCall::NonFungibleTransfer {
            asset: *asset,
            to: *heir,
            item,
        };
        if let Err(e) = wallet.exec_from_module(&self.address, call) {
            lock(&slot).ledger.release_item(asset, item);
            log::warn!("Transfer of item {} of {} to {} failed: {}", item, asset, heir, e);
            return Err(e.into());
        }

        log::info!("Heir {} claimed item {} of {} from {}", heir, item, asset, wallet_address);
        self.emit(SuccessionEvent::ItemClaimed {
            wallet: wallet_address,
            asset: *asset,
            item,
            heir: *heir,
        });

        Ok(ClaimReceipt::Item {
            wallet: wallet_address,
            asset: *asset,
            item,
            heir: *heir,
        })
    }

    fn ensure_enabled<W>(&self, wallet: &W) -> Result<(), SuccessionError>
    where
        W: Custodian + ?Sized,
    {
        if wallet.is_module_enabled(&self.address) {
            Ok(())
        } else {
            Err(SuccessionError::ModuleNotEnabled(wallet.address()))
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn record(&self, wallet: &Address) -> Option<WalletSuccessionRecord> {
        self.slot(wallet).and_then(|slot| lock(&slot).record.clone())
    }

    pub fn asset_configuration(&self, wallet: &Address) -> Option<AssetConfiguration> {
        self.slot(wallet).map(|slot| lock(&slot).assets.clone())
    }

    pub fn claim_ledger(&self, wallet: &Address) -> Option<ClaimLedger> {
        self.slot(wallet).map(|slot| lock(&slot).ledger.clone())
    }

    pub fn is_share_claimed(&self, wallet: &Address, asset: &AssetKey, heir: &Address) -> bool {
        self.slot(wallet)
            .is_some_and(|slot| lock(&slot).ledger.is_share_claimed(asset, heir))
    }

    pub fn is_item_claimed(&self, wallet: &Address, asset: &Address, item: ItemId) -> bool {
        self.slot(wallet)
            .is_some_and(|slot| lock(&slot).ledger.is_item_claimed(asset, item))
    }

    /// Managed wallet addresses (unordered).
    pub fn wallets(&self) -> Vec<Address> {
        self.wallets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drain emitted events, oldest first.
    pub fn take_events(&self) -> Vec<SuccessionEvent> {
        lock(&self.events).drain()
    }

    /// Undrained events currently held.
    pub fn pending_events(&self) -> usize {
        lock(&self.events).len()
    }

    /// Copy of all per-wallet state.
    pub fn snapshot(&self) -> SuccessionState {
        let slots: Vec<(Address, WalletSlot)> = self
            .wallets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(wallet, slot)| (*wallet, slot.clone()))
            .collect();

        SuccessionState {
            wallets: slots
                .into_iter()
                .map(|(wallet, slot)| (wallet, lock(&slot).clone()))
                .collect(),
            taken_at: Some(self.clock.now()),
            module: Some(self.config.clone()),
        }
    }
}

/// Amount owed to one heir given the wallet's live balance.
fn share_of(
    balance: Amount,
    assets: &AssetConfiguration,
    ledger: &ClaimLedger,
    asset: &AssetKey,
    policy: DistributionPolicy,
) -> Amount {
    let heirs = assets.heir_count();
    let denominator = match policy {
        DistributionPolicy::RegisteredHeirs => heirs,
        DistributionPolicy::RemainingHeirs => {
            heirs.saturating_sub(ledger.claimed_count(asset, &assets.fungible_heirs))
        }
    };
    if denominator == 0 {
        return 0;
    }
    balance / denominator as Amount
}
