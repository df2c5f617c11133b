//! Events emitted by the succession module

use crate::ledger::AssetKey;
use crate::types::{Address, Amount, ItemId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Events retained between drains unless configured otherwise.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

/// Committed state changes, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuccessionEvent {
    /// The wallet transacted; inactivity clock reset
    Heartbeat {
        wallet: Address,
        epoch: u64,
        at: Timestamp,
    },

    /// A heartbeat invalidated a pending proposal
    ProposalCancelled {
        wallet: Address,
        /// Epoch the cancelled proposal belonged to
        proposal_epoch: u64,
    },

    /// Someone declared the wallet dead
    Proposed {
        wallet: Address,
        epoch: u64,
        at: Timestamp,
    },

    /// Succession is final; claims are open
    Settled { wallet: Address, at: Timestamp },

    /// A heir received their share of a fungible asset or the native balance
    ShareClaimed {
        wallet: Address,
        asset: AssetKey,
        heir: Address,
        amount: Amount,
    },

    /// A heir received a non-fungible item
    ItemClaimed {
        wallet: Address,
        asset: Address,
        item: ItemId,
        heir: Address,
    },

    /// Fungible asset list replaced
    AssetsConfigured { wallet: Address, assets: Vec<Address> },

    /// Fungible heir set replaced
    HeirsConfigured { wallet: Address, heirs: Vec<Address> },

    /// Item heirs registered or overwritten
    ItemHeirsConfigured { wallet: Address, count: usize },
}

impl SuccessionEvent {
    /// The wallet this event concerns
    pub fn wallet(&self) -> &Address {
        match self {
            SuccessionEvent::Heartbeat { wallet, .. }
            | SuccessionEvent::ProposalCancelled { wallet, .. }
            | SuccessionEvent::Proposed { wallet, .. }
            | SuccessionEvent::Settled { wallet, .. }
            | SuccessionEvent::ShareClaimed { wallet, .. }
            | SuccessionEvent::ItemClaimed { wallet, .. }
            | SuccessionEvent::AssetsConfigured { wallet, .. }
            | SuccessionEvent::HeirsConfigured { wallet, .. }
            | SuccessionEvent::ItemHeirsConfigured { wallet, .. } => wallet,
        }
    }

    /// Whether this event moved the wallet's liveness state
    pub fn is_transition(&self) -> bool {
        matches!(
            self,
            SuccessionEvent::ProposalCancelled { .. }
                | SuccessionEvent::Proposed { .. }
                | SuccessionEvent::Settled { .. }
        )
    }
}

/// Bounded FIFO of undrained events. When full, the oldest entry is dropped.
///
/// A capacity of zero disables capture.
#[derive(Debug, Clone)]
pub struct EventQueue {
    events: VecDeque<SuccessionEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_CAPACITY)),
            capacity,
            dropped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events lost to overflow since the last drain.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn push(&mut self, event: SuccessionEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.events.len() >= self.capacity {
            self.events.pop_front();
            self.dropped += 1;
            if self.dropped == 1 {
                log::warn!(
                    "Event queue full ({} entries); dropping oldest events until drained",
                    self.capacity
                );
            }
        }
        self.events.push_back(event);
    }

    /// Remove and return all events, oldest first.
    pub fn drain(&mut self) -> Vec<SuccessionEvent> {
        if self.dropped > 0 {
            log::warn!("{} events were dropped before this drain", self.dropped);
            self.dropped = 0;
        }
        self.events.drain(..).collect()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
