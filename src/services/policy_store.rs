//! Policy store.
//!
//! Holds the global settlement policy and per-user overrides: a DashMap
//! cache in front of the ledger's `policies` table so the settlement path
//! never touches the database for a policy read.
//!
//! Writes are operator actions, last-writer-wins. Reads happen at settlement
//! time, so a policy edit applies to trades that are already active.

use crate::services::TradeLedger;
use crate::types::{PolicyError, TradePolicy};
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

const GLOBAL_SCOPE: &str = "global";

/// Global + per-user settlement policies.
pub struct PolicyStore {
    ledger: Arc<TradeLedger>,
    global: RwLock<TradePolicy>,
    overrides: DashMap<String, TradePolicy>,
}

impl PolicyStore {
    /// Create a store, loading persisted policies from the ledger. The
    /// configured default applies until an operator writes a global policy.
    pub fn new(ledger: Arc<TradeLedger>, default_policy: TradePolicy) -> Arc<Self> {
        let store = Self {
            ledger,
            global: RwLock::new(default_policy),
            overrides: DashMap::new(),
        };

        match store.ledger.load_policies() {
            Ok(persisted) => {
                let count = persisted.len();
                for (scope, policy) in persisted {
                    if scope == GLOBAL_SCOPE {
                        *store.global.write().unwrap() = policy;
                    } else {
                        store.overrides.insert(scope, policy);
                    }
                }
                if count > 0 {
                    info!("Loaded {} persisted policies", count);
                }
            }
            Err(e) => warn!("Could not load persisted policies: {}", e),
        }

        Arc::new(store)
    }

    /// The global policy.
    pub fn global(&self) -> TradePolicy {
        *self.global.read().unwrap()
    }

    /// The effective policy for a user: their override, else global.
    pub fn for_user(&self, user_id: &str) -> TradePolicy {
        self.overrides
            .get(user_id)
            .map(|p| *p.value())
            .unwrap_or_else(|| self.global())
    }

    /// A user's override, if one exists.
    pub fn user_override(&self, user_id: &str) -> Option<TradePolicy> {
        self.overrides.get(user_id).map(|p| *p.value())
    }

    /// Replace the global policy. Validated at write time.
    pub fn set_global(&self, policy: TradePolicy) -> Result<(), PolicyError> {
        policy.validate()?;
        self.ledger
            .save_policy(GLOBAL_SCOPE, &policy)
            .map_err(|e| PolicyError::Database(e.to_string()))?;
        *self.global.write().unwrap() = policy;
        info!(
            win_rate_bp = policy.win_rate_bp,
            forced = ?policy.forced_outcome,
            "Global policy updated"
        );
        Ok(())
    }

    /// Set a per-user override. Validated at write time.
    pub fn set_user(&self, user_id: &str, policy: TradePolicy) -> Result<(), PolicyError> {
        policy.validate()?;
        self.ledger
            .save_policy(user_id, &policy)
            .map_err(|e| PolicyError::Database(e.to_string()))?;
        self.overrides.insert(user_id.to_string(), policy);
        info!(user_id, win_rate_bp = policy.win_rate_bp, "User policy updated");
        Ok(())
    }

    /// Clear a per-user override; the user falls back to the global policy.
    pub fn clear_user(&self, user_id: &str) -> Result<(), PolicyError> {
        self.ledger
            .delete_policy(user_id)
            .map_err(|e| PolicyError::Database(e.to_string()))?;
        self.overrides.remove(user_id);
        Ok(())
    }
}
