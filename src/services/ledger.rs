//! Trade ledger.
//!
//! SQLite-backed source of truth for balances, trades, the balance
//! transaction audit trail, and persisted settlement policies.
//!
//! The two money-moving operations, `escrow` and `settle`, each run as a
//! single SQLite transaction: no observer can see a settled trade without its
//! balance credit, or an escrowed stake without its trade row. `settle` is
//! idempotent per trade id; the state flip doubles as the claim.

use crate::types::{
    Trade, TradeDirection, TradeOutcome, TradePolicy, TradeState, TransactionKind,
    TransactionRecord,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: f64, available: f64 },

    #[error("Trade not found: {0}")]
    TradeNotFound(String),

    #[error("Trade already settled: {0}")]
    AlreadySettled(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}

/// A settled trade together with the balance it produced.
#[derive(Debug, Clone)]
pub struct SettledTrade {
    pub trade: Trade,
    pub new_balance: f64,
}

/// SQLite trade ledger.
pub struct TradeLedger {
    conn: Mutex<Connection>,
}

impl TradeLedger {
    /// Open (or create) a ledger at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        let ledger = Self {
            conn: Mutex::new(conn),
        };
        ledger.init_schema()?;
        info!("Trade ledger initialized");
        Ok(ledger)
    }

    /// Create an in-memory ledger (for testing).
    pub fn new_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        let ledger = Self {
            conn: Mutex::new(conn),
        };
        ledger.init_schema()?;
        debug!("In-memory trade ledger initialized");
        Ok(ledger)
    }

    fn init_schema(&self) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS balances (
                user_id TEXT PRIMARY KEY,
                balance REAL NOT NULL DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                pair TEXT NOT NULL,
                stake REAL NOT NULL,
                direction TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL,
                state TEXT NOT NULL DEFAULT 'active',
                outcome TEXT,
                profit REAL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                settled_at INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_user ON trades(user_id, created_at DESC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_state ON trades(state, expires_at)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                trade_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                amount REAL NOT NULL,
                balance_before REAL NOT NULL,
                balance_after REAL NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transactions_user
             ON transactions(user_id, created_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS policies (
                scope TEXT PRIMARY KEY,
                win_rate_bp INTEGER NOT NULL,
                profit_rate_min_bp INTEGER NOT NULL,
                profit_rate_max_bp INTEGER NOT NULL,
                forced_outcome TEXT
            )",
            [],
        )?;

        Ok(())
    }

    // ========== Balances ==========

    /// Credit a user's balance (deposits, seeding). Returns the new balance.
    pub fn credit(&self, user_id: &str, amount: f64) -> Result<f64, LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO balances (user_id, balance) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET balance = balance + excluded.balance",
            params![user_id, amount],
        )?;
        let balance = conn.query_row(
            "SELECT balance FROM balances WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(balance)
    }

    /// Get a user's balance, if they have one.
    pub fn balance(&self, user_id: &str) -> Result<Option<f64>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let balance = conn
            .query_row(
                "SELECT balance FROM balances WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance)
    }

    // ========== Escrow ==========

    /// Escrow the stake and record the trade, atomically.
    ///
    /// The debit is a conditional update: it only applies when the balance
    /// covers the stake, so two concurrent escrows cannot both pass a check
    /// only one can satisfy.
    pub fn escrow(&self, trade: &Trade) -> Result<(), LedgerError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(LedgerError::from)?;

        let available: f64 = tx
            .query_row(
                "SELECT balance FROM balances WHERE user_id = ?1",
                params![&trade.user_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0.0);

        let debited = tx.execute(
            "UPDATE balances SET balance = balance - ?1
             WHERE user_id = ?2 AND balance >= ?1",
            params![trade.stake, &trade.user_id],
        )?;
        if debited == 0 {
            return Err(LedgerError::InsufficientBalance {
                needed: trade.stake,
                available,
            });
        }

        tx.execute(
            "INSERT INTO trades
             (id, user_id, pair, stake, direction, duration_seconds, entry_price,
              state, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8, ?9)",
            params![
                &trade.id,
                &trade.user_id,
                &trade.pair,
                trade.stake,
                trade.direction.to_string(),
                trade.duration_seconds,
                trade.entry_price,
                trade.created_at,
                trade.expires_at,
            ],
        )?;

        tx.execute(
            "INSERT INTO transactions
             (id, user_id, trade_id, kind, amount, balance_before, balance_after, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                &trade.user_id,
                &trade.id,
                TransactionKind::Escrow.to_string(),
                trade.stake,
                available,
                available - trade.stake,
                trade.created_at,
            ],
        )?;

        tx.commit()?;
        debug!(trade_id = %trade.id, stake = trade.stake, "Escrowed stake");
        Ok(())
    }

    // ========== Settlement ==========

    /// Settle a trade, atomically: flip it to Settled, credit the balance by
    /// `stake + profit`, append the audit record.
    ///
    /// Idempotent per trade id. A second call observes the claimed state and
    /// returns `AlreadySettled` without touching the balance; the scheduler
    /// treats that as a no-op.
    pub fn settle(
        &self,
        trade_id: &str,
        outcome: TradeOutcome,
        profit: f64,
        exit_price: f64,
    ) -> Result<SettledTrade, LedgerError> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(LedgerError::from)?;

        let claimed = tx.execute(
            "UPDATE trades
             SET state = 'settled', outcome = ?2, profit = ?3, exit_price = ?4,
                 settled_at = ?5
             WHERE id = ?1 AND state = 'active'",
            params![trade_id, outcome.to_string(), profit, exit_price, now],
        )?;
        if claimed == 0 {
            let exists: Option<String> = tx
                .query_row(
                    "SELECT state FROM trades WHERE id = ?1",
                    params![trade_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match exists {
                Some(_) => LedgerError::AlreadySettled(trade_id.to_string()),
                None => LedgerError::TradeNotFound(trade_id.to_string()),
            });
        }

        let trade = tx
            .query_row(
                &format!("SELECT {} FROM trades WHERE id = ?1", TRADE_COLUMNS),
                params![trade_id],
                row_to_trade,
            )
            .map_err(LedgerError::from)?;

        let balance_before: f64 = tx
            .query_row(
                "SELECT balance FROM balances WHERE user_id = ?1",
                params![&trade.user_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0.0);
        let credit = trade.stake + profit;
        let balance_after = balance_before + credit;

        tx.execute(
            "INSERT INTO balances (user_id, balance) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET balance = balance + excluded.balance",
            params![&trade.user_id, credit],
        )?;

        let kind = match outcome {
            TradeOutcome::Win => TransactionKind::TradeWin,
            TradeOutcome::Lose => TransactionKind::TradeLose,
        };
        tx.execute(
            "INSERT INTO transactions
             (id, user_id, trade_id, kind, amount, balance_before, balance_after, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                &trade.user_id,
                trade_id,
                kind.to_string(),
                profit.abs(),
                balance_before,
                balance_after,
                now,
            ],
        )?;

        tx.commit()?;
        debug!(trade_id, %outcome, profit, "Settled trade");
        Ok(SettledTrade {
            trade,
            new_balance: balance_after,
        })
    }

    // ========== Queries ==========

    /// Get a trade by id.
    pub fn get_trade(&self, trade_id: &str) -> Result<Option<Trade>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let trade = conn
            .query_row(
                &format!("SELECT {} FROM trades WHERE id = ?1", TRADE_COLUMNS),
                params![trade_id],
                row_to_trade,
            )
            .optional()?;
        Ok(trade)
    }

    /// All active trades for a user.
    pub fn active_trades(&self, user_id: &str) -> Result<Vec<Trade>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM trades
             WHERE user_id = ?1 AND state = 'active'
             ORDER BY expires_at ASC",
            TRADE_COLUMNS
        ))?;
        let trades = stmt
            .query_map(params![user_id], row_to_trade)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(trades)
    }

    /// All active trades across users, soonest expiry first. Recovery scan.
    pub fn pending(&self) -> Result<Vec<Trade>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM trades WHERE state = 'active' ORDER BY expires_at ASC",
            TRADE_COLUMNS
        ))?;
        let trades = stmt
            .query_map([], row_to_trade)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(trades)
    }

    /// One page of a user's trades, newest first, plus the total count.
    pub fn history(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Trade>, u64), LedgerError> {
        let conn = self.conn.lock().unwrap();
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM trades WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM trades
             WHERE user_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2 OFFSET ?3",
            TRADE_COLUMNS
        ))?;
        let trades = stmt
            .query_map(params![user_id, limit, offset], row_to_trade)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((trades, total))
    }

    /// Balance transaction audit trail for a user, newest first.
    pub fn transactions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, trade_id, kind, amount, balance_before, balance_after,
                    created_at
             FROM transactions
             WHERE user_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;
        let records = stmt
            .query_map(params![user_id, limit], |row| {
                Ok(TransactionRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    trade_id: row.get(2)?,
                    kind: parse_transaction_kind(&row.get::<_, String>(3)?),
                    amount: row.get(4)?,
                    balance_before: row.get(5)?,
                    balance_after: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ========== Policies ==========

    /// Persist a policy for a scope ("global" or a user id).
    pub fn save_policy(&self, scope: &str, policy: &TradePolicy) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO policies
             (scope, win_rate_bp, profit_rate_min_bp, profit_rate_max_bp, forced_outcome)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(scope) DO UPDATE SET
                win_rate_bp = excluded.win_rate_bp,
                profit_rate_min_bp = excluded.profit_rate_min_bp,
                profit_rate_max_bp = excluded.profit_rate_max_bp,
                forced_outcome = excluded.forced_outcome",
            params![
                scope,
                policy.win_rate_bp,
                policy.profit_rate_min_bp,
                policy.profit_rate_max_bp,
                policy.forced_outcome.map(|o| o.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Remove a scope's policy.
    pub fn delete_policy(&self, scope: &str) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM policies WHERE scope = ?1", params![scope])?;
        Ok(())
    }

    /// Load all persisted policies as (scope, policy) pairs.
    pub fn load_policies(&self) -> Result<Vec<(String, TradePolicy)>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT scope, win_rate_bp, profit_rate_min_bp, profit_rate_max_bp, forced_outcome
             FROM policies",
        )?;
        let policies = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    TradePolicy {
                        win_rate_bp: row.get(1)?,
                        profit_rate_min_bp: row.get(2)?,
                        profit_rate_max_bp: row.get(3)?,
                        forced_outcome: row
                            .get::<_, Option<String>>(4)?
                            .and_then(|s| parse_outcome(&s)),
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(policies)
    }
}

const TRADE_COLUMNS: &str = "id, user_id, pair, stake, direction, duration_seconds, \
     entry_price, exit_price, state, outcome, profit, created_at, expires_at, settled_at";

fn row_to_trade(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trade> {
    Ok(Trade {
        id: row.get(0)?,
        user_id: row.get(1)?,
        pair: row.get(2)?,
        stake: row.get(3)?,
        direction: parse_direction(&row.get::<_, String>(4)?),
        duration_seconds: row.get(5)?,
        entry_price: row.get(6)?,
        exit_price: row.get(7)?,
        state: parse_state(&row.get::<_, String>(8)?),
        outcome: row.get::<_, Option<String>>(9)?.and_then(|s| parse_outcome(&s)),
        profit: row.get(10)?,
        created_at: row.get(11)?,
        expires_at: row.get(12)?,
        settled_at: row.get(13)?,
    })
}

fn parse_direction(s: &str) -> TradeDirection {
    match s {
        "down" => TradeDirection::Down,
        _ => TradeDirection::Up,
    }
}

fn parse_state(s: &str) -> TradeState {
    match s {
        "settled" => TradeState::Settled,
        _ => TradeState::Active,
    }
}

fn parse_outcome(s: &str) -> Option<TradeOutcome> {
    match s {
        "win" => Some(TradeOutcome::Win),
        "lose" => Some(TradeOutcome::Lose),
        _ => None,
    }
}

fn parse_transaction_kind(s: &str) -> TransactionKind {
    match s {
        "trade_win" => TransactionKind::TradeWin,
        "trade_lose" => TransactionKind::TradeLose,
        _ => TransactionKind::Escrow,
    }
}
