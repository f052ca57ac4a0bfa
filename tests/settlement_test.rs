//! End-to-end tests for the settlement engine
//!
//! Tests cover:
//! - Escrow/settle balance arithmetic (win and loss scenarios)
//! - Exactly-once logical settlement under timer fire and operator override
//! - Restart recovery (overdue settlement + timer re-arming)
//! - Policy read-at-settlement-time behavior
//! - Notification fan-out to the owner and operator channels
//! - TradeService validation

use mirage::config::TradeLimits;
use mirage::services::{
    LedgerError, NotificationBus, PolicyStore, PriceFeed, SettlementScheduler, TradeError,
    TradeLedger, TradeService,
};
use mirage::types::*;
use mirage::websocket::ConnectionRegistry;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    ledger: Arc<TradeLedger>,
    policies: Arc<PolicyStore>,
    registry: Arc<ConnectionRegistry>,
    scheduler: Arc<SettlementScheduler>,
    service: Arc<TradeService>,
}

fn harness_over(ledger: Arc<TradeLedger>, default_policy: TradePolicy) -> Harness {
    let policies = PolicyStore::new(ledger.clone(), default_policy);
    let feed = Arc::new(PriceFeed::new());
    let registry = ConnectionRegistry::new();
    let notifier = NotificationBus::new(registry.clone());
    let scheduler =
        SettlementScheduler::new(ledger.clone(), policies.clone(), feed.clone(), notifier);
    let service = TradeService::new(
        TradeLimits::default(),
        ledger.clone(),
        scheduler.clone(),
        feed,
    );
    Harness {
        ledger,
        policies,
        registry,
        scheduler,
        service,
    }
}

fn harness(default_policy: TradePolicy) -> Harness {
    harness_over(
        Arc::new(TradeLedger::new_in_memory().unwrap()),
        default_policy,
    )
}

/// 100% win rate at a fixed 85% profit rate.
fn win_policy() -> TradePolicy {
    TradePolicy {
        win_rate_bp: 10_000,
        profit_rate_min_bp: 8_500,
        profit_rate_max_bp: 8_500,
        forced_outcome: None,
    }
}

/// 0% win rate.
fn lose_policy() -> TradePolicy {
    TradePolicy {
        win_rate_bp: 0,
        ..win_policy()
    }
}

/// A trade whose settlement is due `due_in_ms` from now (tests can't wait
/// out the 30s production minimum).
fn quick_trade(user_id: &str, stake: f64, due_in_ms: i64) -> Trade {
    let mut trade = Trade::new(
        user_id.to_string(),
        "BTC/USDT".to_string(),
        stake,
        TradeDirection::Up,
        30,
        67_000.0,
    );
    trade.expires_at = trade.created_at + due_in_ms;
    trade
}

// =============================================================================
// Settlement flow
// =============================================================================

mod settlement_flow {
    use super::*;

    #[tokio::test]
    async fn test_win_scenario() {
        let h = harness(win_policy());
        h.ledger.credit("user-1", 100.0).unwrap();

        let trade = quick_trade("user-1", 40.0, 200);
        h.ledger.escrow(&trade).unwrap();
        assert_eq!(h.ledger.balance("user-1").unwrap(), Some(60.0));
        h.scheduler.arm(&trade);

        tokio::time::sleep(Duration::from_millis(800)).await;

        // 100 - 40 (escrow) + 40 + 34 (85% of 40)
        assert_eq!(h.ledger.balance("user-1").unwrap(), Some(134.0));
        let settled = h.ledger.get_trade(&trade.id).unwrap().unwrap();
        assert_eq!(settled.state, TradeState::Settled);
        assert_eq!(settled.outcome, Some(TradeOutcome::Win));
        assert_eq!(settled.profit, Some(34.0));
        assert!(settled.exit_price.is_some());
    }

    #[tokio::test]
    async fn test_loss_scenario() {
        let h = harness(lose_policy());
        h.ledger.credit("user-1", 100.0).unwrap();

        let trade = quick_trade("user-1", 40.0, 200);
        h.ledger.escrow(&trade).unwrap();
        h.scheduler.arm(&trade);

        tokio::time::sleep(Duration::from_millis(800)).await;

        // 100 - 40 + 40 + (-40): the stake is forfeited
        assert_eq!(h.ledger.balance("user-1").unwrap(), Some(60.0));
        let settled = h.ledger.get_trade(&trade.id).unwrap().unwrap();
        assert_eq!(settled.outcome, Some(TradeOutcome::Lose));
        assert_eq!(settled.profit, Some(-40.0));
    }

    #[tokio::test]
    async fn test_exactly_one_outcome_across_many_trades() {
        let h = harness(win_policy());
        h.ledger.credit("user-1", 1000.0).unwrap();

        let mut ids = Vec::new();
        for _ in 0..10 {
            let trade = quick_trade("user-1", 10.0, 200);
            h.ledger.escrow(&trade).unwrap();
            h.scheduler.arm(&trade);
            ids.push(trade.id);
        }

        tokio::time::sleep(Duration::from_millis(1000)).await;

        for id in &ids {
            let trade = h.ledger.get_trade(id).unwrap().unwrap();
            assert_eq!(trade.state, TradeState::Settled);
            assert!(trade.outcome.is_some());
            assert!(trade.settled_at.is_some());
        }
        assert!(h.ledger.pending().unwrap().is_empty());
        assert_eq!(h.scheduler.pending_timers(), 0);
    }

    #[tokio::test]
    async fn test_balance_conservation_with_open_trades() {
        let h = harness(win_policy());
        h.ledger.credit("user-1", 100.0).unwrap();

        // Two settle quickly, one stays active
        let quick_a = quick_trade("user-1", 20.0, 200);
        let quick_b = quick_trade("user-1", 10.0, 200);
        let open = quick_trade("user-1", 25.0, 60_000);
        for trade in [&quick_a, &quick_b, &open] {
            h.ledger.escrow(trade).unwrap();
            h.scheduler.arm(trade);
        }

        tokio::time::sleep(Duration::from_millis(800)).await;

        // 100 - 25 (still escrowed) + 17 + 8.5 (85% wins on the settled two)
        let balance = h.ledger.balance("user-1").unwrap().unwrap();
        assert!((balance - 100.5).abs() < 1e-9, "balance was {}", balance);

        let active = h.ledger.active_trades("user-1").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, open.id);
    }

    #[tokio::test]
    async fn test_overdue_trade_settles_promptly() {
        let h = harness(win_policy());
        h.ledger.credit("user-1", 50.0).unwrap();

        // Already past due when armed
        let trade = quick_trade("user-1", 10.0, -5_000);
        h.ledger.escrow(&trade).unwrap();
        h.scheduler.arm(&trade);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let settled = h.ledger.get_trade(&trade.id).unwrap().unwrap();
        assert_eq!(settled.state, TradeState::Settled);
    }
}

// =============================================================================
// Operator early settlement
// =============================================================================

mod early_settlement {
    use super::*;

    #[tokio::test]
    async fn test_forced_outcome_overrides_policy() {
        let h = harness(lose_policy());
        h.ledger.credit("user-1", 100.0).unwrap();

        let trade = quick_trade("user-1", 40.0, 60_000);
        h.ledger.escrow(&trade).unwrap();
        h.scheduler.arm(&trade);

        // Policy says always lose; the operator forces a win
        let settled = h
            .scheduler
            .settle_now(&trade.id, Some(TradeOutcome::Win))
            .unwrap();
        assert_eq!(settled.trade.outcome, Some(TradeOutcome::Win));
        assert_eq!(settled.trade.profit, Some(34.0));
        assert_eq!(settled.new_balance, 134.0);
    }

    #[tokio::test]
    async fn test_early_settlement_without_forced_outcome_uses_policy() {
        let h = harness(lose_policy());
        h.ledger.credit("user-1", 100.0).unwrap();

        let trade = quick_trade("user-1", 40.0, 60_000);
        h.ledger.escrow(&trade).unwrap();
        h.scheduler.arm(&trade);

        let settled = h.scheduler.settle_now(&trade.id, None).unwrap();
        assert_eq!(settled.trade.outcome, Some(TradeOutcome::Lose));
    }

    #[tokio::test]
    async fn test_double_settlement_is_a_noop() {
        let h = harness(win_policy());
        h.ledger.credit("user-1", 100.0).unwrap();

        let trade = quick_trade("user-1", 40.0, 200);
        h.ledger.escrow(&trade).unwrap();
        h.scheduler.arm(&trade);

        tokio::time::sleep(Duration::from_millis(800)).await;

        // The timer already settled it; the operator override must not
        // double-credit
        let second = h.scheduler.settle_now(&trade.id, Some(TradeOutcome::Win));
        assert!(matches!(second, Err(LedgerError::AlreadySettled(_))));
        assert_eq!(h.ledger.balance("user-1").unwrap(), Some(134.0));
    }

    #[tokio::test]
    async fn test_settle_unknown_trade() {
        let h = harness(win_policy());
        assert!(matches!(
            h.scheduler.settle_now("missing", None),
            Err(LedgerError::TradeNotFound(_))
        ));
    }
}

// =============================================================================
// Restart recovery
// =============================================================================

mod recovery {
    use super::*;

    #[tokio::test]
    async fn test_overdue_trade_settled_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ledger.db");

        let trade = quick_trade("user-1", 40.0, -15_000);
        {
            // First process: escrow, then "crash" before the timer fires
            let ledger = Arc::new(TradeLedger::new(&db_path).unwrap());
            ledger.credit("user-1", 100.0).unwrap();
            ledger.escrow(&trade).unwrap();
        }

        // Second process: the recovery scan finds the overdue trade
        let ledger = Arc::new(TradeLedger::new(&db_path).unwrap());
        let h = harness_over(ledger, win_policy());
        let recovered = h.scheduler.recover().unwrap();
        assert_eq!(recovered, 1);

        tokio::time::sleep(Duration::from_millis(500)).await;

        let settled = h.ledger.get_trade(&trade.id).unwrap().unwrap();
        assert_eq!(settled.state, TradeState::Settled);
        assert_eq!(h.ledger.balance("user-1").unwrap(), Some(134.0));
        assert!(h.ledger.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_future_trade_rearmed_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ledger.db");

        let trade = quick_trade("user-1", 10.0, 600);
        {
            let ledger = Arc::new(TradeLedger::new(&db_path).unwrap());
            ledger.credit("user-1", 100.0).unwrap();
            ledger.escrow(&trade).unwrap();
        }

        let ledger = Arc::new(TradeLedger::new(&db_path).unwrap());
        let h = harness_over(ledger, win_policy());
        h.scheduler.recover().unwrap();

        // Still active: the due time hasn't passed yet
        assert_eq!(
            h.ledger.get_trade(&trade.id).unwrap().unwrap().state,
            TradeState::Active
        );

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert_eq!(
            h.ledger.get_trade(&trade.id).unwrap().unwrap().state,
            TradeState::Settled
        );
    }
}

// =============================================================================
// Policy behavior
// =============================================================================

mod policy_behavior {
    use super::*;

    #[tokio::test]
    async fn test_policy_read_at_settlement_time() {
        let h = harness(lose_policy());
        h.ledger.credit("user-1", 100.0).unwrap();

        let trade = quick_trade("user-1", 40.0, 400);
        h.ledger.escrow(&trade).unwrap();
        h.scheduler.arm(&trade);

        // Policy edited while the trade is active: the edit wins
        h.policies.set_global(win_policy()).unwrap();

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let settled = h.ledger.get_trade(&trade.id).unwrap().unwrap();
        assert_eq!(settled.outcome, Some(TradeOutcome::Win));
    }

    #[tokio::test]
    async fn test_per_user_override_scopes_to_that_user() {
        let h = harness(win_policy());
        h.ledger.credit("lucky", 100.0).unwrap();
        h.ledger.credit("unlucky", 100.0).unwrap();

        h.policies
            .set_user(
                "unlucky",
                TradePolicy {
                    forced_outcome: Some(TradeOutcome::Lose),
                    ..win_policy()
                },
            )
            .unwrap();

        let lucky_trade = quick_trade("lucky", 40.0, 200);
        let unlucky_trade = quick_trade("unlucky", 40.0, 200);
        for trade in [&lucky_trade, &unlucky_trade] {
            h.ledger.escrow(trade).unwrap();
            h.scheduler.arm(trade);
        }

        tokio::time::sleep(Duration::from_millis(800)).await;

        assert_eq!(
            h.ledger.get_trade(&lucky_trade.id).unwrap().unwrap().outcome,
            Some(TradeOutcome::Win)
        );
        assert_eq!(
            h.ledger
                .get_trade(&unlucky_trade.id)
                .unwrap()
                .unwrap()
                .outcome,
            Some(TradeOutcome::Lose)
        );
    }
}

// =============================================================================
// Notifications
// =============================================================================

mod notifications {
    use super::*;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_result_routed_to_owner_and_operators() {
        let h = harness(win_policy());
        h.ledger.credit("user-1", 100.0).unwrap();

        let (user_tx, mut user_rx) = mpsc::channel(8);
        let (ops_tx, mut ops_rx) = mpsc::channel(8);
        h.registry.attach_user("user-1", Uuid::new_v4(), user_tx);
        h.registry.attach_operator(Uuid::new_v4(), ops_tx);

        let trade = quick_trade("user-1", 40.0, 60_000);
        h.ledger.escrow(&trade).unwrap();
        h.scheduler.arm(&trade);
        h.scheduler.settle_now(&trade.id, None).unwrap();

        let result = user_rx.try_recv().unwrap();
        assert!(result.contains("\"type\":\"trade_result\""));
        assert!(result.contains(&trade.id));
        assert!(result.contains("\"new_balance\":134.0"));

        let activity = ops_rx.try_recv().unwrap();
        assert!(activity.contains("\"type\":\"trade_activity\""));
        assert!(activity.contains("\"user_id\":\"user-1\""));
        assert!(activity.contains("\"stake\":40.0"));
    }

    #[tokio::test]
    async fn test_offline_user_does_not_fail_settlement() {
        let h = harness(win_policy());
        h.ledger.credit("user-1", 100.0).unwrap();

        let trade = quick_trade("user-1", 40.0, 60_000);
        h.ledger.escrow(&trade).unwrap();
        h.scheduler.arm(&trade);

        // No channels attached at all: settlement still commits
        let settled = h.scheduler.settle_now(&trade.id, None).unwrap();
        assert_eq!(settled.new_balance, 134.0);
    }
}

// =============================================================================
// TradeService validation
// =============================================================================

mod service_validation {
    use super::*;

    fn request(stake: f64, duration_seconds: u32) -> CreateTradeRequest {
        CreateTradeRequest {
            pair: "BTC/USDT".to_string(),
            stake,
            direction: TradeDirection::Up,
            duration_seconds,
        }
    }

    #[tokio::test]
    async fn test_create_trade_happy_path() {
        let h = harness(win_policy());
        h.ledger.credit("user-1", 100.0).unwrap();

        let trade = h.service.create_trade("user-1", request(40.0, 30)).unwrap();
        assert_eq!(trade.state, TradeState::Active);
        assert_eq!(trade.duration_seconds, 30);
        assert!(trade.entry_price > 0.0);
        assert_eq!(h.ledger.balance("user-1").unwrap(), Some(60.0));

        let active = h.service.list_active("user-1").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, trade.id);
    }

    #[tokio::test]
    async fn test_rejects_disallowed_duration() {
        let h = harness(win_policy());
        h.ledger.credit("user-1", 100.0).unwrap();

        let result = h.service.create_trade("user-1", request(40.0, 45));
        assert!(matches!(result, Err(TradeError::InvalidDuration(45))));
        // Nothing escrowed
        assert_eq!(h.ledger.balance("user-1").unwrap(), Some(100.0));
    }

    #[tokio::test]
    async fn test_rejects_stake_out_of_range() {
        let h = harness(win_policy());
        h.ledger.credit("user-1", 100.0).unwrap();

        assert!(matches!(
            h.service.create_trade("user-1", request(0.5, 30)),
            Err(TradeError::StakeOutOfRange { .. })
        ));
        assert!(matches!(
            h.service.create_trade("user-1", request(20_000.0, 30)),
            Err(TradeError::StakeOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_unknown_pair() {
        let h = harness(win_policy());
        h.ledger.credit("user-1", 100.0).unwrap();

        let result = h.service.create_trade(
            "user-1",
            CreateTradeRequest {
                pair: "SHIB/USDT".to_string(),
                stake: 40.0,
                direction: TradeDirection::Down,
                duration_seconds: 30,
            },
        );
        assert!(matches!(result, Err(TradeError::UnknownPair(_))));
    }

    #[tokio::test]
    async fn test_rejects_insufficient_balance() {
        let h = harness(win_policy());
        h.ledger.credit("user-1", 10.0).unwrap();

        let result = h.service.create_trade("user-1", request(40.0, 30));
        assert!(matches!(
            result,
            Err(TradeError::Ledger(LedgerError::InsufficientBalance { .. }))
        ));
    }

    #[tokio::test]
    async fn test_history_pages_newest_first() {
        let h = harness(win_policy());
        h.ledger.credit("user-1", 1000.0).unwrap();

        for _ in 0..5 {
            h.service.create_trade("user-1", request(10.0, 30)).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let page = h.service.list_history("user-1", 1, 2).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.trades.len(), 2);
        assert!(page.trades[0].created_at >= page.trades[1].created_at);

        let last = h.service.list_history("user-1", 3, 2).unwrap();
        assert_eq!(last.trades.len(), 1);
    }
}
