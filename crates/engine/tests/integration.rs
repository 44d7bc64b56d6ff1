//! End-to-end allocation runs against the in-memory ledger.
//!
//! ```bash
//! cargo test -p collateral-engine --test integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use collateral_common::AppError;
use collateral_common::types::{
    AllocationStatus, ComplianceStatus, RateTable, Role, Ruleset, Security, TransactionStatus,
};
use collateral_engine::compliance::ComplianceViolation;
use collateral_engine::cutoff::CutoffMonitor;
use collateral_engine::orchestrator::{AllocationOrchestrator, AllocationRequest};
use collateral_engine::testing::{
    DEAL, DESTINATION, GatedRulesets, PLEDGEE, SOURCE, StaticPrices, StaticRates, StaticRulesets,
    holding, make_transaction, rates, ruleset, seeded_ledger,
};
use collateral_ledger::{AccountService, DealService, Ledger, MemoryStore};

// ============================================================
// Shared helpers
// ============================================================

struct Harness {
    orchestrator: AllocationOrchestrator,
    ledger: Ledger,
    store: Arc<MemoryStore>,
    prices: Arc<StaticPrices>,
}

async fn harness(
    rulesets: StaticRulesets,
    prices: &[(&str, Decimal)],
    fx: StaticRates,
    holdings: &[Security],
    rqv: Decimal,
) -> Harness {
    let (ledger, store) = seeded_ledger().await;
    for h in holdings {
        ledger.add_security(h).await.unwrap();
    }
    ledger
        .create_transaction(&make_transaction("T1", rqv))
        .await
        .unwrap();

    let prices = Arc::new(StaticPrices::new(prices));
    let orchestrator = AllocationOrchestrator::new(
        ledger.clone(),
        Arc::new(rulesets),
        prices.clone(),
        Arc::new(fx),
        Duration::from_secs(5),
    );

    Harness {
        orchestrator,
        ledger,
        store,
        prices,
    }
}

fn request() -> AllocationRequest {
    AllocationRequest {
        deal_id: DEAL.to_string(),
        transaction_id: "T1".to_string(),
        source_account: SOURCE.to_string(),
        destination_account: DESTINATION.to_string(),
    }
}

fn eur() -> RateTable {
    rates("EUR", &[("USD", dec!(1.25))])
}

fn govt_and_muni() -> Ruleset {
    ruleset(&[
        ("Govt Securities", dec!(50), 1, dec!(90)),
        ("Municipal Securities", dec!(50), 2, dec!(90)),
        ("Equities", dec!(0), 3, dec!(80)),
    ])
}

async fn quantity(ledger: &Ledger, account: &str, security_id: &str) -> Option<Decimal> {
    ledger
        .get_securities_by_account(account)
        .await
        .unwrap()
        .into_iter()
        .find(|h| h.security_id == security_id)
        .map(|h| h.quantity)
}

// ============================================================
// Successful runs
// ============================================================

#[tokio::test]
async fn test_successful_allocation_moves_collateral_and_is_compliant() {
    let holdings = vec![
        holding(SOURCE, "G1", "Govt Securities", dec!(4), dec!(90), "EUR"),
        holding(SOURCE, "M1", "Municipal Securities", dec!(20), dec!(50), "EUR"),
        holding(SOURCE, "EQ1", "Equities", dec!(100), dec!(10), "EUR"),
        holding(SOURCE, "ART", "Fine Art", dec!(1), dec!(1000), "EUR"),
        holding(DESTINATION, "G1", "Govt Securities", dec!(2), dec!(90), "EUR"),
    ];
    let h = harness(
        StaticRulesets::new(govt_and_muni()),
        &[("G1", dec!(100)), ("M1", dec!(50))],
        StaticRates::new(eur()),
        &holdings,
        dec!(900),
    )
    .await;

    let outcome = h.orchestrator.start_allocation(&request()).await.unwrap();

    assert!(outcome.is_successful());
    assert_eq!(outcome.code, 200);
    assert_eq!(outcome.compliance_status, ComplianceStatus::Compliant);
    assert_eq!(outcome.shortfall, Decimal::ZERO);

    // pooled G1 = 4 + 2, 5 units fill the 450 govt ceiling; M1 covers the rest
    assert_eq!(quantity(&h.ledger, DESTINATION, "G1").await, Some(dec!(5)));
    assert_eq!(quantity(&h.ledger, SOURCE, "G1").await, Some(dec!(1)));
    assert_eq!(quantity(&h.ledger, DESTINATION, "M1").await, Some(dec!(10)));
    assert_eq!(quantity(&h.ledger, SOURCE, "M1").await, Some(dec!(10)));

    // ineligible holdings stay where they were
    assert_eq!(quantity(&h.ledger, SOURCE, "EQ1").await, Some(dec!(100)));
    assert_eq!(quantity(&h.ledger, SOURCE, "ART").await, Some(dec!(1)));
    assert_eq!(quantity(&h.ledger, DESTINATION, "EQ1").await, None);

    let tx = h.ledger.get_transaction("T1").await.unwrap();
    assert_eq!(tx.allocation_status, AllocationStatus::Successful);
    assert_eq!(tx.compliance_status, ComplianceStatus::Compliant);
    assert_eq!(tx.conversion_rates.map(|r| r.base), Some("EUR".to_string()));
    assert!(h.ledger.get_deal(DEAL).await.unwrap().last_successful_allocation.is_some());

    let report = outcome.report.unwrap();
    assert_eq!(report.public_ruleset_version, "2017.1");
    assert_eq!(report.plan.len(), 2);
    assert!(report.violations.is_empty());
}

#[tokio::test]
async fn test_prices_refreshed_once_per_eligible_security() {
    let holdings = vec![
        holding(SOURCE, "G1", "Govt Securities", dec!(4), dec!(90), "EUR"),
        holding(SOURCE, "M1", "Municipal Securities", dec!(20), dec!(50), "EUR"),
        holding(SOURCE, "EQ1", "Equities", dec!(100), dec!(10), "EUR"),
        holding(DESTINATION, "G1", "Govt Securities", dec!(2), dec!(90), "EUR"),
    ];
    let h = harness(
        StaticRulesets::new(govt_and_muni()),
        &[("G1", dec!(100)), ("M1", dec!(50))],
        StaticRates::new(eur()),
        &holdings,
        dec!(900),
    )
    .await;

    h.orchestrator.start_allocation(&request()).await.unwrap();

    assert_eq!(h.prices.lookups(), vec!["G1", "M1"]);
    let moved = h
        .ledger
        .get_securities_by_account(DESTINATION)
        .await
        .unwrap();
    assert!(moved.iter().all(|s| s.security_id != "G1" || s.market_price == dec!(100)));
    assert!(moved.iter().all(|s| s.valuation_percentage == Some(dec!(90))));
}

#[tokio::test]
async fn test_quantity_conserved_per_security() {
    let holdings = vec![
        holding(SOURCE, "G1", "Govt Securities", dec!(4), dec!(100), "EUR"),
        holding(SOURCE, "M1", "Municipal Securities", dec!(20), dec!(50), "EUR"),
        holding(DESTINATION, "G1", "Govt Securities", dec!(2), dec!(100), "EUR"),
        holding(DESTINATION, "M1", "Municipal Securities", dec!(3), dec!(50), "EUR"),
    ];
    let h = harness(
        StaticRulesets::new(govt_and_muni()),
        &[("G1", dec!(100)), ("M1", dec!(50))],
        StaticRates::new(eur()),
        &holdings,
        dec!(900),
    )
    .await;

    h.orchestrator.start_allocation(&request()).await.unwrap();

    for (id, before) in [("G1", dec!(6)), ("M1", dec!(23))] {
        let source = quantity(&h.ledger, SOURCE, id).await.unwrap_or_default();
        let destination = quantity(&h.ledger, DESTINATION, id).await.unwrap_or_default();
        assert_eq!(source + destination, before, "{id}");
    }
}

#[tokio::test]
async fn test_security_with_unvaluable_holding_is_not_moved() {
    let rules = ruleset(&[("Govt Securities", dec!(100), 1, dec!(100))]);
    let holdings = vec![
        holding(SOURCE, "S1", "Govt Securities", dec!(10), dec!(100), "GBP"),
        holding(DESTINATION, "S1", "Govt Securities", dec!(20), dec!(100), "EUR"),
        holding(SOURCE, "G2", "Govt Securities", dec!(10), dec!(100), "EUR"),
    ];
    let h = harness(
        StaticRulesets::new(rules),
        &[("S1", dec!(100)), ("G2", dec!(100))],
        StaticRates::new(eur()),
        &holdings,
        dec!(500),
    )
    .await;

    let outcome = h.orchestrator.start_allocation(&request()).await.unwrap();
    assert!(outcome.is_successful());

    let report = outcome.report.unwrap();
    assert!(report.plan.iter().all(|line| line.security_id == "G2"));
    assert_eq!(report.unvalued_holdings.len(), 2);

    assert_eq!(quantity(&h.ledger, SOURCE, "S1").await, Some(dec!(10)));
    assert_eq!(quantity(&h.ledger, DESTINATION, "S1").await, Some(dec!(20)));
    assert_eq!(quantity(&h.ledger, SOURCE, "G2").await, Some(dec!(5)));
    assert_eq!(quantity(&h.ledger, DESTINATION, "G2").await, Some(dec!(5)));
}

#[tokio::test]
async fn test_foreign_currency_prices_are_converted() {
    let rules = ruleset(&[("Govt Securities", dec!(100), 1, dec!(90))]);
    let holdings = vec![holding(SOURCE, "UST", "Govt Securities", dec!(10), dec!(125), "USD")];
    let h = harness(
        StaticRulesets::new(rules),
        &[("UST", dec!(125))],
        StaticRates::new(eur()),
        &holdings,
        dec!(450),
    )
    .await;

    let outcome = h.orchestrator.start_allocation(&request()).await.unwrap();

    // 125 USD = 100 EUR, credited at 90%
    let report = outcome.report.unwrap();
    assert_eq!(report.plan[0].converted_price, dec!(100));
    assert_eq!(report.plan[0].quantity, dec!(5));
    assert_eq!(quantity(&h.ledger, DESTINATION, "UST").await, Some(dec!(5)));
}

#[tokio::test]
async fn test_allocation_above_public_valuation_is_non_compliant() {
    let rules = ruleset(&[("Equities", dec!(100), 1, dec!(100))]);
    let holdings = vec![holding(SOURCE, "E1", "Equities", dec!(10), dec!(100), "EUR")];
    let h = harness(
        StaticRulesets::new(rules),
        &[("E1", dec!(100))],
        StaticRates::new(eur()),
        &holdings,
        dec!(500),
    )
    .await;

    let outcome = h.orchestrator.start_allocation(&request()).await.unwrap();

    assert!(outcome.is_successful());
    assert_eq!(outcome.compliance_status, ComplianceStatus::NonCompliant);
    let report = outcome.report.unwrap();
    assert!(report.violations.iter().any(|v| matches!(
        v,
        ComplianceViolation::ValuationAbovePublic { .. }
    )));
    assert!(report.violations.iter().any(|v| matches!(
        v,
        ComplianceViolation::ConcentrationExceeded { .. }
    )));
    assert_eq!(
        h.ledger.get_transaction("T1").await.unwrap().compliance_status,
        ComplianceStatus::NonCompliant
    );
}

// ============================================================
// Pending outcomes
// ============================================================

#[tokio::test]
async fn test_insufficient_collateral_is_pending_with_shortfall() {
    let rules = ruleset(&[("Govt Securities", dec!(100), 1, dec!(100))]);
    let holdings = vec![holding(SOURCE, "G1", "Govt Securities", dec!(8), dec!(100), "EUR")];
    let h = harness(
        StaticRulesets::new(rules),
        &[("G1", dec!(100))],
        StaticRates::new(eur()),
        &holdings,
        dec!(1000),
    )
    .await;

    let outcome = h.orchestrator.start_allocation(&request()).await.unwrap();

    assert_eq!(outcome.allocation_status, AllocationStatus::Pending);
    assert_eq!(outcome.shortfall, dec!(200));
    assert_eq!(outcome.compliance_status, ComplianceStatus::NotAssessed);
    assert!(outcome.report.is_none());

    let tx = h.ledger.get_transaction("T1").await.unwrap();
    assert_eq!(tx.allocation_status, AllocationStatus::Pending);
    assert_eq!(tx.transaction_status, TransactionStatus::Pending);
    assert_eq!(tx.shortfall, dec!(200));
    assert_eq!(quantity(&h.ledger, SOURCE, "G1").await, Some(dec!(8)));
    assert!(h.ledger.get_account(DESTINATION).await.unwrap().securities.is_empty());
}

#[tokio::test]
async fn test_residual_after_planning_is_pending_without_movement() {
    // 100% ceiling of 1000 holds 3 whole units of 300, leaving 100 uncovered
    let rules = ruleset(&[("Govt Securities", dec!(100), 1, dec!(100))]);
    let holdings = vec![holding(SOURCE, "G1", "Govt Securities", dec!(20), dec!(300), "EUR")];
    let h = harness(
        StaticRulesets::new(rules),
        &[("G1", dec!(300))],
        StaticRates::new(eur()),
        &holdings,
        dec!(1000),
    )
    .await;

    let outcome = h.orchestrator.start_allocation(&request()).await.unwrap();

    assert_eq!(outcome.allocation_status, AllocationStatus::Pending);
    assert_eq!(outcome.shortfall, dec!(100));
    assert_eq!(quantity(&h.ledger, SOURCE, "G1").await, Some(dec!(20)));
}

#[tokio::test]
async fn test_pending_transaction_can_be_run_again() {
    let rules = ruleset(&[("Govt Securities", dec!(100), 1, dec!(100))]);
    let holdings = vec![holding(SOURCE, "G1", "Govt Securities", dec!(8), dec!(100), "EUR")];
    let h = harness(
        StaticRulesets::new(rules),
        &[("G1", dec!(100))],
        StaticRates::new(eur()),
        &holdings,
        dec!(1000),
    )
    .await;
    h.orchestrator.start_allocation(&request()).await.unwrap();

    h.ledger
        .add_security(&holding(SOURCE, "G1", "Govt Securities", dec!(2), dec!(100), "EUR"))
        .await
        .unwrap();
    let outcome = h.orchestrator.start_allocation(&request()).await.unwrap();

    assert!(outcome.is_successful());
    assert_eq!(quantity(&h.ledger, DESTINATION, "G1").await, Some(dec!(10)));
    assert_eq!(quantity(&h.ledger, SOURCE, "G1").await, None);
}

// ============================================================
// Rejections and failures
// ============================================================

#[tokio::test]
async fn test_unknown_deal_is_not_found() {
    let h = harness(
        StaticRulesets::new(govt_and_muni()),
        &[],
        StaticRates::new(eur()),
        &[],
        dec!(100),
    )
    .await;

    let mut req = request();
    req.deal_id = "missing".to_string();
    let err = h.orchestrator.start_allocation(&req).await.unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(err.code(), 404);
    assert_eq!(
        h.ledger.get_transaction("T1").await.unwrap().allocation_status,
        AllocationStatus::NotStarted
    );
}

#[tokio::test]
async fn test_completed_transaction_is_rejected() {
    let rules = ruleset(&[("Govt Securities", dec!(100), 1, dec!(100))]);
    let holdings = vec![holding(SOURCE, "G1", "Govt Securities", dec!(10), dec!(100), "EUR")];
    let h = harness(
        StaticRulesets::new(rules),
        &[("G1", dec!(100))],
        StaticRates::new(eur()),
        &holdings,
        dec!(500),
    )
    .await;
    h.orchestrator.start_allocation(&request()).await.unwrap();

    let err = h.orchestrator.start_allocation(&request()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(quantity(&h.ledger, DESTINATION, "G1").await, Some(dec!(5)));
}

#[tokio::test]
async fn test_ruleset_outage_restores_previous_status() {
    let holdings = vec![holding(SOURCE, "G1", "Govt Securities", dec!(10), dec!(100), "EUR")];
    let h = harness(
        StaticRulesets::unavailable(),
        &[("G1", dec!(100))],
        StaticRates::new(eur()),
        &holdings,
        dec!(500),
    )
    .await;

    let err = h.orchestrator.start_allocation(&request()).await.unwrap_err();

    assert!(matches!(err, AppError::Unavailable(_)));
    assert_eq!(
        h.ledger.get_transaction("T1").await.unwrap().allocation_status,
        AllocationStatus::NotStarted
    );
    assert!(h.prices.lookups().is_empty());
}

#[tokio::test]
async fn test_fx_timeout_restores_previous_status() {
    let holdings = vec![holding(SOURCE, "G1", "Govt Securities", dec!(10), dec!(100), "EUR")];
    let h = harness(
        StaticRulesets::new(govt_and_muni()),
        &[("G1", dec!(100))],
        StaticRates::timing_out(),
        &holdings,
        dec!(500),
    )
    .await;

    let err = h.orchestrator.start_allocation(&request()).await.unwrap_err();

    assert_eq!(err.code(), 504);
    assert_eq!(
        h.ledger.get_transaction("T1").await.unwrap().allocation_status,
        AllocationStatus::NotStarted
    );
}

#[tokio::test]
async fn test_malformed_private_ruleset_aborts_run() {
    let rules = ruleset(&[("Govt Securities", dec!(150), 1, dec!(90))]);
    let holdings = vec![holding(SOURCE, "G1", "Govt Securities", dec!(10), dec!(100), "EUR")];
    let h = harness(
        StaticRulesets::new(rules),
        &[("G1", dec!(100))],
        StaticRates::new(eur()),
        &holdings,
        dec!(500),
    )
    .await;

    let err = h.orchestrator.start_allocation(&request()).await.unwrap_err();

    assert!(matches!(err, AppError::Malformed(_)));
    assert_eq!(quantity(&h.ledger, SOURCE, "G1").await, Some(dec!(10)));
}

#[tokio::test]
async fn test_failed_commit_is_fatal_and_moves_nothing() {
    let rules = ruleset(&[("Govt Securities", dec!(100), 1, dec!(100))]);
    let holdings = vec![holding(SOURCE, "G1", "Govt Securities", dec!(10), dec!(100), "EUR")];
    let h = harness(
        StaticRulesets::new(rules),
        &[("G1", dec!(100))],
        StaticRates::new(eur()),
        &holdings,
        dec!(500),
    )
    .await;
    h.store.reject_batches(true);

    let err = h.orchestrator.start_allocation(&request()).await.unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(err.code(), 500);
    assert_eq!(quantity(&h.ledger, SOURCE, "G1").await, Some(dec!(10)));
    assert!(h.ledger.get_account(DESTINATION).await.unwrap().securities.is_empty());
    // a fatal commit is not rolled back to the previous status
    assert_eq!(
        h.ledger.get_transaction("T1").await.unwrap().allocation_status,
        AllocationStatus::InProgress
    );
}

// ============================================================
// Cutoff during a run
// ============================================================

#[tokio::test]
async fn test_cutoff_during_aborted_run_leaves_transaction_failed() {
    let (ledger, _store) = seeded_ledger().await;
    ledger
        .add_security(&holding(SOURCE, "G1", "Govt Securities", dec!(10), dec!(100), "EUR"))
        .await
        .unwrap();
    let mut tx = make_transaction("T1", dec!(500));
    tx.allocation_status = AllocationStatus::Pending;
    ledger.create_transaction(&tx).await.unwrap();

    let rulesets = Arc::new(GatedRulesets::new(None));
    let orchestrator = AllocationOrchestrator::new(
        ledger.clone(),
        rulesets.clone(),
        Arc::new(StaticPrices::new(&[("G1", dec!(100))])),
        Arc::new(StaticRates::new(eur())),
        Duration::from_secs(5),
    );
    let monitor = CutoffMonitor::new(
        ledger.clone(),
        chrono::Duration::hours(24),
        orchestrator.transaction_locks(),
    );
    let past_cutoff = tx.margin_call_at + chrono::Duration::hours(72);

    let req = request();
    let run = orchestrator.start_allocation(&req);
    let account_update = async {
        rulesets.wait_entered().await;
        assert_eq!(
            ledger.get_transaction("T1").await.unwrap().allocation_status,
            AllocationStatus::InProgress
        );
        let release = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            rulesets.release();
        };
        let (transitions, ()) = tokio::join!(
            monitor.account_updated(PLEDGEE, Role::Pledgee, past_cutoff),
            release
        );
        transitions
    };
    let (outcome, transitions) = tokio::join!(run, account_update);

    assert!(matches!(outcome, Err(AppError::Unavailable(_))));
    let transitions = transitions.unwrap();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].from, AllocationStatus::Pending);
    assert_eq!(transitions[0].to, AllocationStatus::Failed);

    let stored = ledger.get_transaction("T1").await.unwrap();
    assert_eq!(stored.allocation_status, AllocationStatus::Failed);
    assert_eq!(stored.transaction_status, TransactionStatus::Failed);
}

#[tokio::test]
async fn test_aborted_run_does_not_overwrite_status_set_elsewhere() {
    let (ledger, _store) = seeded_ledger().await;
    ledger
        .create_transaction(&make_transaction("T1", dec!(500)))
        .await
        .unwrap();

    let rulesets = Arc::new(GatedRulesets::new(None));
    let orchestrator = AllocationOrchestrator::new(
        ledger.clone(),
        rulesets.clone(),
        Arc::new(StaticPrices::default()),
        Arc::new(StaticRates::new(eur())),
        Duration::from_secs(5),
    );

    let req = request();
    let run = orchestrator.start_allocation(&req);
    let operator = async {
        rulesets.wait_entered().await;
        ledger
            .update_transaction_allocation_status("T1", AllocationStatus::Failed, None)
            .await
            .unwrap();
        rulesets.release();
    };
    let (outcome, ()) = tokio::join!(run, operator);

    assert!(outcome.is_err());
    assert_eq!(
        ledger.get_transaction("T1").await.unwrap().allocation_status,
        AllocationStatus::Failed
    );
}
