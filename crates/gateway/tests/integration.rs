//! HTTP gateway behavior against a mock upstream.

use std::time::Duration;

use rust_decimal_macros::dec;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use collateral_common::AppError;
use collateral_engine::sources::{FxSource, MarketDataSource, RulesetSource};
use collateral_gateway::{HttpGateway, RetryPolicy};

fn gateway(server: &MockServer, retries: u32) -> HttpGateway {
    HttpGateway::new(
        &server.uri(),
        &server.uri(),
        Duration::from_millis(500),
        RetryPolicy::new(retries, Duration::from_millis(5)),
    )
    .unwrap()
}

// ============================================================
// Ruleset service
// ============================================================

#[tokio::test]
async fn test_fetches_private_ruleset_for_pair() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/securityRuleset/Bank%20A/Bank%20B"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Security": {
                "Govt Securities": {"Concentration Limit": 50, "Priority": 1, "Valuation Percentage": 97},
                "Equities": {"Concentration Limit": 10, "Priority": 2, "Valuation Percentage": 80}
            },
            "BaseCurrency": "EUR",
            "EligibleCurrency": ["EUR"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ruleset = gateway(&server, 0)
        .private_ruleset("Bank A", "Bank B")
        .await
        .unwrap();

    assert_eq!(ruleset.rules.len(), 2);
    assert_eq!(
        ruleset.rule(&"Equities".into()).unwrap().valuation_percentage,
        dec!(80)
    );
}

#[tokio::test]
async fn test_unknown_pair_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = gateway(&server, 3)
        .private_ruleset("Bank A", "Bank Z")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_garbled_ruleset_is_malformed_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let err = gateway(&server, 3)
        .private_ruleset("Bank A", "Bank B")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Malformed(_)));
}

// ============================================================
// Retry
// ============================================================

#[tokio::test]
async fn test_server_error_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/MarketData/G1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/MarketData/G1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(["101.5"])))
        .expect(1)
        .mount(&server)
        .await;

    let price = gateway(&server, 3).price("G1").await.unwrap();
    assert_eq!(price, dec!(101.5));
}

#[tokio::test]
async fn test_retries_stop_at_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = gateway(&server, 2).price("G1").await.unwrap_err();
    assert!(matches!(err, AppError::Unavailable(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!(["1"]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = gateway(&server, 0).price("G1").await.unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad id"))
        .expect(1)
        .mount(&server)
        .await;

    let err = gateway(&server, 3).price("G1").await.unwrap_err();
    assert!(matches!(err, AppError::Malformed(_)));
}

// ============================================================
// FX service
// ============================================================

#[tokio::test]
async fn test_fetches_rates_for_base() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/latest"))
        .and(query_param("base", "EUR"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "base": "EUR",
            "date": "2017-06-01",
            "rates": {"USD": 1.25, "GBP": 0.87}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let table = gateway(&server, 0).rates("EUR").await.unwrap();
    assert_eq!(table.base, "EUR");
    assert_eq!(table.rate("EUR"), Some(dec!(1)));
    assert_eq!(table.rate("USD"), Some(dec!(1.25)));
}

#[tokio::test]
async fn test_rates_for_wrong_base_are_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "base": "USD",
            "date": "2017-06-01",
            "rates": {"EUR": 0.8}
        })))
        .mount(&server)
        .await;

    let err = gateway(&server, 0).rates("EUR").await.unwrap_err();
    assert!(matches!(err, AppError::Malformed(_)));
}
