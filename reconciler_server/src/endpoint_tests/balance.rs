use std::str::FromStr;

use actix_web::{http::StatusCode, web, web::ServiceConfig};
use ledger_common::Usd;
use ledger_engine::{
    traits::{BalanceEntry, BalanceEntryKind, LedgerError},
    BalanceApi,
};
use serde_json::Value;

use super::{helpers::get_request, mocks::MockBalanceManager};
use crate::routes::{health, BalanceRoute};

fn usd(s: &str) -> Usd {
    Usd::from_str(s).unwrap()
}

fn configure_with(manager: MockBalanceManager) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        cfg.service(health)
            .service(BalanceRoute::<MockBalanceManager>::new())
            .app_data(web::Data::new(BalanceApi::new(manager)));
    }
}

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init();
    let (status, body) = get_request("/health", configure_with(MockBalanceManager::new())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn balance_for_user() {
    let _ = env_logger::try_init();
    let mut manager = MockBalanceManager::new();
    manager.expect_fetch_balance_entries().withf(|user_id| *user_id == 2).times(1).returning(|_| {
        Ok(vec![
            BalanceEntry::new(BalanceEntryKind::Sale, 1, usd("49.98"), "usd"),
            BalanceEntry::new(BalanceEntryKind::Fee, 1, usd("1.80"), "usd"),
            BalanceEntry::new(BalanceEntryKind::Reward, 3, usd("10.00"), "usd"),
            BalanceEntry::new(BalanceEntryKind::Withdrawal, 4, usd("20.00"), "usd"),
        ])
    });
    let (status, body) = get_request("/balance/2", configure_with(manager)).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(usd(json["usd"].as_str().unwrap()), usd("38.18"));
}

#[actix_web::test]
async fn unknown_user_has_zero_balance() {
    let _ = env_logger::try_init();
    let mut manager = MockBalanceManager::new();
    manager.expect_fetch_balance_entries().returning(|_| Ok(vec![]));
    let (status, body) = get_request("/balance/99", configure_with(manager)).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(usd(json["usd"].as_str().unwrap()), Usd::ZERO);
}

#[actix_web::test]
async fn ledger_failures_are_not_shown_to_users() {
    let _ = env_logger::try_init();
    let mut manager = MockBalanceManager::new();
    manager
        .expect_fetch_balance_entries()
        .returning(|_| Err(LedgerError::DatabaseError("no such table: withdrawal".into())));
    let (status, body) = get_request("/balance/2", configure_with(manager)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.contains("withdrawal"));
    let json: Value = serde_json::from_str(&body).unwrap();
    assert!(json["error"].is_string());
}

#[actix_web::test]
async fn malformed_user_id() {
    let _ = env_logger::try_init();
    let (status, _) = get_request("/balance/alice", configure_with(MockBalanceManager::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
