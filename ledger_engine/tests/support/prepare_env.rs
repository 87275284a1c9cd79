use std::path::Path;

use ledger_common::Usd;
use ledger_engine::{
    db_types::{Invoice, InvoiceType, NewInvoice, NewReward},
    BalanceApi,
    BalanceManagement,
    LedgerDatabase,
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const ADDRESS: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
pub const HASH_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const HASH_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

/// Creates a fresh, fully migrated database at `url`.
pub async fn prepare_test_env(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    db.run_migrations().await.expect("Error running DB migrations");
    db
}

pub fn random_db_path() -> String {
    format!("sqlite://{}/ledger_test_{}.db", std::env::temp_dir().display(), rand::random::<u64>())
}

pub async fn setup() -> SqliteDatabase {
    prepare_test_env(&random_db_path()).await
}

pub async fn tear_down(mut db: SqliteDatabase) {
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    let _ = Sqlite::drop_database(db.url()).await;
}

pub async fn create_database<P: AsRef<Path>>(path: P) {
    let p = path.as_ref().as_os_str().to_str().unwrap();
    if let Err(e) = Sqlite::drop_database(p).await {
        trace!("Nothing to drop at {p}: {e:?}");
    }
    Sqlite::create_database(p).await.expect("Error creating database");
    info!("Created Sqlite database {p}");
}

pub fn usd(s: &str) -> Usd {
    s.parse().unwrap()
}

pub async fn fund(db: &SqliteDatabase, user_id: i64, amount: &str) {
    db.insert_reward(NewReward::new(user_id, usd(amount)).with_reason("test funding")).await.unwrap();
}

pub async fn balance(db: &SqliteDatabase, user_id: i64) -> Usd {
    BalanceApi::new(db.clone()).get_balance(user_id).await.unwrap().usd
}

pub async fn stripe_invoice(db: &SqliteDatabase, amount: &str, fee: &str, session: &str) -> Invoice {
    let invoice = NewInvoice::new(1, 2, 77, usd(amount), InvoiceType::Stripe)
        .with_fee(usd(fee))
        .with_external_id(session)
        .with_metadata(serde_json::json!({ "address": "1 Main St", "selections": [{"id": 3, "qty": 1}] }));
    db.insert_invoice(invoice).await.unwrap()
}
