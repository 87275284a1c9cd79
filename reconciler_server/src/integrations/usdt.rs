use ledger_common::{Usd, USDT_DECIMALS};
use ledger_engine::traits::{
    DepositWatcher,
    IncomingTransfer,
    PayoutRail,
    PayoutReceipt,
    PayoutStatus,
    RailError,
    ReceivingAddress,
    TxStatus,
};
use log::*;
use rail_clients::{UsdtSendResponse, UsdtSidecarApi, UsdtTransferAmount, UsdtTxStatus};
use serde_json::json;

use crate::errors::rail_error;

/// USDT on Ethereum, through the signing sidecar. Serves as both the payout rail and the deposit watcher.
#[derive(Clone)]
pub struct UsdtRail {
    api: UsdtSidecarApi,
}

impl UsdtRail {
    pub fn new(api: UsdtSidecarApi) -> Self {
        Self { api }
    }
}

pub fn receipt_from_response(response: UsdtSendResponse) -> PayoutReceipt {
    let status = if response.success { PayoutStatus::Complete } else { PayoutStatus::Failed };
    let details = json!({
        "block_number": response.block_number,
        "error_type": response.error_type,
        "request_id": response.request_id,
    });
    let receipt = PayoutReceipt::new(response.tx_hash, status).with_details(details);
    match response.error {
        Some(error) => receipt.with_error(error),
        None if !response.success => receipt.with_error("The sidecar reported a failure without a reason"),
        None => receipt,
    }
}

/// `confirmed` with `success: true` is final. A confirmed transaction that reverted has failed. `pending` and
/// `not_found` may still be mined.
pub fn tx_status_from(status: &UsdtTxStatus) -> TxStatus {
    match (status.status.as_str(), status.success) {
        ("confirmed", Some(true)) => TxStatus::Complete,
        ("confirmed", Some(false)) => TxStatus::Failed,
        _ => TxStatus::Pending,
    }
}

fn confirmed_units(amount: &UsdtTransferAmount) -> Option<u64> {
    match (amount.amount, amount.confirmations) {
        (Some(_), Some(c)) if c <= 0 => None,
        (units, _) => units,
    }
}

impl PayoutRail for UsdtRail {
    fn name(&self) -> &'static str {
        "usdt"
    }

    async fn send(&self, destination: &str, amount: Usd, idempotency_key: &str) -> Result<PayoutReceipt, RailError> {
        let units = amount.to_token_units(USDT_DECIMALS).map_err(|e| RailError::Rejected(e.to_string()))?;
        let response = self.api.send(destination, units, idempotency_key).await.map_err(rail_error)?;
        Ok(receipt_from_response(response))
    }

    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, RailError> {
        let status = self.api.tx_status(tx_hash).await.map_err(rail_error)?;
        trace!("{tx_hash} is {} with {:?} confirmations", status.status, status.confirmations);
        Ok(tx_status_from(&status))
    }
}

impl DepositWatcher for UsdtRail {
    async fn create_deposit_address(&self, deposit_id: i64) -> Result<ReceivingAddress, RailError> {
        let address = self.api.zero_balance_address(deposit_id).await.map_err(rail_error)?;
        Ok(ReceivingAddress { address: address.address, index: address.index })
    }

    /// Transfers that have not been mined yet are reported at block 0, so that mined ones are preferred.
    async fn incoming_transfers(&self, address: &str) -> Result<Vec<IncomingTransfer>, RailError> {
        let transfers = self.api.transfers_to(address).await.map_err(rail_error)?;
        Ok(transfers
            .into_iter()
            .map(|t| IncomingTransfer { tx_hash: t.tx_hash, block_number: t.block_number.unwrap_or_default() })
            .collect())
    }

    async fn confirmed_amount(&self, tx_hash: &str) -> Result<Option<Usd>, RailError> {
        let amount = self.api.transfer_amount(tx_hash).await.map_err(rail_error)?;
        confirmed_units(&amount)
            .map(|units| Usd::from_token_units(units, USDT_DECIMALS))
            .transpose()
            .map_err(|e| RailError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const HASH: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn response(success: bool, tx_hash: Option<&str>, error: Option<&str>) -> UsdtSendResponse {
        UsdtSendResponse {
            success,
            tx_hash: tx_hash.map(String::from),
            block_number: Some(19_000_000),
            error: error.map(String::from),
            error_type: None,
            request_id: Some("withdrawal-1".into()),
        }
    }

    #[test]
    fn successful_send() {
        let receipt = receipt_from_response(response(true, Some(HASH), None));
        assert_eq!(receipt.status, PayoutStatus::Complete);
        assert_eq!(receipt.tx_hash.as_deref(), Some(HASH));
        assert!(receipt.error.is_none());
        assert_eq!(receipt.details["request_id"], "withdrawal-1");
    }

    #[test]
    fn failed_send_keeps_the_hash() {
        let receipt = receipt_from_response(response(false, Some(HASH), Some("receipt timeout")));
        assert_eq!(receipt.status, PayoutStatus::Failed);
        assert_eq!(receipt.tx_hash.as_deref(), Some(HASH));
        assert_eq!(receipt.error.as_deref(), Some("receipt timeout"));
        let receipt = receipt_from_response(response(false, None, None));
        assert!(receipt.error.is_some());
    }

    fn status(status: &str, success: Option<bool>) -> UsdtTxStatus {
        UsdtTxStatus { status: status.into(), success, confirmations: Some(3), block_number: None }
    }

    #[test]
    fn transaction_statuses() {
        assert_eq!(tx_status_from(&status("confirmed", Some(true))), TxStatus::Complete);
        assert_eq!(tx_status_from(&status("confirmed", Some(false))), TxStatus::Failed);
        assert_eq!(tx_status_from(&status("confirmed", None)), TxStatus::Pending);
        assert_eq!(tx_status_from(&status("pending", None)), TxStatus::Pending);
        assert_eq!(tx_status_from(&status("not_found", None)), TxStatus::Pending);
    }

    #[test]
    fn unconfirmed_amounts() {
        let amount = |amount, confirmations| UsdtTransferAmount { amount, confirmations };
        assert_eq!(confirmed_units(&amount(Some(25_000_000), Some(2))), Some(25_000_000));
        assert_eq!(confirmed_units(&amount(Some(25_000_000), Some(0))), None);
        assert_eq!(confirmed_units(&amount(Some(25_000_000), None)), Some(25_000_000));
        assert_eq!(confirmed_units(&amount(None, Some(5))), None);
    }

    mod dispatch {
        use std::time::Duration;

        use ledger_engine::{
            db_types::{NewReward, NewWithdrawal, WithdrawalStatus},
            events::EventProducers,
            BalanceManagement,
            LedgerDatabase,
            SqliteDatabase,
            WithdrawalDispatcher,
        };
        use rail_clients::UsdtSidecarConfig;
        use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

        use super::*;

        const ADDRESS: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

        async fn ledger(name: &str) -> SqliteDatabase {
            let path = std::env::temp_dir().join(format!("recon_{name}_{}.db", std::process::id()));
            let _ = std::fs::remove_file(&path);
            let db = SqliteDatabase::new_with_url(&format!("sqlite://{}", path.display()), 2).await.unwrap();
            db.run_migrations().await.unwrap();
            db
        }

        fn rail(url: &str) -> UsdtRail {
            let config = UsdtSidecarConfig {
                url: url.to_string(),
                send_timeout: Duration::from_secs(2),
                poll_timeout: Duration::from_secs(2),
            };
            UsdtRail::new(UsdtSidecarApi::new(config).unwrap())
        }

        async fn assert_stays_pending(name: &str, reply: ResponseTemplate) {
            let _ = env_logger::try_init();
            let server = MockServer::start().await;
            Mock::given(method("POST")).respond_with(reply).expect(2).mount(&server).await;
            let db = ledger(name).await;
            db.insert_reward(NewReward::new(1, "50".parse().unwrap())).await.unwrap();
            let withdrawal = db.insert_withdrawal(NewWithdrawal::new(1, "20".parse().unwrap(), ADDRESS)).await.unwrap();
            let dispatcher = WithdrawalDispatcher::new(db.clone(), rail(&server.uri()), EventProducers::default());
            for _ in 0..2 {
                let summary = dispatcher.tick().await.unwrap();
                assert_eq!(summary.updated, 0);
                let row = db.fetch_withdrawal(withdrawal.id).await.unwrap().unwrap();
                assert_eq!(row.status, WithdrawalStatus::Pending);
                assert!(row.external_id.is_none());
            }
        }

        #[tokio::test]
        async fn rate_limited_payouts_stay_pending() {
            let reply = ResponseTemplate::new(429).set_body_json(json!({ "error": "rate limited, retry later" }));
            assert_stays_pending("rate_limited", reply).await;
        }

        #[tokio::test]
        async fn unavailable_sidecar_leaves_payouts_pending() {
            let reply = ResponseTemplate::new(503).set_body_json(json!({ "success": false, "error": "node unavailable" }));
            assert_stays_pending("unavailable", reply).await;
        }
    }
}
