use ledger_common::Usd;
use ledger_engine::traits::{
    CheckoutGateway,
    CheckoutRequest,
    CheckoutSession,
    CheckoutState,
    DepositWatcher,
    IncomingTransfer,
    PayoutRail,
    PayoutReceipt,
    RailError,
    ReceivingAddress,
    TxStatus,
};
use mockall::mock;

mock! {
    pub Gateway {}
    impl CheckoutGateway for Gateway {
        fn name(&self) -> &'static str;
        async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, RailError>;
        async fn check_status(&self, external_id: &str) -> Result<CheckoutState, RailError>;
    }
}

mock! {
    pub Payouts {}
    impl PayoutRail for Payouts {
        fn name(&self) -> &'static str;
        async fn send(&self, destination: &str, amount: Usd, idempotency_key: &str) -> Result<PayoutReceipt, RailError>;
        async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, RailError>;
    }
}

mock! {
    pub Watcher {}
    impl DepositWatcher for Watcher {
        async fn create_deposit_address(&self, deposit_id: i64) -> Result<ReceivingAddress, RailError>;
        async fn incoming_transfers(&self, address: &str) -> Result<Vec<IncomingTransfer>, RailError>;
        async fn confirmed_amount(&self, tx_hash: &str) -> Result<Option<Usd>, RailError>;
    }
}

pub fn stripe_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_name().return_const("stripe");
    gateway
}

pub fn payout_rail() -> MockPayouts {
    let mut rail = MockPayouts::new();
    rail.expect_name().return_const("usdt");
    rail
}
