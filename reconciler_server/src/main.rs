use std::sync::Arc;

use dotenvy::dotenv;
use ledger_engine::{price_cache::PriceCache, SqliteDatabase};
use log::*;
use rail_clients::{BtcPayApi, StripeApi, UsdtSidecarApi};
use reconciler_server::{
    cli::handle_command_line_args,
    config::{RailsConfig, ServerConfig},
    errors::ServerError,
    event_log::create_logging_event_handlers,
    integrations::{LightningGateway, StripeGateway, UsdtRail},
    server::run_server,
    workers::{start_workers, Rails},
};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    if handle_command_line_args() {
        return;
    }
    let config = ServerConfig::from_env_or_default();
    match start(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}

async fn start(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(format!("Could not open {}. {e}", config.database_url)))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(format!("Migrations failed. {e}")))?;
    info!("🗃️ Ledger database ready at {}", config.database_url);

    let rails = build_rails(&config.rails)?;
    let handlers = create_logging_event_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let _workers = start_workers(db.clone(), rails, producers, config.schedule, config.windows);

    info!("🚀️ Starting server on {}:{}", config.host, config.port);
    run_server(config, db).await
}

fn build_rails(config: &RailsConfig) -> Result<Rails, ServerError> {
    let init = |rail: &str, e: rail_clients::RailApiError| ServerError::InitializeError(format!("{rail} client. {e}"));
    let stripe = StripeApi::new(config.stripe.clone()).map_err(|e| init("Stripe", e))?;
    let stripe = StripeGateway::new(stripe, config.checkout_urls.clone());
    let lightning = match &config.btcpay {
        Some(btcpay) => {
            let api = BtcPayApi::new(btcpay.clone()).map_err(|e| init("BTCPay", e))?;
            let prices = Arc::new(PriceCache::new(config.price_cache_ttl));
            Some(LightningGateway::new(api, prices))
        },
        None => {
            warn!("🪛️ Lightning invoices will not be reconciled while the BTCPay rail is disabled.");
            None
        },
    };
    let usdt = UsdtSidecarApi::new(config.usdt.clone()).map_err(|e| init("USDT sidecar", e))?;
    Ok(Rails { stripe, lightning, usdt: UsdtRail::new(usdt) })
}
