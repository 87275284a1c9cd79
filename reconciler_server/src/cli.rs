use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 21] = [
        "RUST_LOG",
        "RECON_HOST",
        "RECON_PORT",
        "RECON_DATABASE_URL",
        "RECON_DB_MAX_CONNECTIONS",
        "RECON_INVOICE_CHECK_INTERVAL_SECS",
        "RECON_WITHDRAWAL_DISPATCH_INTERVAL_SECS",
        "RECON_DEPOSIT_CHECK_INTERVAL_SECS",
        "RECON_DELAYED_WITHDRAWAL_INTERVAL_SECS",
        "RECON_INVOICE_LOOKBACK_HOURS",
        "RECON_USDT_DEPOSIT_WINDOW_MINS",
        "RECON_DELAYED_ALERT_HOURS",
        "RECON_PRICE_CACHE_TTL_SECS",
        "RECON_STRIPE_API_URL",
        "RECON_CHECKOUT_SUCCESS_URL",
        "RECON_CHECKOUT_CANCEL_URL",
        "RECON_BTCPAY_URL",
        "RECON_BTCPAY_STORE_ID",
        "RECON_USDT_SERVICE_URL",
        "RECON_DISPATCH_TIMEOUT_SECS",
        "RECON_POLL_TIMEOUT_SECS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<42} {val:<15}");
    })
}
