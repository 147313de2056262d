use std::sync::Arc;

use clap::Parser;
use readlist_session::cli::{
    Args, build_config, handle_issue_session, init_logging, load_jwt_secret, open_database,
    validate_public_url,
};
use readlist_session::provider::LocalAuthClient;
use readlist_session::{init_cleanup, run_server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let jwt_secret = load_jwt_secret(args.jwt_secret_file.as_deref()).unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(1);
    });

    let public_url = validate_public_url(&args.public_url).unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(1);
    });

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let client = Arc::new(
        LocalAuthClient::new(jwt_secret.as_bytes(), db.clone()).with_access_ttl(args.access_ttl),
    );

    if let Some(email) = &args.issue_session {
        if let Err(e) = handle_issue_session(&client, &db, email).await {
            error!(error = %e, "Failed to issue session");
            std::process::exit(1);
        }
    }

    let config = build_config(&args, &public_url);
    init_cleanup(&db).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap_or_else(|e| {
        error!(error = %e, "Failed to read local address");
        std::process::exit(1);
    });

    info!(
        address = %local_addr,
        secure_cookies = config.cookies.secure,
        protected = ?config.protected_prefixes,
        "Listening"
    );

    if let Err(e) = run_server(config, client, db, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
