//! CLI argument parsing, validation, and startup helpers.

use crate::AppConfig;
use crate::auth::DEFAULT_PROTECTED_PREFIXES;
use crate::db::Database;
use crate::provider::{AuthClientError, DEFAULT_ACCESS_TTL_SECS, LocalAuthClient};
use crate::session::cookie::DEFAULT_COOKIE_GRACE_SECS;
use crate::session::single_flight::DEFAULT_DEDUP_WINDOW;
use crate::session::{ACCESS_COOKIE_NAME, CookieSettings, REFRESH_COOKIE_NAME, Session};
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
    )]
    MissingJwtSecret,
    #[error("failed to read JWT secret file {path}: {source}")]
    JwtSecretFile {
        path: String,
        source: std::io::Error,
    },
    #[error(
        "JWT secret is shorter than {} characters. Use a longer secret",
        MIN_JWT_SECRET_LENGTH
    )]
    ShortJwtSecret,
    #[error("invalid public URL {url}: {source}")]
    PublicUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("public URL must use HTTPS for non-localhost deployments")]
    InsecurePublicUrl,
}

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "readlist-session",
    about = "Session lifecycle service for the reading list"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7292")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "readlist.db")]
    pub database: String,

    /// Public URL of the service. HTTPS turns on Secure cookies
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:7292")]
    pub public_url: String,

    /// Domain attribute for session cookies
    #[arg(long, env = "COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Path prefix that requires a session (repeatable; replaces the defaults)
    #[arg(long = "protect", value_name = "PREFIX")]
    pub protect: Vec<String>,

    /// Access token lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_ACCESS_TTL_SECS,
        value_parser = clap::value_parser!(i64).range(60..))]
    pub access_ttl: i64,

    /// Seconds a completed refresh is shared with duplicate requests
    #[arg(long, default_value_t = DEFAULT_DEDUP_WINDOW.as_secs())]
    pub dedup_window: u64,

    /// Seconds session cookies outlive the access token
    #[arg(long, default_value_t = DEFAULT_COOKIE_GRACE_SECS,
        value_parser = clap::value_parser!(i64).range(0..))]
    pub cookie_grace: i64,

    /// Issue a session for EMAIL on startup and print its cookies
    #[arg(long, value_name = "EMAIL")]
    pub issue_session: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Result<String, ConfigError> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        std::fs::read_to_string(path)
            .map_err(|source| ConfigError::JwtSecretFile {
                path: path.to_string(),
                source,
            })?
            .trim()
            .to_string()
    } else {
        return Err(ConfigError::MissingJwtSecret);
    };

    validate_jwt_secret(secret)
}

pub fn validate_jwt_secret(secret: String) -> Result<String, ConfigError> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::ShortJwtSecret);
    }
    Ok(secret)
}

/// Parse and validate the public URL.
pub fn validate_public_url(public_url: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(public_url).map_err(|source| ConfigError::PublicUrl {
        url: public_url.to_string(),
        source,
    })?;

    let is_https = url.scheme() == "https";
    let is_localhost = matches!(url.host_str(), Some("localhost" | "127.0.0.1"));

    if !is_https && !is_localhost {
        return Err(ConfigError::InsecurePublicUrl);
    }

    Ok(url)
}

/// Build AppConfig from validated arguments.
pub fn build_config(args: &Args, public_url: &Url) -> AppConfig {
    let secure_cookies = public_url.scheme() == "https";

    let protected_prefixes = if args.protect.is_empty() {
        DEFAULT_PROTECTED_PREFIXES
            .iter()
            .map(|p| p.to_string())
            .collect()
    } else {
        args.protect.clone()
    };

    AppConfig {
        cookies: CookieSettings {
            secure: secure_cookies,
            domain: args.cookie_domain.clone(),
            grace_secs: args.cookie_grace,
            ..CookieSettings::default()
        },
        protected_prefixes,
        dedup_window: Duration::from_secs(args.dedup_window),
    }
}

/// Handle the --issue-session flag: start a session for `email` and print
/// the cookies to send with requests.
///
/// An email seen before keeps its user id.
pub async fn handle_issue_session(
    client: &LocalAuthClient,
    db: &Database,
    email: &str,
) -> Result<Session, AuthClientError> {
    let user_id = match db.profiles().get_by_email(email).await {
        Ok(Some(profile)) => profile.user_id,
        Ok(None) => uuid::Uuid::new_v4().to_string(),
        Err(e) => return Err(AuthClientError::Storage(e.to_string())),
    };

    let session = client.issue_session(&user_id, email).await?;

    println!();
    println!("Session issued for {} ({})", email, user_id);
    println!(
        "Cookie: {}={}; {}={}",
        ACCESS_COOKIE_NAME, session.access_token, REFRESH_COOKIE_NAME, session.refresh_token
    );
    println!();

    Ok(session)
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
