use crate::{auth::AuthConfig, cli::telemetry, portero};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub jwt_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub prune_interval_seconds: u64,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::default()
            .with_token_ttl_seconds(self.token_ttl_seconds)
            .with_reset_token_ttl_seconds(self.reset_token_ttl_seconds)
            .with_login_attempts(self.login_attempts as usize)
            .with_login_window(Duration::from_secs(self.login_window_seconds))
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the DSN is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    if let Some(dsn) = &args.dsn {
        let parsed = Url::parse(dsn).context("Invalid database DSN")?;
        info!(
            "Using PostgreSQL at {}{}",
            parsed.host_str().unwrap_or("localhost"),
            parsed.path()
        );
    }

    let auth_config = args.auth_config();
    debug!("Auth config: {:?}", auth_config);

    let result = portero::new(
        args.port,
        args.dsn,
        args.jwt_secret,
        auth_config,
        Duration::from_secs(args.prune_interval_seconds),
    )
    .await;

    telemetry::shutdown_tracer();

    result
}
