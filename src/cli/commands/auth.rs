use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::{ExposeSecret, SecretString};

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_TOKEN_TTL: &str = "token-ttl";
pub const ARG_RESET_TOKEN_TTL: &str = "reset-token-ttl";
pub const ARG_LOGIN_ATTEMPTS: &str = "login-attempts";
pub const ARG_LOGIN_WINDOW: &str = "login-window";
pub const ARG_PRUNE_INTERVAL: &str = "prune-interval";

/// Shorter HS256 keys are rejected at startup.
pub const MIN_SECRET_LENGTH: usize = 32;

pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_throttle_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HS256 signing secret for bearer tokens (at least 32 bytes)")
                .env("PORTERO_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL)
                .long(ARG_TOKEN_TTL)
                .help("Bearer token lifetime in seconds")
                .env("PORTERO_TOKEN_TTL")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RESET_TOKEN_TTL)
                .long(ARG_RESET_TOKEN_TTL)
                .help("Password reset token lifetime in seconds")
                .env("PORTERO_RESET_TOKEN_TTL")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

fn with_throttle_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGIN_ATTEMPTS)
                .long(ARG_LOGIN_ATTEMPTS)
                .help("Login attempts allowed per email within the window")
                .env("PORTERO_LOGIN_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOGIN_WINDOW)
                .long(ARG_LOGIN_WINDOW)
                .help("Login rate limit window in seconds")
                .env("PORTERO_LOGIN_WINDOW")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_PRUNE_INTERVAL)
                .long(ARG_PRUNE_INTERVAL)
                .help("Seconds between sweeps of expired revoked/reset tokens")
                .env("PORTERO_PRUNE_INTERVAL")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub prune_interval_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if the secret is missing or too short.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --jwt-secret")?;
        if jwt_secret.expose_secret().len() < MIN_SECRET_LENGTH {
            bail!("--jwt-secret must be at least {MIN_SECRET_LENGTH} bytes");
        }

        Ok(Self {
            jwt_secret,
            token_ttl_seconds: matches
                .get_one::<i64>(ARG_TOKEN_TTL)
                .copied()
                .unwrap_or(86_400),
            reset_token_ttl_seconds: matches
                .get_one::<i64>(ARG_RESET_TOKEN_TTL)
                .copied()
                .unwrap_or(900),
            login_attempts: matches
                .get_one::<u32>(ARG_LOGIN_ATTEMPTS)
                .copied()
                .unwrap_or(5),
            login_window_seconds: matches
                .get_one::<u64>(ARG_LOGIN_WINDOW)
                .copied()
                .unwrap_or(60),
            prune_interval_seconds: matches
                .get_one::<u64>(ARG_PRUNE_INTERVAL)
                .copied()
                .unwrap_or(300),
        })
    }
}
