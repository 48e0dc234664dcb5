use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use taskdeck_client::{BackoffPolicy, ClientConfig, DEFAULT_API_URL};
use taskdeck_core::{Credential, RunMode};

pub const DEFAULT_MODEL: &str = "llama3";
pub const DEFAULT_LOG_DIR: &str = ".taskdeck/logs";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Debug)]
#[command(name = "taskdeck", about = "Terminal console for the multi-agent task backend")]
pub struct Args {
    /// Backend base URL [env: TASKDECK_API_URL]
    #[arg(long, default_value = "")]
    pub api_url: String,
    /// Pre-issued bearer token [env: TASKDECK_TOKEN]
    #[arg(long, default_value = "")]
    pub token: String,
    /// [env: TASKDECK_EMAIL]
    #[arg(long, default_value = "")]
    pub email: String,
    /// [env: TASKDECK_PASSWORD]
    #[arg(long, default_value = "")]
    pub password: String,
    /// Default model for new tasks [env: TASKDECK_MODEL]
    #[arg(long, default_value = "")]
    pub model: String,
    /// full, code-only or test-only [env: TASKDECK_MODE]
    #[arg(long, default_value = "")]
    pub mode: String,
    #[arg(long, default_value_t = 15)]
    pub heartbeat_interval: u64,
    #[arg(long, default_value_t = 3)]
    pub max_missed_heartbeats: u32,
    #[arg(long, default_value_t = 30)]
    pub dispatch_timeout: u64,
    /// Consecutive failed reconnects before giving up; 0 retries forever
    #[arg(long, default_value_t = 20)]
    pub max_reconnect_attempts: u32,
    /// [env: TASKDECK_LOG_DIR]
    #[arg(long, default_value = "")]
    pub log_dir: String,
}

#[derive(Clone)]
pub enum Login {
    Token(Credential),
    Password { email: String, password: String },
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Login::Token(credential) => f.debug_tuple("Token").field(credential).finish(),
            Login::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub client: ClientConfig,
    pub login: Login,
    pub model: String,
    pub mode: RunMode,
    pub log_dir: String,
    pub log_level: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_args(Args::parse(), |key| std::env::var(key).ok())
    }

    pub fn from_args(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = resolve(&args.api_url, env("TASKDECK_API_URL"), DEFAULT_API_URL);
        let mut client = ClientConfig::parse(&api_url)?;
        client.heartbeat_interval = Duration::from_secs(args.heartbeat_interval.max(1));
        client.max_missed_heartbeats = args.max_missed_heartbeats.max(1);
        client.dispatch_timeout = Duration::from_secs(args.dispatch_timeout.max(1));
        client.backoff = BackoffPolicy {
            max_attempts: (args.max_reconnect_attempts > 0).then_some(args.max_reconnect_attempts),
            ..BackoffPolicy::default()
        };

        let token = resolve(&args.token, env("TASKDECK_TOKEN"), "");
        let email = resolve(&args.email, env("TASKDECK_EMAIL"), "");
        let password = resolve(&args.password, env("TASKDECK_PASSWORD"), "");
        let login = match Credential::new(token) {
            Some(credential) => Login::Token(credential),
            None if !email.is_empty() && !password.is_empty() => Login::Password { email, password },
            None => {
                return Err(anyhow!(
                    "no credentials: pass --token, or --email and --password (or TASKDECK_TOKEN / TASKDECK_EMAIL / TASKDECK_PASSWORD)"
                ))
            }
        };

        let mode = resolve(&args.mode, env("TASKDECK_MODE"), RunMode::Full.as_str());
        let mode = mode
            .parse::<RunMode>()
            .map_err(|err| anyhow!(err))
            .context("invalid --mode")?;

        Ok(Self {
            client,
            login,
            model: resolve(&args.model, env("TASKDECK_MODEL"), DEFAULT_MODEL),
            mode,
            log_dir: resolve(&args.log_dir, env("TASKDECK_LOG_DIR"), DEFAULT_LOG_DIR),
            log_level: resolve("", env("TASKDECK_LOG_LEVEL"), DEFAULT_LOG_LEVEL),
        })
    }
}

/// flag > environment > default; blank values fall through.
fn resolve(flag: &str, env_value: Option<String>, default: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.trim().to_string();
    }
    if let Some(value) = env_value {
        if !value.trim().is_empty() {
            return value.trim().to_string();
        }
    }
    default.to_string()
}
