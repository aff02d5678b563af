// Startup configuration: command-line flags with environment fallbacks
use std::{path::PathBuf, time::Duration};

use clap::{ArgAction, Parser};
use rand::prelude::*;
use url::Url;

use crate::app::api::DEFAULT_BASE_URL;
use crate::app::error::ConfigError;
use crate::app::models::UserId;

/// Terminal client for a remote to-do list.
#[derive(Debug, Parser)]
#[command(name = "todo-client", version, about)]
pub struct Cli {
    /// Base URL of the task store
    #[arg(long, env = "TODO_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// User scope to work in; a random one is picked when omitted
    #[arg(long, env = "TODO_USER_ID")]
    pub user_id: Option<u32>,

    /// Only show completed (true) or open (false) tasks
    #[arg(long, action = ArgAction::Set)]
    pub completed: Option<bool>,

    /// Redraw interval in milliseconds
    #[arg(long, default_value_t = 250)]
    pub tick_ms: u64,

    /// Where to write the log; the terminal belongs to the UI
    #[arg(long, env = "TODO_LOG_FILE", default_value = "todo-client.log")]
    pub log_file: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub user: UserId,
    pub completed: Option<bool>,
    pub tick_rate: Duration,
    pub log_file: PathBuf,
    pub request_timeout: Duration,
}

// Buckets are numbered 1..=999 on the store side
pub fn random_user_id() -> UserId {
    UserId(rand::rng().random_range(1..=999))
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&cli.base_url).map_err(|source| ConfigError::BaseUrl {
            value: cli.base_url.clone(),
            source,
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Scheme {
                scheme: base_url.scheme().to_string(),
            });
        }

        let user = match cli.user_id {
            Some(0) => return Err(ConfigError::UserId),
            Some(id) => UserId(id),
            None => random_user_id(),
        };
        if cli.tick_ms == 0 {
            return Err(ConfigError::TickRate);
        }

        Ok(Config {
            base_url,
            user,
            completed: cli.completed,
            tick_rate: Duration::from_millis(cli.tick_ms),
            log_file: cli.log_file,
            request_timeout: Duration::from_secs(cli.request_timeout_secs),
        })
    }
}
