use std::path::PathBuf;
use std::time::Duration;

use crate::bandcamp::{ClientConfig, PaginationConfig};
use crate::cli::GlobalArgs;
use crate::retry::RetryConfig;
use crate::sync::TaskConfig;

/// Application configuration resolved from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub client: ClientConfig,
    pub pagination: PaginationConfig,
    pub task: TaskConfig,
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(args: &GlobalArgs) -> anyhow::Result<Self> {
        let base_url = args.bandcamp_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            anyhow::bail!("--bandcamp-url must be an http(s) URL, got {:?}", args.bandcamp_url);
        }
        if args.max_requests == 0 {
            anyhow::bail!("--max-requests must be at least 1");
        }
        if args.request_timeout == 0 || args.task_timeout == 0 {
            anyhow::bail!("--request-timeout and --task-timeout must be greater than 0");
        }
        if args.request_timeout >= args.task_timeout {
            tracing::warn!(
                request_timeout = args.request_timeout,
                task_timeout = args.task_timeout,
                "Request timeout is not shorter than the task timeout"
            );
        }

        Ok(Self {
            db_path: expand_tilde(&args.database),
            client: ClientConfig {
                base_url,
                request_timeout: Duration::from_secs(args.request_timeout),
                retry: RetryConfig {
                    max_retries: args.max_retries,
                    ..RetryConfig::default()
                },
            },
            pagination: PaginationConfig {
                max_requests: args.max_requests,
                page_delay: Duration::from_millis(args.page_delay_ms),
            },
            task: TaskConfig {
                task_timeout: Duration::from_secs(args.task_timeout),
                ..TaskConfig::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogLevel;

    fn args() -> GlobalArgs {
        GlobalArgs {
            log_level: LogLevel::Info,
            database: "~/.campcounselor/albums.db".into(),
            bandcamp_url: "https://bandcamp.com/".into(),
            max_requests: 500,
            page_delay_ms: 300,
            request_timeout: 15,
            max_retries: 3,
            task_timeout: 600,
        }
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde("~/a/b.db"), home.join("a/b.db"));
        assert_eq!(expand_tilde("/abs/b.db"), PathBuf::from("/abs/b.db"));
        assert_eq!(expand_tilde("rel.db"), PathBuf::from("rel.db"));
    }

    #[test]
    fn test_from_cli_defaults() {
        let config = Config::from_cli(&args()).unwrap();
        assert!(config.db_path.ends_with(".campcounselor/albums.db"));
        assert_eq!(config.client.base_url, "https://bandcamp.com");
        assert_eq!(config.client.request_timeout, Duration::from_secs(15));
        assert_eq!(config.client.retry.max_retries, 3);
        assert_eq!(config.pagination.max_requests, 500);
        assert_eq!(config.pagination.page_delay, Duration::from_millis(300));
        assert_eq!(config.task.task_timeout, Duration::from_secs(600));
        assert_eq!(config.task.status_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_from_cli_rejects_bad_values() {
        let mut bad = args();
        bad.max_requests = 0;
        assert!(Config::from_cli(&bad).is_err());

        let mut bad = args();
        bad.bandcamp_url = "bandcamp.com".into();
        assert!(Config::from_cli(&bad).is_err());

        let mut bad = args();
        bad.task_timeout = 0;
        assert!(Config::from_cli(&bad).is_err());
    }
}
