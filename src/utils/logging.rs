use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;

/// Timestamp format for log lines
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Install the global subscriber. `directive` is an `EnvFilter` string such as
/// `info` or `socks_tunnel=debug`; `RUST_LOG` takes precedence when set.
pub fn init_logging(directive: &str) -> anyhow::Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(env) if !env.is_empty() => EnvFilter::try_new(env)?,
        _ => EnvFilter::try_new(directive)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_installs_once() {
        assert!(init_logging("info").is_ok());
        assert!(init_logging("debug").is_err());
    }
}
