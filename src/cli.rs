use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;
use gqlws_server::{ConnectionConfig, ServerConfig};
use gqlws_telemetry::{LogFormat, TelemetryConfig};
use tracing::Level;

/// GraphQL subscription server speaking the `graphql-ws` protocol.
#[derive(Parser, Debug)]
#[command(name = "gqlws", about = "GraphQL over WebSocket subscription server")]
pub struct Cli {
    /// Address to bind.
    #[arg(long, env = "GQLWS_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to bind (0 for auto-assign).
    #[arg(long, env = "GQLWS_PORT", default_value = "8085")]
    pub port: u16,

    /// Route serving WebSocket upgrades.
    #[arg(long, env = "GQLWS_PATH", default_value = "/subscriptions")]
    pub path: String,

    /// Require this token in `connection_init`.
    #[arg(long, env = "GQLWS_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Send `ka` frames at this interval. 0 disables them.
    #[arg(long, env = "GQLWS_KEEP_ALIVE_SECS")]
    pub keep_alive_secs: Option<u64>,

    /// Interval of the demo `tick` publication, in milliseconds.
    #[arg(long, env = "GQLWS_TICK_MILLIS", default_value = "1000")]
    pub tick_millis: u64,

    #[arg(long, env = "GQLWS_LOG_LEVEL", default_value = "info")]
    pub log_level: Level,

    /// `json` or `pretty`.
    #[arg(long, env = "GQLWS_LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

impl Cli {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_address: self.bind,
            port: self.port,
            path: self.path.clone(),
            connection: ConnectionConfig {
                keep_alive: self
                    .keep_alive_secs
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
                ..Default::default()
            },
        }
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: self.log_level,
            format: self.log_format,
            ..Default::default()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_server_config() {
        let cli = Cli::try_parse_from([
            "gqlws",
            "--port",
            "9000",
            "--path",
            "/graphql",
            "--keep-alive-secs",
            "15",
            "--log-format",
            "pretty",
        ])
        .unwrap();

        let config = cli.server_config();
        assert_eq!(config.port, 9000);
        assert_eq!(config.path, "/graphql");
        assert_eq!(config.connection.keep_alive, Some(Duration::from_secs(15)));
        assert_eq!(config.connection.read_limit, 4096);
        assert_eq!(cli.telemetry_config().format, LogFormat::Pretty);
    }

    #[test]
    fn zero_keep_alive_disables_it() {
        let cli = Cli::try_parse_from(["gqlws", "--keep-alive-secs", "0"]).unwrap();
        assert_eq!(cli.server_config().connection.keep_alive, None);
    }

    #[test]
    fn rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["gqlws", "--log-format", "xml"]).is_err());
    }
}
