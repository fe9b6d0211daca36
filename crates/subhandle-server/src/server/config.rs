use anyhow::bail;
use clap::Parser;
use std::time::Duration;
use subhandle::{DEFAULT_RESOLVER_URL, Denylist};
use url::Url;

/// Runtime configuration for the `subhandle-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first), with defaults suitable for a single-node deployment
/// backed by a local SQLite file.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "subhandle-server",
    version,
    about = "Vanity-domain AT Protocol handles backed by SQLite"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:3000" or "/tmp/subhandle.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:3000"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// SQLite connection string for the handle table.
    ///
    /// Environment variable: `DATABASE_URL`
    #[arg(long, env = "DATABASE_URL", default_value_t = String::from("sqlite://handles.db?mode=rwc"))]
    pub database_url: String,

    /// Maximum number of pooled database connections.
    ///
    /// Environment variable: `DB_MAX_CONNECTIONS`
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub db_max_connections: u32,

    /// Domain that claimed labels are issued under, without a leading dot.
    ///
    /// Environment variable: `VANITY_DOMAIN`
    #[arg(long, env = "VANITY_DOMAIN", default_value_t = String::from("warga.cloud"))]
    pub vanity_domain: String,

    /// Base URL of the service answering `com.atproto.identity.resolveHandle`.
    ///
    /// Environment variable: `RESOLVER_URL`
    #[arg(long, env = "RESOLVER_URL", default_value_t = String::from(DEFAULT_RESOLVER_URL))]
    pub resolver_url: String,

    /// Per-request timeout for the resolver, in seconds.
    ///
    /// Environment variable: `RESOLVER_TIMEOUT_SECS`
    #[arg(long, env = "RESOLVER_TIMEOUT_SECS", default_value_t = 10)]
    pub resolver_timeout_secs: u64,

    /// Reserved names, separated by commas or whitespace. Entries may be bare
    /// labels (`admin`) or qualified names (`admin.warga.cloud`).
    ///
    /// Environment variable: `BAN_LIST`
    #[arg(long, env = "BAN_LIST", default_value_t = String::new())]
    pub ban_list: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub database_url: String,
    pub db_max_connections: u32,
    pub vanity_domain: String,
    pub resolver_url: Url,
    pub resolver_timeout: Duration,
    pub denylist: Denylist,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.db_max_connections == 0 {
            bail!("DB_MAX_CONNECTIONS must be greater than 0");
        }

        if args.resolver_timeout_secs == 0 {
            bail!("RESOLVER_TIMEOUT_SECS must be greater than 0");
        }

        let vanity_domain = args.vanity_domain.trim().to_ascii_lowercase();
        if vanity_domain.is_empty() {
            bail!("VANITY_DOMAIN must not be empty");
        }
        if vanity_domain.starts_with('.') || vanity_domain.ends_with('.') {
            bail!("VANITY_DOMAIN ({vanity_domain}) must not start or end with a dot");
        }
        if !vanity_domain.contains('.') {
            bail!("VANITY_DOMAIN ({vanity_domain}) must have at least two labels");
        }

        let resolver_url = Url::parse(&args.resolver_url)
            .map_err(|e| anyhow::anyhow!("RESOLVER_URL ({}) is invalid: {e}", args.resolver_url))?;
        if !matches!(resolver_url.scheme(), "http" | "https") {
            bail!(
                "RESOLVER_URL ({}) must use http or https",
                args.resolver_url
            );
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            database_url: args.database_url,
            db_max_connections: args.db_max_connections,
            vanity_domain,
            resolver_url,
            resolver_timeout: Duration::from_secs(args.resolver_timeout_secs),
            denylist: Denylist::parse(&args.ban_list),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["subhandle-server"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn explicit_arguments_are_validated_into_config() {
        let config = ServerConfig::try_from(args(&[
            "--server-addr",
            "127.0.0.1:8080",
            "--database-url",
            "sqlite::memory:",
            "--db-max-connections",
            "1",
            "--vanity-domain",
            " Warga.Cloud ",
            "--resolver-url",
            "https://bsky.social",
            "--resolver-timeout-secs",
            "3",
            "--ban-list",
            "admin,www",
        ]))
        .unwrap();

        assert_eq!(config.server_addr, "127.0.0.1:8080");
        assert!(!config.uds);
        assert_eq!(config.vanity_domain, "warga.cloud");
        assert_eq!(config.resolver_timeout, Duration::from_secs(3));
        assert_eq!(config.denylist.len(), 2);
        assert_eq!(config.resolver_url.host_str(), Some("bsky.social"));
    }

    fn base() -> CliArgs {
        CliArgs {
            server_addr: "0.0.0.0:3000".to_string(),
            uds: false,
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            vanity_domain: "warga.cloud".to_string(),
            resolver_url: "https://bsky.social".to_string(),
            resolver_timeout_secs: 10,
            ban_list: String::new(),
        }
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(ServerConfig::try_from(base()).is_ok());

        let cases: [fn(&mut CliArgs); 6] = [
            |a| a.db_max_connections = 0,
            |a| a.resolver_timeout_secs = 0,
            |a| a.vanity_domain = ".warga.cloud".to_string(),
            |a| a.vanity_domain = "localhost".to_string(),
            |a| a.resolver_url = "not a url".to_string(),
            |a| a.resolver_url = "ftp://bsky.social".to_string(),
        ];
        for mutate in cases {
            let mut args = base();
            mutate(&mut args);
            assert!(ServerConfig::try_from(args).is_err());
        }
    }
}
