use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use sts_ingest::IngestionSchedulerConfig;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "sts-server",
    about = "Shipment status ingestion and query service",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "bind",
        env = "STS_BIND",
        default_value = "0.0.0.0:8080",
        help = "Socket address for the HTTP api (host:port)"
    )]
    pub bind: SocketAddr,

    #[arg(
        long = "settings",
        env = "STS_SETTINGS",
        default_value = "path.ini",
        help = "key=value settings file naming feed folders and lock files"
    )]
    pub settings: PathBuf,

    #[arg(
        long = "elasticsearch-url",
        env = "STS_ELASTICSEARCH_URL",
        default_value = "http://localhost:9200",
        help = "Base url of the event store"
    )]
    pub elasticsearch_url: String,

    #[arg(
        long = "static-dir",
        env = "STS_STATIC_DIR",
        default_value = "public",
        help = "Directory served for paths outside /api when it exists"
    )]
    pub static_dir: PathBuf,

    #[arg(
        long = "status-interval-secs",
        env = "STS_STATUS_INTERVAL_SECS",
        default_value_t = 90,
        value_parser = parse_positive_u64,
        help = "Seconds between status feed cycles"
    )]
    pub status_interval_secs: u64,

    #[arg(
        long = "cross-reference-interval-secs",
        env = "STS_CROSS_REFERENCE_INTERVAL_SECS",
        default_value_t = 30,
        value_parser = parse_positive_u64,
        help = "Seconds between cross-reference feed cycles"
    )]
    pub cross_reference_interval_secs: u64,

    #[arg(
        long = "watchdog-interval-secs",
        env = "STS_WATCHDOG_INTERVAL_SECS",
        default_value_t = 1800,
        value_parser = parse_positive_u64,
        help = "Seconds before the feed timers are torn down and recreated"
    )]
    pub watchdog_interval_secs: u64,

    #[arg(
        long = "status-start-delay-secs",
        env = "STS_STATUS_START_DELAY_SECS",
        default_value_t = 5,
        value_parser = parse_positive_u64,
        help = "Extra wait before the first status cycle of each timer group"
    )]
    pub status_start_delay_secs: u64,
}

impl Cli {
    pub(crate) fn scheduler_config(&self) -> IngestionSchedulerConfig {
        IngestionSchedulerConfig {
            status_interval: Duration::from_secs(self.status_interval_secs),
            cross_reference_interval: Duration::from_secs(self.cross_reference_interval_secs),
            watchdog_interval: Duration::from_secs(self.watchdog_interval_secs),
            status_start_delay: Duration::from_secs(self.status_start_delay_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_defaults_match_feed_cadence() {
        let cli = Cli::try_parse_from(["sts-server"]).expect("defaults parse");
        assert_eq!(cli.bind.port(), 8080);
        assert_eq!(cli.settings, PathBuf::from("path.ini"));
        assert_eq!(cli.scheduler_config(), IngestionSchedulerConfig::default());
    }

    #[test]
    fn regression_zero_interval_is_rejected_by_parser() {
        let error = Cli::try_parse_from(["sts-server", "--status-interval-secs", "0"])
            .expect_err("zero interval");
        assert!(error.to_string().contains("value must be greater than 0"));
    }

    #[test]
    fn unit_overrides_flow_into_scheduler_config() {
        let cli = Cli::try_parse_from([
            "sts-server",
            "--bind",
            "127.0.0.1:9000",
            "--cross-reference-interval-secs",
            "7",
        ])
        .expect("overrides parse");
        assert_eq!(cli.bind.to_string(), "127.0.0.1:9000");
        assert_eq!(
            cli.scheduler_config().cross_reference_interval,
            Duration::from_secs(7)
        );
    }
}
