//! Logging setup.

use clap::Args;
use eyre::{Result, WrapErr};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::{Directive, LevelFilter};

/// Logging configuration.
#[derive(Debug, Args, Clone, Default)]
#[command(next_help_heading = "Logging")]
pub(crate) struct LogArgs {
    /// Silence all output except errors.
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Verbose mode (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub(crate) verbosity: u8,

    /// Log filter directive (e.g., "peerstat_net_peer_stats=trace").
    #[arg(long = "log.filter", value_name = "DIRECTIVE", global = true)]
    pub(crate) filter: Option<String>,

    /// Use JSON format for log output.
    #[arg(long = "log.json", global = true)]
    pub(crate) json: bool,
}

impl LogArgs {
    /// Level implied by `--quiet` and `-v`.
    fn level(&self) -> LevelFilter {
        match (self.quiet, self.verbosity) {
            (true, _) => LevelFilter::ERROR,
            (false, 0) => LevelFilter::INFO,
            (false, 1) => LevelFilter::DEBUG,
            (false, _) => LevelFilter::TRACE,
        }
    }

    /// `RUST_LOG`, or the verbosity level when it is unset, followed by every
    /// `--log.filter` directive. `--quiet` ignores both.
    fn env_filter(&self) -> Result<EnvFilter> {
        if self.quiet {
            return Ok(EnvFilter::default().add_directive(self.level().into()));
        }

        let base = EnvFilter::builder()
            .with_default_directive(self.level().into())
            .from_env_lossy();
        self.filter
            .iter()
            .flat_map(|filter| filter.split(','))
            .map(str::trim)
            .filter(|directive| !directive.is_empty())
            .try_fold(base, |filter, directive| {
                let directive = directive
                    .parse::<Directive>()
                    .wrap_err_with(|| format!("invalid --log.filter directive {directive:?}"))?;
                Ok(filter.add_directive(directive))
            })
    }
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub(crate) fn init_logging(args: &LogArgs) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(args.env_filter()?)
        .with_writer(std::io::stderr);
    let installed = if args.json {
        builder.json().try_init()
    } else {
        builder.without_time().try_init()
    };
    installed.map_err(|e| eyre::eyre!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_flags() {
        let mut args = LogArgs::default();
        assert_eq!(args.level(), LevelFilter::INFO);
        args.verbosity = 1;
        assert_eq!(args.level(), LevelFilter::DEBUG);
        args.verbosity = 3;
        assert_eq!(args.level(), LevelFilter::TRACE);
        args.quiet = true;
        assert_eq!(args.level(), LevelFilter::ERROR);
    }

    #[test]
    fn test_filter_directives() {
        let args = LogArgs {
            filter: Some("peerstat_net_peer_stats=trace, redb=warn,".into()),
            ..Default::default()
        };
        let filter = args.env_filter().unwrap().to_string();
        assert!(filter.contains("peerstat_net_peer_stats=trace"));
        assert!(filter.contains("redb=warn"));
    }

    #[test]
    fn test_invalid_directive_is_rejected() {
        let args = LogArgs {
            filter: Some("peerstat=notalevel".into()),
            ..Default::default()
        };
        assert!(args.env_filter().is_err());
    }

    #[test]
    fn test_quiet_ignores_directives() {
        let args = LogArgs {
            quiet: true,
            filter: Some("peerstat=trace".into()),
            ..Default::default()
        };
        let filter = args.env_filter().unwrap().to_string();
        assert!(filter.contains("error"));
        assert!(!filter.contains("peerstat"));
    }
}
