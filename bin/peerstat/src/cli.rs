//! Command-line interface for the peer statistics tool.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use directories::ProjectDirs;
use eyre::{Result, WrapErr, bail};
use peerstat_net_peer_stats::{
    PeerIdentHash, PeerStatsArgs, PeerStatsRegistry, PeerStatsSnapshot, ScoreDistribution,
};
use peerstat_storage_slot::{RedbSlotStoreProvider, SlotStoreProvider};
use tracing::info;

use crate::logging::LogArgs;

/// Inspect and maintain a peer statistics store.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) datadir: DataDirArgs,

    #[command(flatten)]
    pub(crate) log: LogArgs,

    #[command(flatten)]
    pub(crate) stats: PeerStatsArgs,

    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Data directory configuration.
#[derive(Debug, Args, Clone, Default)]
#[command(next_help_heading = "Datadir")]
pub(crate) struct DataDirArgs {
    /// Directory holding the statistics store.
    #[arg(long, value_name = "PATH", env = "PEERSTAT_DATADIR", global = true)]
    pub(crate) datadir: Option<PathBuf>,
}

impl DataDirArgs {
    fn resolve(&self) -> PathBuf {
        self.datadir.clone().unwrap_or_else(|| {
            ProjectDirs::from("org", "peerstat", "peerstat")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".peerstat"))
        })
    }
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Rescore and list peers, best first.
    Show {
        /// Only print the top N peers.
        #[arg(long)]
        limit: Option<usize>,

        /// Print snapshots as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rescore and list peers that look unreachable.
    Inactive,

    /// Expire statistics older than the retention window.
    Prune,

    /// Drop all statistics for one peer.
    Forget {
        /// Peer identity as hex.
        peer: PeerIdentHash,
    },
}

pub(crate) fn run(cli: Cli) -> Result<()> {
    let path = cli.stats.store_path(&cli.datadir.resolve());
    let provider = RedbSlotStoreProvider::new_with_create_dir(&path)
        .wrap_err_with(|| format!("failed to prepare {}", path.display()))?;
    let registry = PeerStatsRegistry::with_config(provider, cli.stats.registry_config());

    let loaded = registry
        .load()
        .wrap_err_with(|| format!("failed to load {}", path.display()))?;
    info!(
        path = %path.display(),
        loaded = loaded.loaded,
        discarded = loaded.discarded,
        "opened statistics store"
    );

    match cli.command {
        Command::Show { limit, json } => show(&registry, limit, json),
        Command::Inactive => inactive(&registry),
        Command::Prune => prune(&registry, cli.stats.retention()),
        Command::Forget { peer } => forget(&registry, peer),
    }
}

fn show<P: SlotStoreProvider>(
    registry: &PeerStatsRegistry<P>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    registry.update_score();
    let mut snapshots = registry.snapshots();
    if let Some(limit) = limit {
        snapshots.truncate(limit);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }

    println!(
        "{:<64}  {:>8}  {:>11}  {:>11}  {:>11}  {:>9}",
        "peer", "score", "connect", "test", "member", "bandwidth"
    );
    for snapshot in &snapshots {
        print_row(snapshot);
    }
    Ok(())
}

fn print_row(s: &PeerStatsSnapshot) {
    println!(
        "{:<64}  {:>8.3}  {:>11}  {:>11}  {:>11}  {:>9.1}",
        s.id.to_string(),
        s.score,
        format!("{}/{}", s.successful_connects, s.failed_connects),
        format!("{}/{}", s.successful_tunnel_tests, s.failed_tunnel_tests),
        format!("{}/{}", s.successful_tunnel_member, s.declined_tunnel_member),
        s.max_bandwidth_seen,
    );
}

fn inactive<P: SlotStoreProvider>(registry: &PeerStatsRegistry<P>) -> Result<()> {
    registry.update_score();
    let report = registry.inactive_report();
    print_distribution("non-floodfill", &report.non_floodfill);
    print_distribution("floodfill", &report.floodfill);
    for peer in &report.inactive {
        println!("{peer}");
    }
    Ok(())
}

fn print_distribution(label: &str, dist: &ScoreDistribution) {
    println!(
        "# {label}: {} peers, mean {:.3}, std dev {:.3}",
        dist.count, dist.mean, dist.std_dev
    );
}

fn prune<P: SlotStoreProvider>(registry: &PeerStatsRegistry<P>, retention: Duration) -> Result<()> {
    let summary = registry.remove_old_statistics(retention)?;
    println!(
        "expired {}, released {} slots, {} peers remain",
        summary.deleted + summary.dropped,
        summary.deleted,
        registry.len()
    );
    Ok(())
}

fn forget<P: SlotStoreProvider>(registry: &PeerStatsRegistry<P>, peer: PeerIdentHash) -> Result<()> {
    if !registry.remove(&peer) {
        bail!("no statistics recorded for {peer}");
    }
    let summary = registry.save()?;
    println!("forgot {peer} ({} slot released)", summary.deleted);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forget() {
        let peer = PeerIdentHash::repeat_byte(0xcd);
        let cli = Cli::parse_from(["peerstat", "--datadir", "/tmp/x", "forget", &peer.to_string()]);
        assert!(matches!(cli.command, Command::Forget { peer: p } if p == peer));
        assert_eq!(cli.datadir.resolve(), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_parse_show_with_stats_args() {
        let cli = Cli::parse_from([
            "peerstat",
            "--stats.retention-days",
            "2",
            "show",
            "--limit",
            "5",
            "-v",
        ]);
        assert!(matches!(
            cli.command,
            Command::Show {
                limit: Some(5),
                json: false
            }
        ));
        assert_eq!(cli.stats.retention_days, 2);
        assert_eq!(cli.log.verbosity, 1);
    }

    #[test]
    fn test_rejects_bad_identity() {
        assert!(Cli::try_parse_from(["peerstat", "forget", "nothex"]).is_err());
    }
}
