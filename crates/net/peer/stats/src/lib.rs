//! Peer reputation tracking.
//!
//! [`PeerStatsRegistry`] collects success and failure observations for every
//! known peer, turns them into a score used for ranking, flags peers that look
//! dead, and persists everything to a [`SlotStore`](peerstat_storage_slot::SlotStore)
//! so reputation survives restarts.
//!
//! ```ignore
//! let registry = PeerStatsRegistry::new(RedbSlotStoreProvider::new(path));
//! registry.load()?;
//! registry.successful_connect(peer);
//! registry.update_score();
//! registry.save()?;
//! ```

mod clock;
mod config;
mod error;
mod event;
mod ident;
mod metrics;
mod observer;
mod peer;
pub mod record;
mod registry;
mod score;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DEFAULT_STORE_FILE, PeerStatsArgs, RegistryConfig};
pub use error::StatisticsError;
pub use event::PeerStatsEvent;
pub use ident::{IDENT_HASH_LEN, ParseIdentError, PeerIdentHash};
pub use observer::BuildTimeObserver;
pub use peer::{BUILD_TIME_UNSET, PeerStats, PeerStatsSnapshot};
pub use registry::{InactiveReport, LoadSummary, PeerStatsRegistry, SaveSummary};
pub use score::{InactivityPolicy, ScoreDistribution, ScoreWeights, compute_score};
