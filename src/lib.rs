//! # statuscast - change detection and filtered dispatch for a status feed
//!
//! statuscast watches a game platform's status feed (incidents and
//! maintenance windows), decides which events are new or changed since the
//! last poll, and hands a notification to every subscriber whose filters
//! admit the event.
//!
//! ## Core Concepts
//!
//! - **CanonicalEvent**: one incident or maintenance window in a uniform shape
//! - **Fingerprint**: coarse change digest of an event's status and latest update
//! - **ChangeState**: what has been seen, and with which fingerprint
//! - **Subscription**: a subscriber's service, impact and event-type filters
//! - **Cycle**: one fetch, diff, dispatch, commit pass over the feed
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use statuscast::{
//!     CycleConfig, DispatchCoordinator, InMemoryDirectory, InMemoryStateStore, LogDelivery, StaticFeed,
//! };
//!
//! let coordinator = DispatchCoordinator::new(
//!     CycleConfig::default(),
//!     Arc::new(StaticFeed::new()),
//!     Arc::new(InMemoryDirectory::new()),
//!     Arc::new(LogDelivery),
//!     Arc::new(InMemoryStateStore::new()),
//! )?;
//! let report = coordinator.run_cycle()?;
//! println!("{} new, {} updated", report.new, report.updated);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Model
pub mod error;
pub mod event;
pub mod subscription;

// Pure core
pub mod matcher;
pub mod normalize;
pub mod state;

// Collaborators
pub mod clock;
pub mod delivery;
pub mod directory;
pub mod feed;

// Orchestration
pub mod config;
pub mod dispatch;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::CycleConfig;
pub use delivery::{DeliveryChannel, LogDelivery, Notification};
pub use directory::{InMemoryDirectory, SubscriberDirectory};
pub use dispatch::{CycleReport, DispatchCoordinator};
pub use error::{DeliveryError, DirectoryError, FeedError, StateError, ValidationError, WatchError, WatchResult};
pub use event::{CanonicalEvent, EventKind, Fingerprint, ImpactLevel, ScheduledWindow};
pub use feed::{fetch_snapshot, DirectoryFeed, FeedCategory, FeedSnapshot, FeedSource, StaticFeed};
pub use matcher::{evaluate, matches, MatchOutput, Rejection};
pub use normalize::normalize;
pub use state::{ChangeState, Classification, InMemoryStateStore, StateStore, DEFAULT_RETENTION_LIMIT};
pub use subscription::{EventTypeFilter, FilterCommand, SubscriberId, Subscription};

#[cfg(feature = "persistent")]
pub use state::{open_state_store, FileStateStore, StateFileConfig};
