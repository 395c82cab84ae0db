//! Duplicate tab engine — detects tabs that share a normalized identity and
//! closes all but one per group.
//!
//! A scan runs collect → filter/normalize → group → resolve against the
//! live tab set supplied by a [`TabHost`]. Options and ignore lists are read
//! from and persisted through a [`tabwarden_store::StorageBridge`].

pub mod dedup;
pub mod engine;
pub mod host;
pub mod ignore;
pub mod message;
pub mod scheduler;

pub use dedup::{plan_closures, GroupKey, ScanPlan};
pub use engine::{Engine, ScanReport, TabEvent, TabEventKind};
pub use host::TabHost;
pub use ignore::{IgnoreKind, IgnoreLists};
pub use message::{handle_message, ExtraEntry, MessageRequest, MessageResponse};
pub use scheduler::{schedule_after, ScheduledTask, Trigger};
