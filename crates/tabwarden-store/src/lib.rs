//! Tabwarden Store — local key-value store, remote mirror, last-writer-wins sync.
//!
//! The local store is the source the engine reads from. The remote mirror
//! holds one blob per installation, stamped with `version` and `mtime`;
//! the higher `mtime` always wins.

pub mod bridge;
pub mod local;
pub mod remote;
pub mod transfer;

pub use bridge::{is_newer, MirrorHandle, PullOutcome, PushOutcome, RestoreEvent, RestoreSource, StorageBridge};
pub use local::{JsonFileStore, LocalStore, MemoryStore, Snapshot};
pub use remote::{JsonFileRemote, MemoryRemote, RemoteChange, RemoteStore};
pub use transfer::{export_json, import_json, EXPORT_FILE_NAME};
