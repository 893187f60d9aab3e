//! Memory store: durable interaction log, preferences, and file-index cache.

pub mod cursor;
pub mod handle;
pub mod libsql_backend;
pub mod migrations;
pub mod model;
pub mod traits;

pub use cursor::InteractionCursor;
pub use handle::{Access, MemoryAccess, MemoryHandle};
pub use libsql_backend::LibSqlBackend;
pub use model::{
    DuplicateGroups, FileIndexEntry, Interaction, InteractionFilter, InteractionStatus,
    NewInteraction, Preference, ReceivedRequest, StoreStats, path_within,
};
pub use traits::MemoryStore;
