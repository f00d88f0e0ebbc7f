//! 会话账本层：Transcript 快照、追加式账本、可恢复的会话存储

pub mod history;
pub mod store;
pub mod transcript;

pub use history::{EntryKind, EntryPayload, Ledger, LedgerEntry, NO_HISTORY};
pub use store::{MemorySessionStore, SessionStore, SqliteSessionStore};
pub use transcript::{Message, Role, Transcript};
