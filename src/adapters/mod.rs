pub mod memory;
pub mod postgres;
pub mod webhook;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use webhook::{NoopNotifier, WebhookNotifier};
