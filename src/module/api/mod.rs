//! Host notification handling

pub mod events;

pub use events::{triggers_rescan, EventListener, RescanQueue};
