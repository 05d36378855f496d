//! qarun Common Library
//!
//! Run records, the exported-results filter, and the append-only run ledger
//! shared by the browser driver and the CLI.

pub mod error;
pub mod export;
pub mod ledger;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use export::{consume_export, extract_items, item_from_description};
pub use ledger::Ledger;
pub use types::*;

/// qarun version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
