//! # krangler-depot
//!
//! Tracks which manifest is installed for each depot.
//!
//! The mapping only moves forward: recording a manifest id lower than the
//! installed one fails with [`DepotError::StaleManifest`] unless the caller
//! asks for an explicit [`InstallMode::Rollback`]. Backends serialize updates
//! of a single depot so two concurrent installs cannot both pass that check.
//!
//! - [`InMemoryDepotState`] keeps the mapping in memory.
//! - [`FileDepotState`] persists it as a protobuf `DepotConfigStore` file.

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{DepotError, DepotResult};
pub use file::FileDepotState;
pub use memory::InMemoryDepotState;
pub use traits::{DepotStateStore, InstallMode, MarkOutcome};
