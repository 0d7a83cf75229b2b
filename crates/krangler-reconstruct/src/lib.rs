//! Verified reconstruction for krangler.
//!
//! - [`Reconstructor`] rebuilds files from their manifest entries.
//! - [`Recomposer`] rebuilds whole pack archives from a
//!   [`PackSkeleton`](krangler_codec::PackSkeleton).
//!
//! Chunks are fetched in parallel but written strictly in order, each one
//! checked against its key, and the complete output is checked against the
//! declared whole-file (or whole-archive) digest. Output written to disk is
//! staged next to its destination and only renamed into place after it has
//! verified.

pub mod error;
mod fetch;
mod output;
pub mod recomposer;
pub mod reconstructor;

pub use error::{ReconstructError, ReconstructResult};
pub use recomposer::Recomposer;
pub use reconstructor::{MaterializeReport, Reconstructor};
