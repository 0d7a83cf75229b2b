//! Hashing primitives for krangler.
//!
//! - SHA-1 produces [`ContentId`](krangler_types::ContentId) content addresses
//!   for chunks and whole files.
//! - SHA-256 checks the digests that pack archives embed in their file records.
//! - BLAKE3 fingerprints whole pack archives so recomposition can be verified.
//!
//! All operations wrap established libraries; nothing here is custom
//! cryptography.

pub mod hasher;

pub use hasher::{ArchiveHasher, ContentHasher, StreamingHasher};
