//! Client-side synchronization core for pickup football match rooms.
//!
//! Keeps a local projection of one match — roster, occupancy, and chat
//! thread — consistent with a remote backend. Mutations apply
//! optimistically and roll back exactly on failure; a supervised push
//! subscription reconciles events from other participants and recovers
//! from disconnects by re-fetching the authoritative snapshot.

/// Backend boundary trait, errors, and the in-memory implementation.
pub mod backend;
/// Runtime configuration loading.
pub mod config;
/// Error taxonomy surfaced by every operation.
pub mod error;
/// Domain model and payload validation.
pub mod model;
/// Operations: hosting, roster changes, chat, snapshots, and streaming.
pub mod services;
/// Session identity context.
pub mod session;
/// Synchronized per-match state and view projection.
pub mod state;
