/// Optimistic message sending.
pub mod chat_service;
/// Hosting, joining, and leaving matches.
pub mod roster_service;
/// Authoritative snapshot reads and installation.
pub mod snapshot_service;
/// Thread subscription supervision and event reconciliation.
pub mod stream_service;
