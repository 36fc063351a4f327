//! Application layer: wires configuration into a running session.

pub mod bootstrap;

pub use bootstrap::AppContext;
