//! Event-subscription handles with idempotent removal.

mod registration;

pub use registration::ListenerRegistration;
