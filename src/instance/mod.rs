//! Reference-counted service-instance ownership for binding layers.

mod registry;

pub use registry::{InstanceKey, InstanceRegistry, RegistryError};
