//! Abstraction traits connecting the engine to its collaborators
//! (bus interface, upper layer, delay source).
pub mod nm_bus;
pub mod nm_delay;
pub mod nm_upper_layer;
