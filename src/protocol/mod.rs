//! High-level components of the CAN network management protocol: the
//! per-channel state machine and its transport.
pub mod managment;
pub mod transport;
