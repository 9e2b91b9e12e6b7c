//! `korri-cannm` library: AUTOSAR-style CAN Network Management in a `no_std`
//! environment. Each configured channel coordinates with the other nodes of
//! its bus when the network may go to sleep and when it must wake up. The crate
//! exposes the shared data types, the configuration, the NM PDU codec and the
//! protocol logic (state machine, facade, async supervisor, transport).
#![no_std]
//==================================================================================
/// Core data types shared by the configuration, codec and state machine.
pub mod core;
/// Static configuration of the engine and its channels.
pub mod config;
/// Domain errors (configuration validation, refused requests, bus adapter).
pub mod error;
/// Control bit vector codec and NM PDU layout helpers.
pub mod infra;
/// CAN NM protocol implementation: state machine, facade and transport.
pub mod protocol;
//==================================================================================
