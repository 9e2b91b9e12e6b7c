//! Network management logic: per-channel runtime and timers, the state
//! machine, the public facade and its asynchronous supervisor.
pub mod can_nm;
pub mod channel;
pub mod nm_supervisor;
pub mod state_machine;
pub mod timer;
