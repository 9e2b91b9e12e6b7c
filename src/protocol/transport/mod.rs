//! NM transport layer: PDU buffer, collaborator traits and the
//! `embedded-can` adapter.
pub mod embedded_can_bus;
pub mod nm_pdu;
pub mod traits;
