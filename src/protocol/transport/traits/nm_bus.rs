//! Minimal abstraction for the bus interface below the engine. Allows the
//! library to plug into various implementations (embedded HAL, interface
//! layer of a larger stack, test double).
use crate::core::PduId;

/// Contract to hand an NM PDU to the bus.
///
/// Transmission is synchronous: the call returns once the PDU is queued (or
/// rejected). The outcome on the wire is reported later through
/// [`CanNm::tx_confirmation`](crate::protocol::managment::can_nm::CanNm::tx_confirmation).
pub trait NmBus {
    type Error: core::fmt::Debug;
    /// Queue `data` for transmission on the PDU `pdu`.
    fn transmit(&mut self, pdu: PduId, data: &[u8]) -> Result<(), Self::Error>;
}

impl<T: NmBus + ?Sized> NmBus for &mut T {
    type Error = T::Error;

    fn transmit(&mut self, pdu: PduId, data: &[u8]) -> Result<(), Self::Error> {
        (**self).transmit(pdu, data)
    }
}
