//! [`NmBus`] implementation on top of any blocking `embedded-can` controller.
//!
//! NM PDUs are routed to CAN identifiers through a fixed table given at
//! construction. The same table is used in reception to recognise NM frames
//! among the rest of the traffic.
use embedded_can::{blocking::Can, Frame, Id};

use crate::core::PduId;
use crate::error::EmbeddedCanBusError;
use crate::protocol::transport::nm_pdu::NmPdu;
use crate::protocol::transport::traits::nm_bus::NmBus;

/// CAN controller adapter with `R` PDU routes.
pub struct EmbeddedCanBus<C: Can, const R: usize> {
    can: C,
    routes: [(PduId, Id); R],
}

impl<C: Can, const R: usize> EmbeddedCanBus<C, R> {
    pub fn new(can: C, routes: [(PduId, Id); R]) -> Self {
        Self { can, routes }
    }

    pub fn can(&self) -> &C {
        &self.can
    }

    pub fn can_mut(&mut self) -> &mut C {
        &mut self.can
    }

    pub fn into_inner(self) -> C {
        self.can
    }

    /// CAN identifier routed for `pdu`.
    pub fn id_for(&self, pdu: PduId) -> Option<Id> {
        self.routes
            .iter()
            .find(|(route, _)| *route == pdu)
            .map(|(_, id)| *id)
    }

    /// PDU routed for the CAN identifier `id`.
    pub fn pdu_for(&self, id: Id) -> Option<PduId> {
        self.routes
            .iter()
            .find(|(_, route)| *route == id)
            .map(|(pdu, _)| *pdu)
    }

    /// Read the next frame from the controller.
    ///
    /// Returns `Ok(None)` for remote frames and frames without a route: they
    /// belong to other protocols sharing the bus.
    pub fn receive(&mut self) -> Result<Option<(PduId, NmPdu)>, EmbeddedCanBusError<C::Error>> {
        let frame = self.can.receive().map_err(EmbeddedCanBusError::Can)?;
        if frame.is_remote_frame() {
            return Ok(None);
        }
        Ok(self
            .pdu_for(frame.id())
            .map(|pdu| (pdu, NmPdu::from_slice(frame.data()))))
    }
}

impl<C: Can, const R: usize> NmBus for EmbeddedCanBus<C, R> {
    type Error = EmbeddedCanBusError<C::Error>;

    fn transmit(&mut self, pdu: PduId, data: &[u8]) -> Result<(), Self::Error> {
        let id = self
            .id_for(pdu)
            .ok_or(EmbeddedCanBusError::UnknownPdu { pdu })?;
        let frame = C::Frame::new(id, data)
            .ok_or(EmbeddedCanBusError::InvalidFrame { len: data.len() })?;
        #[cfg(feature = "defmt")]
        defmt::trace!("CAN tx {=[u8]:02x}", data);
        self.can.transmit(&frame).map_err(EmbeddedCanBusError::Can)
    }
}
