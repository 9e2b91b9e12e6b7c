//! `embedded-can` adapter tests: PDU routing, frame building and reception filtering.
use std::collections::VecDeque;

use embedded_can::{blocking::Can, ErrorKind, ExtendedId, Frame, Id, StandardId};
use korri_cannm::config::{ChannelConfig, NmConfig, NmGlobalConfig};
use korri_cannm::core::{NmState, PduId};
use korri_cannm::error::EmbeddedCanBusError;
use korri_cannm::protocol::managment::can_nm::CanNm;
use korri_cannm::protocol::transport::embedded_can_bus::EmbeddedCanBus;
use korri_cannm::protocol::transport::traits::nm_bus::NmBus;

const RX_PDU: PduId = PduId(1);
const TX_PDU: PduId = PduId(2);

//==================================================================================
// CONTROLLER DOUBLE
//==================================================================================

#[derive(Debug, Clone, PartialEq)]
/// Classic CAN frame, at most 8 data bytes.
struct MockFrame {
    id: Id,
    data: Vec<u8>,
    remote: bool,
}

impl Frame for MockFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        (data.len() <= 8).then(|| Self {
            id: id.into(),
            data: data.to_vec(),
            remote: false,
        })
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        (dlc <= 8).then(|| Self {
            id: id.into(),
            data: vec![0; dlc],
            remote: true,
        })
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.data.len()
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, PartialEq)]
struct MockError;

impl embedded_can::Error for MockError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Default)]
/// Controller keeping transmitted frames and serving queued ones.
struct MockCan {
    sent: Vec<MockFrame>,
    inbox: VecDeque<MockFrame>,
    offline: bool,
}

impl Can for MockCan {
    type Frame = MockFrame;
    type Error = MockError;

    fn transmit(&mut self, frame: &Self::Frame) -> Result<(), Self::Error> {
        if self.offline {
            return Err(MockError);
        }
        self.sent.push(frame.clone());
        Ok(())
    }

    fn receive(&mut self) -> Result<Self::Frame, Self::Error> {
        self.inbox.pop_front().ok_or(MockError)
    }
}

fn rx_id() -> Id {
    Id::Standard(StandardId::new(0x510).unwrap())
}

fn tx_id() -> Id {
    Id::Standard(StandardId::new(0x52A).unwrap())
}

fn adapter() -> EmbeddedCanBus<MockCan, 2> {
    EmbeddedCanBus::new(MockCan::default(), [(RX_PDU, rx_id()), (TX_PDU, tx_id())])
}

//==================================================================================
// TRANSMISSION
//==================================================================================

#[test]
/// PDUs leave on their routed identifier with the payload untouched.
fn test_transmit_uses_route() {
    let mut bus = adapter();
    bus.transmit(TX_PDU, &[0x2A, 0x00, 1, 2, 3, 4, 5, 6]).unwrap();

    let sent = &bus.can().sent;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id(), tx_id());
    assert_eq!(sent[0].data(), &[0x2A, 0x00, 1, 2, 3, 4, 5, 6]);
}

#[test]
/// Unrouted PDUs, oversized payloads and controller failures are reported distinctly.
fn test_transmit_errors() {
    let mut bus = adapter();
    assert!(matches!(
        bus.transmit(PduId(9), &[0; 8]),
        Err(EmbeddedCanBusError::UnknownPdu { pdu: PduId(9) })
    ));
    assert!(matches!(
        bus.transmit(TX_PDU, &[0; 12]),
        Err(EmbeddedCanBusError::InvalidFrame { len: 12 })
    ));

    bus.can_mut().offline = true;
    assert!(matches!(
        bus.transmit(TX_PDU, &[0; 8]),
        Err(EmbeddedCanBusError::Can(MockError))
    ));
    assert!(bus.into_inner().sent.is_empty());
}

//==================================================================================
// RECEPTION
//==================================================================================

#[test]
/// Only routed data frames are handed over as NM PDUs.
fn test_receive_filters_traffic() {
    let mut bus = adapter();
    let foreign = Id::Extended(ExtendedId::new(0x18EA_FF00).unwrap());
    let inbox = &mut bus.can_mut().inbox;
    inbox.push_back(MockFrame::new(foreign, &[1, 2, 3]).unwrap());
    inbox.push_back(MockFrame::new_remote(rx_id(), 8).unwrap());
    inbox.push_back(MockFrame::new(rx_id(), &[0x05, 0x01, 9, 9]).unwrap());

    assert!(bus.receive().unwrap().is_none());
    assert!(bus.receive().unwrap().is_none());
    let (pdu, data) = bus.receive().unwrap().expect("routed frame");
    assert_eq!(pdu, RX_PDU);
    assert_eq!(data.as_slice(), &[0x05, 0x01, 9, 9]);

    assert!(matches!(bus.receive(), Err(EmbeddedCanBusError::Can(MockError))));
    assert_eq!(bus.pdu_for(tx_id()), Some(TX_PDU));
    assert_eq!(bus.id_for(RX_PDU), Some(rx_id()));
}

#[test]
/// The engine runs unchanged on top of the adapter.
fn test_engine_over_adapter() {
    let channel = ChannelConfig::builder(RX_PDU, TX_PDU)
        .node_id(0x2A)
        .node_id_enabled(true)
        .build()
        .unwrap();
    let config = NmConfig::new(NmGlobalConfig::default(), [channel]).unwrap();
    let mut nm = CanNm::new(&config, adapter(), ());
    nm.init();

    nm.bus_mut()
        .can_mut()
        .inbox
        .push_back(MockFrame::new(rx_id(), &[0x07, 0x00, 0, 0, 0, 0, 0, 0]).unwrap());
    if let Some((pdu, data)) = nm.bus_mut().receive().unwrap() {
        nm.rx_indication(pdu, data.as_slice()).unwrap();
    }
    assert_eq!(nm.get_node_identifier(0).unwrap(), 0x07);

    nm.network_request(0).unwrap();
    nm.main_function();
    assert_eq!(nm.get_state(0).unwrap().0, NmState::RepeatMessage);

    let sent = &nm.bus().can().sent;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id(), tx_id());
    assert_eq!(sent[0].data()[0], 0x2A);
}
