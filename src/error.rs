//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (configuration validation,
//! refused channel requests, bus adapter failures).
use crate::core::{NetworkHandle, NmState, PduId};
use thiserror_no_std::Error;

//==================================================================================CONFIG_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while validating a channel or global configuration.
pub enum ConfigError {
    /// Node identifier and control bit vector share the same byte.
    #[error("Node identifier and control bit vector overlap")]
    PositionOverlap,
    /// A single optional field is configured on byte 1, leaving byte 0 orphaned.
    #[error("Optional PDU fields must start at byte 0")]
    PositionGap,
    /// PDU length is zero or exceeds the supported maximum.
    #[error("Invalid PDU length: {len} (max {max})")]
    InvalidPduLength { len: usize, max: usize },
    /// An optional field does not fit inside the configured PDU length.
    #[error("Field at byte {index} lies outside a {len}-byte PDU")]
    PositionOutOfFrame { index: usize, len: usize },
    /// Receive history depth is zero or exceeds the supported maximum.
    #[error("Invalid receive history depth: {count} (max {max})")]
    InvalidRxHistory { count: usize, max: usize },
    /// The periodic tick must advance time.
    #[error("Main function period must be greater than zero")]
    ZeroMainFunctionPeriod,
    /// Two channels use the same receive or transmit PDU.
    #[error("PDU {pdu:?} is routed to more than one channel")]
    DuplicatePdu { pdu: PduId },
}

//==================================================================================NM_ERROR
#[derive(Error, Debug)]
/// Reasons for a channel request to be refused.
///
/// Every refusal leaves the channel untouched; `Bus` carries the error
/// reported by the bus interface.
pub enum NmError<E: core::fmt::Debug> {
    /// The instance has not been initialised (or was de-initialised).
    #[error("Network management not initialised")]
    Uninit,
    /// Channel handle outside the configured table.
    #[error("Invalid channel handle: {channel}")]
    InvalidChannel { channel: NetworkHandle },
    /// No channel owns this PDU identifier.
    #[error("Unknown PDU: {pdu:?}")]
    UnknownPdu { pdu: PduId },
    /// Request not allowed in the current state.
    #[error("Request not allowed in state {state:?}")]
    InvalidState { state: NmState },
    /// Request requires the channel to be in network mode.
    #[error("Channel is not in network mode")]
    NotInNetworkMode,
    /// Request not available while the node runs in passive mode.
    #[error("Request not available in passive mode")]
    PassiveMode,
    /// Feature disabled by configuration.
    #[error("Feature disabled: {feature}")]
    Disabled { feature: &'static str },
    /// No NM PDU has been received on this channel yet.
    #[error("No NM PDU received yet")]
    NoPduReceived,
    /// Communication is already enabled (message cycle timer running).
    #[error("Message cycle timer already running")]
    MessageCycleRunning,
    /// Caller buffer cannot hold the requested data.
    #[error("Buffer too small -> needed: {needed}, available: {available}")]
    BufferTooSmall { needed: usize, available: usize },
    /// De-initialisation requires every channel to be asleep.
    #[error("Every channel must be in bus sleep")]
    NotAllChannelsAsleep,
    /// The bus interface rejected the PDU.
    #[error("Bus transmit error: {0:?}")]
    Bus(E),
}

/// Result alias used by the facade.
pub type NmResult<T, E> = Result<T, NmError<E>>;

//==================================================================================ADAPTER_ERROR
#[derive(Error, Debug)]
/// Failures of the `embedded-can` bus adapter.
pub enum EmbeddedCanBusError<E: core::fmt::Debug> {
    /// No CAN identifier is routed for this PDU.
    #[error("No CAN identifier routed for PDU {pdu:?}")]
    UnknownPdu { pdu: PduId },
    /// The controller could not build a frame from the payload (too long for the frame format).
    #[error("Unable to build a CAN frame of {len} bytes")]
    InvalidFrame { len: usize },
    /// Error reported by the CAN controller.
    #[error("CAN controller error: {0:?}")]
    Can(E),
}
