//! Defines the "data contract" shared by the configuration layer, the channel
//! state machine and the collaborators plugged around it (bus, upper layer).
//!
//! Everything here is plain data: modes, states, PDU field positions and the
//! handles used to address channels and PDUs.

/// Maximum NM PDU length handled by the engine (CAN FD frames included).
pub const MAX_NM_PDU_BYTES: usize = 64;

/// Upper bound for the per-channel receive history depth.
pub const MAX_RX_PDU_HISTORY: usize = 8;

/// Index of a channel inside the [`NmConfig`](crate::config::NmConfig) table.
pub type NetworkHandle = usize;

//==================================================================================PDU_ID
/// Identifier of a PDU exchanged with the bus interface or the user-data router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PduId(pub u16);

impl PduId {
    /// Return the raw identifier.
    #[inline]
    pub const fn raw(&self) -> u16 {
        self.0
    }
}

//==================================================================================MODES
/// Coarse operating phase of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NmMode {
    /// Bus is quiet, no NM traffic expected.
    BusSleep,
    /// Transition phase: the bus is allowed to drain before sleeping.
    PrepareBusSleep,
    /// Network is kept awake.
    Network,
}

/// Fine-grained state of a channel.
///
/// Inside [`NmMode::Network`] the state is one of `RepeatMessage`,
/// `NormalOperation` or `ReadySleep`; outside it mirrors the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NmState {
    /// Channel never initialised, or de-initialised.
    Uninit,
    BusSleep,
    PrepareBusSleep,
    /// Node announces itself with NM PDUs regardless of its own request.
    RepeatMessage,
    /// Node keeps the network awake because it is requested locally.
    NormalOperation,
    /// Node does not need the bus anymore and waits for the others.
    ReadySleep,
}

impl NmState {
    /// Mode owning this state. `Uninit` is reported as bus sleep.
    pub const fn mode(&self) -> NmMode {
        match self {
            NmState::Uninit | NmState::BusSleep => NmMode::BusSleep,
            NmState::PrepareBusSleep => NmMode::PrepareBusSleep,
            NmState::RepeatMessage | NmState::NormalOperation | NmState::ReadySleep => {
                NmMode::Network
            }
        }
    }
}

//==================================================================================PDU_LAYOUT
/// Position of an optional field (node identifier, control bit vector) inside the NM PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PduBytePosition {
    Byte0,
    Byte1,
    /// Field is not transmitted.
    Off,
}

impl PduBytePosition {
    /// Byte index of the field, `None` when the field is absent.
    #[inline]
    pub const fn index(&self) -> Option<usize> {
        match self {
            PduBytePosition::Byte0 => Some(0),
            PduBytePosition::Byte1 => Some(1),
            PduBytePosition::Off => None,
        }
    }

    /// `true` when the field is part of the PDU.
    #[inline]
    pub const fn is_present(&self) -> bool {
        !matches!(self, PduBytePosition::Off)
    }
}

/// Window of the NM PDU carrying user data, computed from the enabled fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UserDataLayout {
    /// First user-data byte.
    pub offset: usize,
    /// Number of user-data bytes.
    pub len: usize,
}

impl UserDataLayout {
    /// Byte range covered by the user data.
    #[inline]
    pub const fn range(&self) -> core::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}
