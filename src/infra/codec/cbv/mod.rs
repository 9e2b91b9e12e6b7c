//! Control Bit Vector (CBV) codec.
//!
//! The CBV is a single byte of the NM PDU carrying protocol flags. Every
//! helper is a no-op (or reports "not set") when the CBV is not part of the
//! configured PDU layout.
//!
//! # Bit layout
//!
//! ```text
//! Bit 0 : Repeat message request
//! Bit 3 : Coordinator sleep ready
//! Bit 4 : Active wakeup
//! Bit 5 : Partial network information
//! ```
use crate::core::PduBytePosition;

/// Flags carried by the control bit vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CbvBit {
    RepeatMessageRequest,
    CoordinatorSleepReady,
    ActiveWakeup,
    PartialNetworkInformation,
}

impl CbvBit {
    /// Bit index inside the CBV byte.
    #[inline]
    pub const fn bit(&self) -> u8 {
        match self {
            CbvBit::RepeatMessageRequest => 0,
            CbvBit::CoordinatorSleepReady => 3,
            CbvBit::ActiveWakeup => 4,
            CbvBit::PartialNetworkInformation => 5,
        }
    }

    /// Single-bit mask.
    #[inline]
    pub const fn mask(&self) -> u8 {
        1 << self.bit()
    }
}

/// Set `bit` in the CBV of `pdu`.
pub fn set_bit(pdu: &mut [u8], position: PduBytePosition, bit: CbvBit) {
    if let Some(byte) = cbv_byte_mut(pdu, position) {
        *byte |= bit.mask();
    }
}

/// Clear `bit` in the CBV of `pdu`.
pub fn clear_bit(pdu: &mut [u8], position: PduBytePosition, bit: CbvBit) {
    if let Some(byte) = cbv_byte_mut(pdu, position) {
        *byte &= !bit.mask();
    }
}

/// Write `bit` according to `value`.
pub fn write_bit(pdu: &mut [u8], position: PduBytePosition, bit: CbvBit, value: bool) {
    if value {
        set_bit(pdu, position, bit);
    } else {
        clear_bit(pdu, position, bit);
    }
}

/// Reset every flag of the CBV.
pub fn clear(pdu: &mut [u8], position: PduBytePosition) {
    if let Some(byte) = cbv_byte_mut(pdu, position) {
        *byte = 0;
    }
}

/// `true` when `bit` is set in the CBV of `pdu` (received or prepared).
pub fn is_set(pdu: &[u8], position: PduBytePosition, bit: CbvBit) -> bool {
    position
        .index()
        .and_then(|index| pdu.get(index))
        .is_some_and(|byte| byte & bit.mask() != 0)
}

/// Raw CBV byte, `None` when the CBV is absent or the PDU is too short.
pub fn read(pdu: &[u8], position: PduBytePosition) -> Option<u8> {
    position.index().and_then(|index| pdu.get(index).copied())
}

/// First user-data byte: one byte per optional field present.
pub const fn user_data_offset(nid: PduBytePosition, cbv: PduBytePosition) -> usize {
    nid.is_present() as usize + cbv.is_present() as usize
}

/// User-data length for a PDU of `pdu_length` bytes.
pub const fn user_data_length(pdu_length: usize, offset: usize) -> usize {
    pdu_length.saturating_sub(offset)
}

fn cbv_byte_mut(pdu: &mut [u8], position: PduBytePosition) -> Option<&mut u8> {
    position.index().and_then(|index| pdu.get_mut(index))
}
