//! Fixed-capacity NM PDU buffer, sized for CAN FD frames.
use crate::core::MAX_NM_PDU_BYTES;

#[derive(Clone, Copy, PartialEq, Eq)]
/// NM PDU as transmitted or received on the bus.
pub struct NmPdu {
    /// Payload buffer. Only the first `len` bytes are meaningful.
    data: [u8; MAX_NM_PDU_BYTES],
    /// Number of valid payload bytes.
    len: usize,
}

impl Default for NmPdu {
    fn default() -> Self {
        Self::new()
    }
}

impl NmPdu {
    /// Empty PDU.
    pub const fn new() -> Self {
        Self {
            data: [0; MAX_NM_PDU_BYTES],
            len: 0,
        }
    }

    /// PDU of `len` bytes, every byte set to `fill`. `len` is capped to the capacity.
    pub fn filled(len: usize, fill: u8) -> Self {
        let len = len.min(MAX_NM_PDU_BYTES);
        let mut data = [0; MAX_NM_PDU_BYTES];
        data[..len].fill(fill);
        Self { data, len }
    }

    /// Copy of `bytes`, truncated to the capacity.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut pdu = Self::new();
        pdu.copy_from(bytes);
        pdu
    }

    /// Replace the content with `bytes`, truncated to the capacity.
    pub fn copy_from(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(MAX_NM_PDU_BYTES);
        self.data[..len].copy_from_slice(&bytes[..len]);
        self.len = len;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }
}

impl core::fmt::Debug for NmPdu {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NmPdu")
            .field("data", &self.as_slice())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NmPdu {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "NmPdu {{ data: {=[u8]:02x} }}", self.as_slice())
    }
}
