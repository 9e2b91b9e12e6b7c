//! Infrastructure shared by the protocol layer: bit-level codecs for NM PDUs.
pub mod codec;
