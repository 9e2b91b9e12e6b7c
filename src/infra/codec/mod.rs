//! Codecs operating on raw NM PDU buffers.
pub mod cbv;
