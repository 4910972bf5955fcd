pub mod bits;
pub mod codec;

pub use bits::{bits_to_byte, bits_to_bytes, byte_to_bits, bytes_to_bits, xor_checksum};
pub use codec::{encode_frame, encode_frame_bits, FrameDecoder};
