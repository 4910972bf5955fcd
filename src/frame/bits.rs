// Bit-level helpers for the wire format. Bytes travel least-significant
// bit first; the receiver reassembles with the same ordering.

/// Convert a byte to its eight wire bits, LSB first.
pub fn byte_to_bits(byte: u8) -> [u8; 8] {
    let mut bits = [0u8; 8];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (byte >> i) & 1;
    }
    bits
}

/// Reassemble a byte from up to eight wire bits, LSB first.
pub fn bits_to_byte(bits: &[u8]) -> u8 {
    let mut byte = 0u8;
    for (i, &bit) in bits.iter().enumerate().take(8) {
        if bit != 0 {
            byte |= 1 << i;
        }
    }
    byte
}

/// Expand bytes into a wire bit vector.
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &byte in bytes {
        bits.extend_from_slice(&byte_to_bits(byte));
    }
    bits
}

/// Pack a wire bit vector back into bytes. Trailing bits short of a full
/// byte land in the low positions of the final byte.
pub fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
    let num_bytes = bits.len().div_ceil(8);
    let mut bytes = Vec::with_capacity(num_bytes);

    for chunk in bits.chunks(8) {
        bytes.push(bits_to_byte(chunk));
    }

    bytes
}

/// Frame integrity check: XOR over the payload bytes.
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}
