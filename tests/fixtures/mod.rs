//! Test image fixtures

#![allow(dead_code)]

/// PNG file signature.
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Bytes that sniff as a PNG, padded to `size` bytes.
pub fn png_bytes(size: usize) -> Vec<u8> {
    let mut bytes = PNG_SIGNATURE.to_vec();
    bytes.resize(size.max(PNG_SIGNATURE.len()), 0);
    bytes
}

/// A 10KB PNG-looking upload.
pub fn small_png() -> Vec<u8> {
    png_bytes(10 * 1024)
}

/// Bytes that do not match any image signature.
pub fn not_an_image() -> Vec<u8> {
    b"%PDF-1.7 definitely not an image".to_vec()
}
