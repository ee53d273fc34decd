use crate::color::Rgb;

use super::FRAME_MAGIC;

/// Header length: magic word, two length bytes, checksum.
pub const HEADER_LEN: usize = 6;

/// Trailing pad byte appended after the pixel body, always zero.
pub const TRAILER_LEN: usize = 1;

/// Total frame length for a strip of `led_count` LEDs.
pub fn frame_len(led_count: usize) -> usize {
    HEADER_LEN + led_count * 3 + TRAILER_LEN
}

/// Build the 6-byte Adalight header.
///
/// The length field carries `led_count - 1` split into high and low bytes.
/// Counts above 65536 do not fit and silently wrap, exactly as the firmware
/// would read them.
pub fn build_header(led_count: usize) -> [u8; HEADER_LEN] {
    let count = led_count.wrapping_sub(1) as u16;
    let [count_hi, count_lo] = count.to_be_bytes();
    let checksum = count_hi ^ count_lo ^ 0x55;

    [
        FRAME_MAGIC[0],
        FRAME_MAGIC[1],
        FRAME_MAGIC[2],
        count_hi,
        count_lo,
        checksum,
    ]
}

/// Build Adalight protocol frame
pub fn build_adalight_frame(colors: &[Rgb]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(frame_len(colors.len()));

    // Header
    frame.extend_from_slice(&build_header(colors.len()));

    // Pixel data
    for color in colors {
        frame.push(color.red());
        frame.push(color.green());
        frame.push(color.blue());
    }

    frame.push(0);

    frame
}
