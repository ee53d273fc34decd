//! Adalight wire protocol.
//!
//! Two binary families share the link: strip-update frames starting with
//! `Ada` and fixed 6-byte command frames starting with `Adb`. The device
//! answers in newline-terminated ASCII.

mod adalight;
mod command;

pub use adalight::{build_adalight_frame, build_header, frame_len, HEADER_LEN, TRAILER_LEN};
pub use command::{decode_state_line, encode_command, Command, DeviceState, COMMAND_LEN};

/// Magic word of strip-update frames and of the device announce line.
pub const FRAME_MAGIC: &[u8; 3] = b"Ada";

/// Magic word of command frames.
pub const COMMAND_MAGIC: &[u8; 3] = b"Adb";

const FRAME_MAGIC_STR: &str = "Ada";
const COMMAND_MAGIC_STR: &str = "Adb";

/// True if the line is a device announce (first three characters are `Ada`).
pub fn is_announce(line: &str) -> bool {
    line.as_bytes().starts_with(FRAME_MAGIC)
}

/// Remove every occurrence of either magic word.
pub fn strip_magic(line: &str) -> String {
    line.replace(FRAME_MAGIC_STR, "")
        .replace(COMMAND_MAGIC_STR, "")
}

/// Filter applied to every line the device emits.
///
/// Lines carrying neither magic word are noise and yield `None`; the rest come
/// back with the magic words removed and surrounding whitespace trimmed.
pub fn clean_line(line: &str) -> Option<String> {
    if !line.contains(FRAME_MAGIC_STR) && !line.contains(COMMAND_MAGIC_STR) {
        return None;
    }
    let cleaned = strip_magic(line).trim().to_string();
    // A bare announce or heartbeat has nothing left and is not an answer
    (!cleaned.is_empty()).then_some(cleaned)
}
