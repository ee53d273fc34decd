use super::{strip_magic, COMMAND_MAGIC};

/// Command frames are always this long.
pub const COMMAND_LEN: usize = 6;

/// Commands understood by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Set global brightness.
    SetBrightness(u8),
    /// Ask the device to report its state line.
    QueryState,
}

impl Command {
    /// Two-character sub-command code.
    pub fn code(&self) -> &'static [u8; 2] {
        match self {
            Command::SetBrightness(_) => b"BR",
            Command::QueryState => b"ST",
        }
    }

    fn payload(&self) -> u8 {
        match self {
            Command::SetBrightness(value) => *value,
            Command::QueryState => 0,
        }
    }

    /// True if the device answers this command with a line.
    pub fn expects_reply(&self) -> bool {
        matches!(self, Command::QueryState)
    }
}

/// Encode a command into its fixed 6-byte frame.
pub fn encode_command(command: Command) -> [u8; COMMAND_LEN] {
    let code = command.code();
    [
        COMMAND_MAGIC[0],
        COMMAND_MAGIC[1],
        COMMAND_MAGIC[2],
        code[0],
        code[1],
        command.payload(),
    ]
}

/// Device state as reported by a state-query reply.
///
/// Zero means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState {
    pub led_count: usize,
    pub brightness: u8,
}

/// Decode a `key=value;key=value` state line on top of `prior`.
///
/// `N` carries the LED count and `B` the brightness; other keys are ignored.
/// A line without an `N=` token holds no state and returns `prior` as is.
/// Fields that are missing or fail to parse keep their prior value.
pub fn decode_state_line(line: &str, prior: DeviceState) -> DeviceState {
    let line = strip_magic(line);
    if !line.contains("N=") {
        return prior;
    }

    let mut state = prior;
    for pair in line.split(';') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "N" => {
                if let Ok(n) = value.parse() {
                    state.led_count = n;
                }
            }
            "B" => {
                if let Ok(b) = value.parse() {
                    state.brightness = b;
                }
            }
            _ => {}
        }
    }
    state
}
