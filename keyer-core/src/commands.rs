//! Host command table
//!
//! Regular commands are the bytes `0x01..=0x1F`. Admin commands arrive as
//! `0x00` followed by `n` and are stored as `0x20 + n`. Each code maps to one
//! [`CommandSpec`]; the table is built and checked at compile time, so a
//! missing or duplicated code fails the build.

/// Offset added to the second byte of an admin command
pub const ADMIN_BASE: u8 = 0x20;
/// Highest command code, regular or admin
pub const MAX_COMMAND: u8 = 0x2D;
/// Parameter bytes kept per command, the rest are discarded
pub const PARAM_CAPACITY: usize = 16;

const TABLE_LEN: usize = MAX_COMMAND as usize + 1;

/// Every command the host can issue
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Sidetone,
    Speed,
    Weighting,
    PttTiming,
    SpeedRange,
    Pause,
    SpeedQuery,
    Backspace,
    PinConfig,
    ClearBuffer,
    KeyImmediate,
    HighSpeedCw,
    Farnsworth,
    ModeRegister,
    LoadDefaults,
    FirstExtension,
    KeyCompensation,
    PaddleSwitchpoint,
    Null,
    SoftwarePaddle,
    StatusRequest,
    PointerCommand,
    DitDahRatio,
    BufferedPtt,
    BufferedKeyDown,
    BufferedWait,
    MergeLetters,
    BufferedSpeed,
    HighSpeedCwBuffered,
    CancelBufferedSpeed,
    BufferedNop,
    // admin
    Calibrate,
    Reset,
    HostOpen,
    HostClose,
    Echo,
    PaddleA2d,
    SpeedA2d,
    GetValues,
    Reserved,
    GetCalibration,
    Wk1Mode,
    Wk2Mode,
    LoadEeprom,
    SendMessage,
}

/// Table entry: the command and the number of parameter bytes it takes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub code: u8,
    pub params: u16,
    pub command: Command,
}

impl CommandSpec {
    /// Parameter bytes that depend on the first parameter already received
    pub const fn extra_params(&self, first_param: u8) -> u16 {
        match self.command {
            Command::PointerCommand if first_param == 3 => 1,
            _ => 0,
        }
    }
}

const ENTRIES: &[(u8, u16, Command)] = &[
    (0x01, 1, Command::Sidetone),
    (0x02, 1, Command::Speed),
    (0x03, 1, Command::Weighting),
    (0x04, 2, Command::PttTiming),
    (0x05, 3, Command::SpeedRange),
    (0x06, 1, Command::Pause),
    (0x07, 0, Command::SpeedQuery),
    (0x08, 0, Command::Backspace),
    (0x09, 1, Command::PinConfig),
    (0x0A, 0, Command::ClearBuffer),
    (0x0B, 1, Command::KeyImmediate),
    (0x0C, 1, Command::HighSpeedCw),
    (0x0D, 1, Command::Farnsworth),
    (0x0E, 1, Command::ModeRegister),
    (0x0F, 15, Command::LoadDefaults),
    (0x10, 1, Command::FirstExtension),
    (0x11, 1, Command::KeyCompensation),
    (0x12, 1, Command::PaddleSwitchpoint),
    (0x13, 0, Command::Null),
    (0x14, 1, Command::SoftwarePaddle),
    (0x15, 0, Command::StatusRequest),
    (0x16, 1, Command::PointerCommand),
    (0x17, 1, Command::DitDahRatio),
    (0x18, 1, Command::BufferedPtt),
    (0x19, 1, Command::BufferedKeyDown),
    (0x1A, 1, Command::BufferedWait),
    (0x1B, 2, Command::MergeLetters),
    (0x1C, 1, Command::BufferedSpeed),
    (0x1D, 1, Command::HighSpeedCwBuffered),
    (0x1E, 0, Command::CancelBufferedSpeed),
    (0x1F, 0, Command::BufferedNop),
    (0x20, 3, Command::Calibrate),
    (0x21, 0, Command::Reset),
    (0x22, 0, Command::HostOpen),
    (0x23, 0, Command::HostClose),
    (0x24, 1, Command::Echo),
    (0x25, 0, Command::PaddleA2d),
    (0x26, 0, Command::SpeedA2d),
    (0x27, 0, Command::GetValues),
    (0x28, 0, Command::Reserved),
    (0x29, 0, Command::GetCalibration),
    (0x2A, 0, Command::Wk1Mode),
    (0x2B, 0, Command::Wk2Mode),
    (0x2C, 256, Command::LoadEeprom),
    (0x2D, 1, Command::SendMessage),
];

const fn build_table() -> [Option<CommandSpec>; TABLE_LEN] {
    let mut table: [Option<CommandSpec>; TABLE_LEN] = [None; TABLE_LEN];
    let mut i = 0;
    while i < ENTRIES.len() {
        let (code, params, command) = ENTRIES[i];
        let slot = code as usize;
        if slot == 0 || slot >= TABLE_LEN {
            panic!("command code out of range");
        }
        if table[slot].is_some() {
            panic!("duplicate command code");
        }
        table[slot] = Some(CommandSpec { code, params, command });
        i += 1;
    }

    let mut slot = 1;
    while slot < TABLE_LEN {
        if table[slot].is_none() {
            panic!("missing command code");
        }
        slot += 1;
    }
    table
}

static COMMAND_TABLE: [Option<CommandSpec>; TABLE_LEN] = build_table();

/// Look up a command code; `None` for `0x00` and codes above [`MAX_COMMAND`]
pub fn lookup(code: u8) -> Option<CommandSpec> {
    COMMAND_TABLE.get(code as usize).copied().flatten()
}
