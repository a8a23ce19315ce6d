//! Decoder for the vehicle's binary navdata frames.
//!
//! Layout, all little-endian:
//!
//! ```text
//! u32 magic (0x55667788) | u32 state | u32 sequence | u32 vision flag
//! options: { u16 tag | u16 size (including this 4-byte header) | payload }*
//! ```
//!
//! Tag 0 carries the demo block with attitude in millidegrees; tag 0xFFFF
//! closes the frame with a byte-sum checksum of everything before it.

use bytes::Buf;

pub const NAVDATA_MAGIC: u32 = 0x5566_7788;
pub const TAG_DEMO: u16 = 0;
pub const TAG_CHECKSUM: u16 = 0xFFFF;

const HEADER_LEN: usize = 16;
const OPTION_HEADER_LEN: usize = 4;
/// ctrl_state, battery, theta, phi, psi, altitude
const DEMO_MIN_LEN: usize = 24;

/// Vehicle state bitmask from the navdata header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags(pub u32);

impl StatusFlags {
    pub const FLYING: u32 = 1 << 0;
    pub const COMMAND_ACK: u32 = 1 << 6;
    pub const NAVDATA_DEMO: u32 = 1 << 10;
    pub const NAVDATA_BOOTSTRAP: u32 = 1 << 11;
    pub const BATTERY_LOW: u32 = 1 << 15;
    pub const COM_WATCHDOG: u32 = 1 << 30;
    pub const EMERGENCY: u32 = 1 << 31;

    pub fn contains(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn flying(self) -> bool {
        self.contains(Self::FLYING)
    }

    pub fn battery_low(self) -> bool {
        self.contains(Self::BATTERY_LOW)
    }

    pub fn emergency(self) -> bool {
        self.contains(Self::EMERGENCY)
    }

    pub fn watchdog_tripped(self) -> bool {
        self.contains(Self::COM_WATCHDOG)
    }
}

/// One decoded telemetry frame. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub status: StatusFlags,
    pub sequence: u32,
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    pub battery_pct: u32,
    pub altitude_m: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavdataError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),
    #[error("option tag {tag} declares size {size} but {remaining} bytes remain")]
    BadOptionSize { tag: u16, size: usize, remaining: usize },
    #[error("demo option is {0} bytes, need at least 24")]
    ShortDemo(usize),
    #[error("checksum mismatch: frame says {declared:#x}, computed {computed:#x}")]
    Checksum { declared: u32, computed: u32 },
    #[error("frame carries no demo option")]
    MissingDemo,
}

pub fn decode(frame: &[u8]) -> Result<Telemetry, NavdataError> {
    if frame.len() < HEADER_LEN {
        return Err(NavdataError::TooShort(frame.len()));
    }
    let mut buf = frame;
    let magic = buf.get_u32_le();
    if magic != NAVDATA_MAGIC {
        return Err(NavdataError::BadMagic(magic));
    }
    let status = StatusFlags(buf.get_u32_le());
    let sequence = buf.get_u32_le();
    let _vision = buf.get_u32_le();

    let mut demo = None;
    while buf.remaining() >= OPTION_HEADER_LEN {
        let offset = frame.len() - buf.remaining();
        let tag = buf.get_u16_le();
        let size = buf.get_u16_le() as usize;
        if size < OPTION_HEADER_LEN || size - OPTION_HEADER_LEN > buf.remaining() {
            return Err(NavdataError::BadOptionSize { tag, size, remaining: buf.remaining() });
        }
        let (mut payload, rest) = buf.split_at(size - OPTION_HEADER_LEN);
        buf = rest;

        match tag {
            TAG_DEMO => demo = Some(decode_demo(&mut payload)?),
            TAG_CHECKSUM => {
                if payload.remaining() >= 4 {
                    let declared = payload.get_u32_le();
                    let computed = checksum(&frame[..offset]);
                    if declared != computed {
                        return Err(NavdataError::Checksum { declared, computed });
                    }
                }
                break;
            }
            _ => {}
        }
    }

    let (pitch, roll, yaw, battery_pct, altitude_m) = demo.ok_or(NavdataError::MissingDemo)?;
    Ok(Telemetry { status, sequence, pitch, roll, yaw, battery_pct, altitude_m })
}

fn decode_demo(payload: &mut &[u8]) -> Result<(f32, f32, f32, u32, f32), NavdataError> {
    if payload.remaining() < DEMO_MIN_LEN {
        return Err(NavdataError::ShortDemo(payload.remaining()));
    }
    let _ctrl_state = payload.get_u32_le();
    let battery = payload.get_u32_le();
    let theta = payload.get_f32_le();
    let phi = payload.get_f32_le();
    let psi = payload.get_f32_le();
    let altitude_mm = payload.get_i32_le();
    Ok((theta / 1000.0, phi / 1000.0, psi / 1000.0, battery, altitude_mm as f32 / 1000.0))
}

/// Byte sum used by the checksum option.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| acc.wrapping_add(*b as u32))
}

/// Builders for synthetic frames, shared by the tests in this crate and downstream.
pub mod testing {
    use super::*;

    pub struct FrameBuilder {
        bytes: Vec<u8>,
    }

    impl FrameBuilder {
        pub fn new(state: u32, sequence: u32) -> Self {
            let mut bytes = Vec::with_capacity(64);
            bytes.extend_from_slice(&NAVDATA_MAGIC.to_le_bytes());
            bytes.extend_from_slice(&state.to_le_bytes());
            bytes.extend_from_slice(&sequence.to_le_bytes());
            bytes.extend_from_slice(&0u32.to_le_bytes());
            Self { bytes }
        }

        /// Demo block; attitude given in degrees.
        pub fn demo(self, pitch: f32, roll: f32, yaw: f32, battery: u32, altitude_mm: i32) -> Self {
            let mut p = Vec::with_capacity(36);
            p.extend_from_slice(&0u32.to_le_bytes());
            p.extend_from_slice(&battery.to_le_bytes());
            p.extend_from_slice(&(pitch * 1000.0).to_le_bytes());
            p.extend_from_slice(&(roll * 1000.0).to_le_bytes());
            p.extend_from_slice(&(yaw * 1000.0).to_le_bytes());
            p.extend_from_slice(&altitude_mm.to_le_bytes());
            for _ in 0..3 {
                p.extend_from_slice(&0f32.to_le_bytes());
            }
            self.option(TAG_DEMO, &p)
        }

        pub fn option(mut self, tag: u16, payload: &[u8]) -> Self {
            self.bytes.extend_from_slice(&tag.to_le_bytes());
            self.bytes.extend_from_slice(&((payload.len() + OPTION_HEADER_LEN) as u16).to_le_bytes());
            self.bytes.extend_from_slice(payload);
            self
        }

        pub fn finish(self) -> Vec<u8> {
            let sum = checksum(&self.bytes);
            self.option(TAG_CHECKSUM, &sum.to_le_bytes()).bytes
        }

        pub fn finish_without_checksum(self) -> Vec<u8> {
            self.bytes
        }
    }
}
