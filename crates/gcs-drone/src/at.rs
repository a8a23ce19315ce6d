//! AT command frames for the vehicle command port.
//!
//! Every frame is `AT*<OP>=<seq>,<params>\r`. Speeds inside `PCMD` are sent as
//! the bit pattern of an IEEE-754 `f32` reinterpreted as a signed 32-bit
//! integer, so `-1.0` goes on the wire as `-1082130432`.

use gcs_proto::Maneuver;
use serde::Deserialize;

/// `AT*REF` argument for take-off (bit 9 set over the mandatory base bits).
pub const REF_TAKEOFF: u32 = 290_718_208;
/// `AT*REF` argument for landing.
pub const REF_LAND: u32 = 290_717_696;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommand {
    Maneuver(Maneuver),
    /// Leave bootstrap mode and stream reduced (demo) navdata.
    NavdataDemo,
    /// Acknowledge the control/config exchange so navdata starts.
    CtrlAck,
    /// Flat trim: calibrate the sensors, vehicle must be on level ground.
    FlatTrim,
    /// Reset the communication watchdog.
    Watchdog,
}

impl From<Maneuver> for AtCommand {
    fn from(m: Maneuver) -> Self {
        AtCommand::Maneuver(m)
    }
}

/// Magnitudes used for progressive commands, each in `0.0..=1.0` of the
/// vehicle's configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Speeds {
    pub translate: f32,
    pub vertical: f32,
    pub yaw: f32,
}

impl Default for Speeds {
    fn default() -> Self {
        Self { translate: 1.0, vertical: 1.0, yaw: 1.0 }
    }
}

/// Reinterprets an `f32` as the signed integer the protocol carries.
pub fn float_arg(v: f32) -> i32 {
    v.to_bits() as i32
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AtCodec {
    speeds: Speeds,
}

impl AtCodec {
    pub fn new(speeds: Speeds) -> Self {
        Self { speeds }
    }

    pub fn speeds(&self) -> Speeds {
        self.speeds
    }

    pub fn encode(&self, cmd: AtCommand, seq: u32) -> String {
        match cmd {
            AtCommand::Maneuver(m) => self.encode_maneuver(m, seq),
            AtCommand::NavdataDemo => format!("AT*CONFIG={},\"general:navdata_demo\",\"TRUE\"\r", seq),
            AtCommand::CtrlAck => format!("AT*CTRL={},0\r", seq),
            AtCommand::FlatTrim => format!("AT*FTRIM={},\r", seq),
            AtCommand::Watchdog => format!("AT*COMWDG={}\r", seq),
        }
    }

    fn encode_maneuver(&self, m: Maneuver, seq: u32) -> String {
        let s = self.speeds;
        // (roll, pitch, gaz, yaw); forward is nose-down, i.e. negative pitch
        let axes = match m {
            Maneuver::TakeOff => return format!("AT*REF={},{}\r", seq, REF_TAKEOFF),
            Maneuver::Land => return format!("AT*REF={},{}\r", seq, REF_LAND),
            Maneuver::Hover => return format!("AT*PCMD={},0,0,0,0,0\r", seq),
            Maneuver::MoveUp => (0.0, 0.0, s.vertical, 0.0),
            Maneuver::MoveDown => (0.0, 0.0, -s.vertical, 0.0),
            Maneuver::MoveForward => (0.0, -s.translate, 0.0, 0.0),
            Maneuver::MoveBack => (0.0, s.translate, 0.0, 0.0),
            Maneuver::MoveLeft => (-s.translate, 0.0, 0.0, 0.0),
            Maneuver::MoveRight => (s.translate, 0.0, 0.0, 0.0),
            Maneuver::RotateLeft => (0.0, 0.0, 0.0, -s.yaw),
            Maneuver::RotateRight => (0.0, 0.0, 0.0, s.yaw),
        };
        let (roll, pitch, gaz, yaw) = axes;
        format!(
            "AT*PCMD={},1,{},{},{},{}\r",
            seq,
            float_arg(roll),
            float_arg(pitch),
            float_arg(gaz),
            float_arg(yaw)
        )
    }
}
