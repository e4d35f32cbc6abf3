//! Versioned binary replay format
//!
//! A replay is the recorded control-input stream of one ride: header
//! metadata plus an ordered list of `(tick, control)` frames, one per tick
//! the controls changed. Played back against the same level and parameters,
//! the fixed-step simulation reproduces the ride bit for bit.
//!
//! Layout, little-endian:
//!
//! ```text
//! magic    [u8; 4]   b"RLRP"
//! version  u8        2
//! info     bincode   ReplayInfo { level_id, player, tick_rate, finished, finish_tick }
//! frames   bincode   Vec<InputFrame { tick, control }>
//! ```
//!
//! Earlier versions in the wild used a different body encoding; anything but
//! the current version is rejected outright rather than misparsed.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::input::ControlState;

pub const REPLAY_MAGIC: [u8; 4] = *b"RLRP";
pub const REPLAY_VERSION: u8 = 2;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("not a replay file")]
    BadMagic,
    #[error("unsupported replay format version {0}")]
    UnsupportedVersion(u8),
    #[error("corrupt replay: {0}")]
    Corrupt(#[from] bincode::Error),
    #[error("replay frames are not strictly tick-ascending")]
    UnorderedFrames,
    #[error("replay declares a zero tick rate")]
    ZeroTickRate,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One recorded control change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFrame {
    /// Simulation tick the controls took effect
    pub tick: u32,
    pub control: ControlState,
}

/// Replay metadata, readable without decoding the frame list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayInfo {
    pub level_id: String,
    pub player: String,
    /// Simulation ticks per second the ride was recorded at
    pub tick_rate: u32,
    /// Did the ride reach the finish?
    pub finished: bool,
    /// Tick of the finish, or of the recording's end if unfinished
    pub finish_tick: u32,
}

impl ReplayInfo {
    /// Read header and metadata only, leaving the frames undecoded.
    ///
    /// Cheap enough to run over a whole directory of replays for a listing.
    pub fn probe(reader: &mut impl Read) -> Result<Self, ReplayError> {
        read_header(reader)?;
        let info: ReplayInfo = bincode::deserialize_from(reader)?;
        if info.tick_rate == 0 {
            return Err(ReplayError::ZeroTickRate);
        }
        Ok(info)
    }
}

/// A complete recorded ride
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    pub info: ReplayInfo,
    pub frames: Vec<InputFrame>,
}

impl Replay {
    /// Control state in effect at `tick`: the last frame at or before it.
    ///
    /// Before the first frame the controls are all released.
    pub fn control_at(&self, tick: u32) -> ControlState {
        match self.frames.partition_point(|f| f.tick <= tick) {
            0 => ControlState::new(),
            n => self.frames[n - 1].control,
        }
    }

    pub fn save_to(&self, writer: &mut impl Write) -> Result<(), ReplayError> {
        writer.write_all(&REPLAY_MAGIC)?;
        writer.write_all(&[REPLAY_VERSION])?;
        bincode::serialize_into(&mut *writer, &self.info)?;
        bincode::serialize_into(writer, &self.frames)?;
        Ok(())
    }

    pub fn load_from(reader: &mut impl Read) -> Result<Self, ReplayError> {
        read_header(reader)?;
        let info: ReplayInfo = bincode::deserialize_from(&mut *reader)?;
        if info.tick_rate == 0 {
            return Err(ReplayError::ZeroTickRate);
        }
        let frames: Vec<InputFrame> = bincode::deserialize_from(reader)?;
        if !frames.windows(2).all(|w| w[0].tick < w[1].tick) {
            return Err(ReplayError::UnorderedFrames);
        }
        Ok(Self { info, frames })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ReplayError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.save_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        Self::load_from(&mut BufReader::new(File::open(path)?))
    }
}

fn read_header(reader: &mut impl Read) -> Result<(), ReplayError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != REPLAY_MAGIC {
        return Err(ReplayError::BadMagic);
    }
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != REPLAY_VERSION {
        return Err(ReplayError::UnsupportedVersion(version[0]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_replay() -> Replay {
        let mut drive = ControlState::new();
        drive.set(ControlState::DRIVE, true);
        let mut drive_pull = drive;
        drive_pull.set(ControlState::PULL, true);
        Replay {
            info: ReplayInfo {
                level_id: "hills-03".into(),
                player: "rider".into(),
                tick_rate: 100,
                finished: true,
                finish_tick: 4321,
            },
            frames: vec![
                InputFrame {
                    tick: 0,
                    control: drive,
                },
                InputFrame {
                    tick: 150,
                    control: drive_pull,
                },
                InputFrame {
                    tick: 200,
                    control: ControlState::new(),
                },
            ],
        }
    }

    fn to_bytes(replay: &Replay) -> Vec<u8> {
        let mut buf = Vec::new();
        replay.save_to(&mut buf).expect("replay serializes");
        buf
    }

    #[test]
    fn test_round_trip_preserves_everything() {
        let replay = sample_replay();
        let bytes = to_bytes(&replay);
        let back = Replay::load_from(&mut Cursor::new(&bytes)).expect("replay parses");
        assert_eq!(back, replay);
    }

    #[test]
    fn test_probe_reads_metadata_only() {
        let replay = sample_replay();
        let bytes = to_bytes(&replay);
        let info = ReplayInfo::probe(&mut Cursor::new(&bytes)).expect("probe succeeds");
        assert_eq!(info, replay.info);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = to_bytes(&sample_replay());
        bytes[0] = b'X';
        let err = Replay::load_from(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, ReplayError::BadMagic));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut bytes = to_bytes(&sample_replay());
        bytes[4] = 1;
        let err = Replay::load_from(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, ReplayError::UnsupportedVersion(1)));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let bytes = to_bytes(&sample_replay());
        for cut in [0, 3, 5, 12, bytes.len() - 1] {
            let err = Replay::load_from(&mut Cursor::new(&bytes[..cut])).unwrap_err();
            assert!(
                matches!(err, ReplayError::Io(_) | ReplayError::Corrupt(_)),
                "cut at {cut} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_unordered_frames_rejected() {
        let mut replay = sample_replay();
        replay.frames.swap(0, 2);
        let bytes = to_bytes(&replay);
        let err = Replay::load_from(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, ReplayError::UnorderedFrames));
    }

    #[test]
    fn test_control_at_holds_last_frame() {
        let replay = sample_replay();
        assert!(replay.control_at(0).drive());
        assert!(replay.control_at(149).drive());
        assert!(!replay.control_at(149).is_pressed(ControlState::PULL));
        assert!(replay.control_at(150).is_pressed(ControlState::PULL));
        assert_eq!(replay.control_at(5000), ControlState::new());
    }

    #[test]
    fn test_control_before_first_frame_is_released() {
        let mut replay = sample_replay();
        replay.frames[0].tick = 10;
        assert_eq!(replay.control_at(5), ControlState::new());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = std::env::temp_dir().join("ridgeline-replay-test");
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("ride.rpl");
        let replay = sample_replay();
        replay.save(&path).expect("save succeeds");
        let back = Replay::load(&path).expect("load succeeds");
        assert_eq!(back, replay);
        std::fs::remove_file(&path).ok();
    }
}
