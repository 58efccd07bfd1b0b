//! Decoded sample and channel layout types

use chime_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Fully decoded sound, interleaved f32 PCM in the source's native layout
#[derive(Debug, Clone)]
pub struct DecodedSample {
    /// File the sample was decoded from
    pub source: PathBuf,
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedSample {
    pub fn new(source: impl AsRef<Path>, samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Memory held by the PCM data, used for cache accounting
    pub fn byte_size(&self) -> u64 {
        (self.samples.len() * std::mem::size_of::<f32>()) as u64
    }

    /// Average all channels into one
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// Channel positions accepted by `canberra.force_channel`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelPosition {
    Mono,
    FrontLeft,
    FrontRight,
    FrontCenter,
    RearLeft,
    RearRight,
    RearCenter,
    Lfe,
    FrontLeftOfCenter,
    FrontRightOfCenter,
    SideLeft,
    SideRight,
    TopCenter,
    TopFrontLeft,
    TopFrontRight,
    TopFrontCenter,
    TopRearLeft,
    TopRearRight,
    TopRearCenter,
}

impl ChannelPosition {
    pub const ALL: [ChannelPosition; 19] = [
        ChannelPosition::Mono,
        ChannelPosition::FrontLeft,
        ChannelPosition::FrontRight,
        ChannelPosition::FrontCenter,
        ChannelPosition::RearLeft,
        ChannelPosition::RearRight,
        ChannelPosition::RearCenter,
        ChannelPosition::Lfe,
        ChannelPosition::FrontLeftOfCenter,
        ChannelPosition::FrontRightOfCenter,
        ChannelPosition::SideLeft,
        ChannelPosition::SideRight,
        ChannelPosition::TopCenter,
        ChannelPosition::TopFrontLeft,
        ChannelPosition::TopFrontRight,
        ChannelPosition::TopFrontCenter,
        ChannelPosition::TopRearLeft,
        ChannelPosition::TopRearRight,
        ChannelPosition::TopRearCenter,
    ];

    /// Name as used by PulseAudio channel maps
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelPosition::Mono => "mono",
            ChannelPosition::FrontLeft => "front-left",
            ChannelPosition::FrontRight => "front-right",
            ChannelPosition::FrontCenter => "front-center",
            ChannelPosition::RearLeft => "rear-left",
            ChannelPosition::RearRight => "rear-right",
            ChannelPosition::RearCenter => "rear-center",
            ChannelPosition::Lfe => "lfe",
            ChannelPosition::FrontLeftOfCenter => "front-left-of-center",
            ChannelPosition::FrontRightOfCenter => "front-right-of-center",
            ChannelPosition::SideLeft => "side-left",
            ChannelPosition::SideRight => "side-right",
            ChannelPosition::TopCenter => "top-center",
            ChannelPosition::TopFrontLeft => "top-front-left",
            ChannelPosition::TopFrontRight => "top-front-right",
            ChannelPosition::TopFrontCenter => "top-front-center",
            ChannelPosition::TopRearLeft => "top-rear-left",
            ChannelPosition::TopRearRight => "top-rear-right",
            ChannelPosition::TopRearCenter => "top-rear-center",
        }
    }

    /// Interleaved index of this position on a device with `channels` outputs
    ///
    /// Uses the WAVE/ALSA ordering (FL, FR, FC, LFE, RL, RR, SL, SR). Positions
    /// the device lacks fold onto the nearest front speaker; `None` means
    /// "every channel" (mono and centre positions on a stereo device).
    pub fn device_index(self, channels: u16) -> Option<usize> {
        let preferred = match self {
            ChannelPosition::Mono => return None,
            ChannelPosition::FrontLeft | ChannelPosition::TopFrontLeft => 0,
            ChannelPosition::FrontRight | ChannelPosition::TopFrontRight => 1,
            ChannelPosition::FrontCenter
            | ChannelPosition::TopCenter
            | ChannelPosition::TopFrontCenter
            | ChannelPosition::RearCenter
            | ChannelPosition::TopRearCenter => 2,
            ChannelPosition::Lfe => 3,
            ChannelPosition::RearLeft | ChannelPosition::TopRearLeft => 4,
            ChannelPosition::RearRight | ChannelPosition::TopRearRight => 5,
            ChannelPosition::SideLeft | ChannelPosition::FrontLeftOfCenter => 6,
            ChannelPosition::SideRight | ChannelPosition::FrontRightOfCenter => 7,
        };
        if preferred < channels as usize {
            return Some(preferred);
        }
        match preferred {
            0 | 4 | 6 => Some(0),
            1 | 5 | 7 if channels >= 2 => Some(1),
            1 | 5 | 7 => Some(0),
            _ => None,
        }
    }
}

impl FromStr for ChannelPosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ChannelPosition::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown channel position '{}'", s)))
    }
}

impl std::fmt::Display for ChannelPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
