//! Output rendering: channel mapping, forced channel and gain
//!
//! Drivers that write PCM themselves (ALSA, OSS) call [`render`] to turn a
//! decoded sample into the layout their device expects.

use crate::audio::types::{ChannelPosition, DecodedSample};

/// Convert a decibel adjustment into a linear amplitude factor
pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Per-voice output parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    /// Output channel count
    pub channels: u16,
    /// Linear gain
    pub gain: f32,
    pub force_channel: Option<ChannelPosition>,
}

/// Produce interleaved output samples for a device with `params.channels`
pub fn render(sample: &DecodedSample, params: RenderParams) -> Vec<f32> {
    let out = params.channels.max(1) as usize;
    let src = sample.channels.max(1) as usize;
    let frames = sample.frames();
    let mut output = vec![0.0f32; frames * out];

    if let Some(position) = params.force_channel {
        let mono = sample.to_mono();
        match position.device_index(params.channels) {
            Some(index) => {
                for (frame, value) in mono.iter().enumerate() {
                    output[frame * out + index] = *value;
                }
            }
            None => {
                for (frame, value) in mono.iter().enumerate() {
                    output[frame * out..(frame + 1) * out].fill(*value);
                }
            }
        }
    } else if src == out {
        output.copy_from_slice(&sample.samples[..frames * out]);
    } else if src == 1 {
        for (frame, value) in sample.samples.iter().take(frames).enumerate() {
            output[frame * out..(frame + 1) * out].fill(*value);
        }
    } else if out == 1 {
        output = sample.to_mono();
    } else {
        let shared = src.min(out);
        for frame in 0..frames {
            output[frame * out..frame * out + shared]
                .copy_from_slice(&sample.samples[frame * src..frame * src + shared]);
        }
    }

    if (params.gain - 1.0).abs() > f32::EPSILON {
        for value in output.iter_mut() {
            *value = (*value * params.gain).clamp(-1.0, 1.0);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo() -> DecodedSample {
        DecodedSample::new("/tmp/t.wav", vec![0.2, 0.4, 0.6, 0.8], 8000, 2)
    }

    fn params(channels: u16) -> RenderParams {
        RenderParams {
            channels,
            gain: 1.0,
            force_channel: None,
        }
    }

    #[test]
    fn test_passthrough() {
        assert_eq!(render(&stereo(), params(2)), vec![0.2, 0.4, 0.6, 0.8]);
    }

    #[test]
    fn test_mono_to_stereo() {
        let mono = DecodedSample::new("/tmp/m.wav", vec![0.1, 0.3], 8000, 1);
        assert_eq!(render(&mono, params(2)), vec![0.1, 0.1, 0.3, 0.3]);
    }

    #[test]
    fn test_force_right_channel() {
        let p = RenderParams {
            force_channel: Some(ChannelPosition::FrontRight),
            ..params(2)
        };
        let out = render(&stereo(), p);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 0.3).abs() < 1e-6);
        assert_eq!(out[2], 0.0);
        assert!((out[3] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_gain_applied() {
        let p = RenderParams {
            gain: db_to_linear(-6.0206),
            ..params(2)
        };
        let out = render(&stereo(), p);
        assert!((out[3] - 0.4).abs() < 1e-3);
    }

    #[test]
    fn test_db_to_linear() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(20.0) - 10.0).abs() < 1e-4);
    }
}
