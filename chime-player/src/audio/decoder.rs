//! Sound file decoder using symphonia
//!
//! Event sounds are short, so files are decoded completely into memory and the
//! result is shared through the sample cache.

use crate::audio::types::DecodedSample;
use chime_common::{Error, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Upper bound on decoded PCM size; larger files are rejected with `TooBig`
pub const MAX_DECODED_BYTES: u64 = 64 * 1024 * 1024;

/// Whole-file decoder
pub struct SampleDecoder;

impl SampleDecoder {
    /// Decode an entire sound file to interleaved f32 PCM.
    ///
    /// # Errors
    /// - `NotFound` / `Access` / `Io` when the file cannot be opened
    /// - `Corrupt` for unknown formats, missing audio tracks or files that
    ///   yield no audio at all
    /// - `TooBig` when the decoded PCM exceeds [`MAX_DECODED_BYTES`]
    pub fn decode_file(path: &Path) -> Result<DecodedSample> {
        debug!("Decoding sound file: {}", path.display());

        let file = std::fs::File::open(path).map_err(Error::from)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Corrupt(format!("{}: failed to probe format: {}", path.display(), e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Corrupt(format!("{}: no audio track", path.display())))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Corrupt(format!("{}: unsupported codec: {}", path.display(), e)))?;

        let mut samples: Vec<f32> = Vec::new();
        let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
        let mut channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);
        let mut buffer: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => {
                    warn!("Error reading packet from {}: {}", path.display(), e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    channels = spec.channels.count() as u16;

                    let needed = decoded.capacity() as u64;
                    let too_small = buffer
                        .as_ref()
                        .map_or(true, |b| (b.capacity() as u64) < needed * channels as u64);
                    if too_small {
                        buffer = Some(SampleBuffer::<f32>::new(needed, spec));
                    }
                    if let Some(buf) = buffer.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        samples.extend_from_slice(buf.samples());
                    }

                    if (samples.len() * std::mem::size_of::<f32>()) as u64 > MAX_DECODED_BYTES {
                        return Err(Error::TooBig(format!(
                            "{} decodes to more than {} bytes",
                            path.display(),
                            MAX_DECODED_BYTES
                        )));
                    }
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet in {}: {}", path.display(), e);
                    continue;
                }
                Err(e) => {
                    return Err(Error::Corrupt(format!("{}: decode failed: {}", path.display(), e)));
                }
            }
        }

        if samples.is_empty() || sample_rate == 0 || channels == 0 {
            return Err(Error::Corrupt(format!("{}: no audio decoded", path.display())));
        }

        debug!(
            "Decoded {}: {} frames, {} Hz, {} channels",
            path.display(),
            samples.len() / channels as usize,
            sample_rate,
            channels
        );

        Ok(DecodedSample::new(path, samples, sample_rate, channels))
    }
}
