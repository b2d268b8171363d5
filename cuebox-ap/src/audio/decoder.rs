//! Audio decoder using symphonia
//!
//! Opens a file, selects the first decodable audio track and yields interleaved
//! f32 samples one packet at a time. The channel layout of the file is kept as
//! is; no up- or down-mixing happens here.
//!
//! # Error classification
//!
//! - Missing file: `Error::NotFound`
//! - No container reader, no codec, unknown rate or layout: `Error::UnsupportedFormat`
//! - Container opens but packets fail to read or decode: `Error::CorruptData`

use crate::error::{Error, Result};
use cuebox_common::WaveFormat;
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace};

/// Packet-by-packet decoder for one audio file.
pub struct AudioDecoder {
    path: PathBuf,

    /// Symphonia format reader
    format: Box<dyn FormatReader>,

    /// Symphonia decoder
    decoder: Box<dyn Decoder>,

    /// Track being decoded
    track_id: u32,

    /// Native rate and channel count of the track
    source_format: WaveFormat,

    /// Track length in frames, when the container reports it
    total_frames: Option<u64>,

    /// Conversion buffer, grown to the largest packet seen
    sample_buf: Option<SampleBuffer<f32>>,
}

impl AudioDecoder {
    /// Open a file and prepare its first audio track for decoding.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| unsupported(path, format!("failed to probe format: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| unsupported(path, "no audio track found"))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| unsupported(path, "sample rate not found"))?;

        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| unsupported(path, "channel layout not found"))?;

        let source_format = WaveFormat::new(sample_rate, channels)
            .map_err(|e| unsupported(path, e.to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| unsupported(path, format!("failed to create decoder: {}", e)))?;

        debug!(
            "Opened {}: {} ({} frames)",
            path.display(),
            source_format,
            codec_params
                .n_frames
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            decoder,
            track_id,
            source_format,
            total_frames: codec_params.n_frames,
            sample_buf: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source_format(&self) -> WaveFormat {
        self.source_format
    }

    pub fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    /// Decode the next packet of the selected track and append its samples to `out`.
    ///
    /// Returns the number of samples appended, or `None` at end of stream.
    pub fn decode_next(&mut self, out: &mut Vec<f32>) -> Result<Option<usize>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    trace!("Reached end of {}", self.path.display());
                    return Ok(None);
                }
                // A new track chain starts; everything before it has been played
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => {
                    return Err(corrupt(&self.path, format!("failed to read packet: {}", e)));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(e) => {
                    return Err(corrupt(&self.path, format!("failed to decode packet: {}", e)));
                }
            };

            if decoded.frames() == 0 {
                continue;
            }

            // SampleBuffer capacity counts samples, AudioBufferRef capacity counts frames
            let required = decoded.capacity() * decoded.spec().channels.count();
            let needs_new_buf = self
                .sample_buf
                .as_ref()
                .map_or(true, |buf| buf.capacity() < required);
            if needs_new_buf {
                self.sample_buf = Some(SampleBuffer::<f32>::new(
                    decoded.capacity() as u64,
                    *decoded.spec(),
                ));
            }

            if let Some(buf) = self.sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                out.extend_from_slice(buf.samples());
                return Ok(Some(buf.samples().len()));
            }
        }
    }
}

fn unsupported(path: &Path, reason: impl Into<String>) -> Error {
    Error::UnsupportedFormat {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> Error {
    Error::CorruptData {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}
