//! PNG → JPEG re-encoding.
//!
//! Transcoding never fails a request. Every failure mode degrades to
//! returning the input untouched, and the [`TranscodeOutcome`] says which
//! path was taken.

use bytes::Bytes;

/// Leading bytes of every PNG stream.
pub const PNG_SIGNATURE: [u8; 8] = *b"\x89PNG\r\n\x1a\n";

/// Upper bound on decoder allocations.
pub const DEFAULT_MAX_DECODE_BYTES: u64 = 512 * 1024 * 1024;

const MIME_PNG: &str = "image/png";
const MIME_JPEG: &str = "image/jpeg";

/// Whether a file should be treated as PNG: either its name or its
/// signature says so.
pub fn is_png(filename: &str, data: &[u8]) -> bool {
    filename.to_ascii_lowercase().ends_with(".png") || data.starts_with(&PNG_SIGNATURE)
}

/// Content type for a file sent without transcoding.
pub fn mime_for(filename: &str, data: &[u8]) -> &'static str {
    if data.starts_with(&PNG_SIGNATURE) {
        return MIME_PNG;
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return MIME_JPEG;
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return "image/gif";
    }
    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return "image/webp";
    }

    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => MIME_PNG,
        "jpg" | "jpeg" => MIME_JPEG,
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// How a transcode attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutcome {
    /// A new JPEG was produced.
    Converted,
    /// Decoding or encoding failed; the input was passed through.
    Failed(String),
    /// No JPEG codec in this build; the input was passed through.
    CodecUnavailable,
}

#[derive(Debug, Clone)]
pub struct Transcoded {
    pub bytes: Bytes,
    pub mime: &'static str,
    pub outcome: TranscodeOutcome,
}

impl Transcoded {
    fn passthrough(bytes: Bytes, outcome: TranscodeOutcome) -> Self {
        Self {
            bytes,
            mime: MIME_PNG,
            outcome,
        }
    }

    pub fn is_converted(&self) -> bool {
        self.outcome == TranscodeOutcome::Converted
    }
}

/// Re-encodes PNG data as JPEG, flattening transparency onto white.
#[derive(Debug, Clone, Copy)]
pub struct ImageTranscoder {
    max_decode_bytes: u64,
}

impl Default for ImageTranscoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DECODE_BYTES)
    }
}

impl ImageTranscoder {
    pub fn new(max_decode_bytes: u64) -> Self {
        Self { max_decode_bytes }
    }

    pub fn codec_available() -> bool {
        cfg!(feature = "jpeg")
    }

    /// Transcode on the calling thread. CPU-bound; see [`Self::transcode_async`].
    pub fn transcode(&self, data: &Bytes, quality: u8) -> Transcoded {
        #[cfg(feature = "jpeg")]
        {
            match jpeg::encode(data, quality.clamp(1, 100), self.max_decode_bytes) {
                Ok(encoded) => Transcoded {
                    bytes: Bytes::from(encoded),
                    mime: MIME_JPEG,
                    outcome: TranscodeOutcome::Converted,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "JPEG compression failed, sending original");
                    Transcoded::passthrough(data.clone(), TranscodeOutcome::Failed(e.to_string()))
                }
            }
        }
        #[cfg(not(feature = "jpeg"))]
        {
            let _ = (quality, self.max_decode_bytes);
            tracing::debug!("JPEG codec not compiled in, sending original");
            Transcoded::passthrough(data.clone(), TranscodeOutcome::CodecUnavailable)
        }
    }

    /// Transcode on the blocking pool and wait for it.
    pub async fn transcode_async(&self, data: Bytes, quality: u8) -> Transcoded {
        let transcoder = *self;
        let input = data.clone();
        match tokio::task::spawn_blocking(move || transcoder.transcode(&input, quality)).await {
            Ok(transcoded) => transcoded,
            Err(e) => {
                tracing::error!(error = %e, "Transcode task did not complete");
                Transcoded::passthrough(data, TranscodeOutcome::Failed(e.to_string()))
            }
        }
    }
}

#[cfg(feature = "jpeg")]
mod jpeg {
    use image::codecs::jpeg::JpegEncoder;
    use image::{DynamicImage, ImageReader, ImageResult, Limits, Rgb, RgbImage};
    use std::io::Cursor;

    pub(super) fn encode(data: &[u8], quality: u8, max_alloc: u64) -> ImageResult<Vec<u8>> {
        let mut reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
        let mut limits = Limits::default();
        limits.max_alloc = Some(max_alloc);
        reader.limits(limits);

        let rgb = flatten(reader.decode()?);

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb)?;
        Ok(out)
    }

    /// Drop to three channels. Anything with alpha (palette images with a
    /// transparency chunk decode as RGBA) is composited over opaque white.
    pub(super) fn flatten(img: DynamicImage) -> RgbImage {
        if !img.color().has_alpha() {
            return img.into_rgb8();
        }
        let rgba = img.into_rgba8();
        let (width, height) = rgba.dimensions();
        let mut out = RgbImage::new(width, height);
        for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
            let [r, g, b, a] = src.0;
            let alpha = u16::from(a);
            let over_white =
                |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
            *dst = Rgb([over_white(r), over_white(g), over_white(b)]);
        }
        out
    }
}
