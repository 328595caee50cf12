//! Raster re-encoding: decode → composite onto a surface → encode.
//!
//! Every decoded image is first composited onto an RGBA8 surface of its
//! natural size, so encoders always see the same pixel layout whatever the
//! source depth. Formats without an alpha channel (JPEG) get an opaque white
//! surface instead: transparent regions come out white, never black.

use crate::error::ConvertError;
use crate::output::Artifact;
use crate::request::InputFile;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use std::io::Cursor;
use tracing::{debug, warn};

/// Encoders available for re-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Png,
    Jpeg,
    WebP,
    Bmp,
    Gif,
}

impl TargetFormat {
    /// Map an output extension to an encoder. Unknown targets encode as PNG.
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "jpg" | "jpeg" => TargetFormat::Jpeg,
            "webp" => TargetFormat::WebP,
            "bmp" => TargetFormat::Bmp,
            "gif" => TargetFormat::Gif,
            "png" => TargetFormat::Png,
            other => {
                warn!("No encoder for '{other}', falling back to PNG");
                TargetFormat::Png
            }
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            TargetFormat::Png => "image/png",
            TargetFormat::Jpeg => "image/jpeg",
            TargetFormat::WebP => "image/webp",
            TargetFormat::Bmp => "image/bmp",
            TargetFormat::Gif => "image/gif",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            TargetFormat::Png => ImageFormat::Png,
            TargetFormat::Jpeg => ImageFormat::Jpeg,
            TargetFormat::WebP => ImageFormat::WebP,
            TargetFormat::Bmp => ImageFormat::Bmp,
            TargetFormat::Gif => ImageFormat::Gif,
        }
    }

    /// Whether the encoded result cannot carry transparency.
    pub fn is_opaque(self) -> bool {
        matches!(self, TargetFormat::Jpeg)
    }
}

/// Decode any supported raster format.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ConvertError> {
    image::load_from_memory(bytes).map_err(ConvertError::decode)
}

/// Composite onto opaque white, dropping the alpha channel.
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut out = RgbImage::from_pixel(rgba.width(), rgba.height(), Rgb([255, 255, 255]));
    for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
        let a = src[3] as u32;
        for c in 0..3 {
            // src * a + white * (1 - a), in 0..=255 fixed point
            dst[c] = ((src[c] as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        }
    }
    out
}

/// Encode a bitmap into `format`.
pub fn encode(img: &DynamicImage, format: TargetFormat, jpeg_quality: u8) -> Result<Vec<u8>, ConvertError> {
    let mut buf = Vec::new();

    if format.is_opaque() {
        let flat = flatten_onto_white(img);
        JpegEncoder::new_with_quality(&mut buf, jpeg_quality)
            .encode_image(&flat)
            .map_err(ConvertError::encode)?;
    } else {
        let surface: RgbaImage = img.to_rgba8();
        DynamicImage::ImageRgba8(surface)
            .write_to(&mut Cursor::new(&mut buf), format.image_format())
            .map_err(ConvertError::encode)?;
    }

    if buf.is_empty() {
        return Err(ConvertError::encode(format!(
            "{} encoder returned no data",
            format.mime()
        )));
    }
    debug!("Encoded {}x{} → {} bytes {}", img.width(), img.height(), buf.len(), format.mime());
    Ok(buf)
}

/// Re-encode `input` to the format named by `target_ext`.
///
/// The suggested name keeps the requested extension even when the encoder
/// fell back to PNG; the MIME type reports what was actually produced.
pub fn reencode(input: &InputFile, target_ext: &str, jpeg_quality: u8) -> Result<Artifact, ConvertError> {
    let img = decode(&input.bytes)?;
    let format = TargetFormat::from_extension(target_ext);
    let bytes = encode(&img, format, jpeg_quality)?;
    let ext = target_ext.trim_start_matches('.').to_lowercase();
    Ok(Artifact::new(
        format!("{}.{}", input.base_name(), ext),
        format.mime(),
        bytes,
    ))
}

// ── Image → PDF preparation ──────────────────────────────────────────────

/// An image ready to be placed on a PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfImage {
    /// Already JPEG: embedded byte-for-byte.
    Jpeg {
        data: Vec<u8>,
        width: u32,
        height: u32,
        colour: JpegColour,
    },
    /// Raw 8-bit RGB samples plus an optional alpha mask.
    Pixels {
        width: u32,
        height: u32,
        rgb: Vec<u8>,
        alpha: Option<Vec<u8>>,
    },
}

impl PdfImage {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            PdfImage::Jpeg { width, height, .. } | PdfImage::Pixels { width, height, .. } => {
                (*width, *height)
            }
        }
    }
}

/// Colour layout of a JPEG frame, as the PDF image dictionary needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegColour {
    Gray,
    Rgb,
    /// `inverted` is set for Adobe-tagged CMYK, whose samples are stored inverted.
    Cmyk { inverted: bool },
}

impl JpegColour {
    pub fn colour_space(self) -> &'static str {
        match self {
            JpegColour::Gray => "DeviceGray",
            JpegColour::Rgb => "DeviceRGB",
            JpegColour::Cmyk { .. } => "DeviceCMYK",
        }
    }
}

/// Frame header facts read straight from the JPEG marker segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JpegFrame {
    width: u32,
    height: u32,
    components: u8,
    adobe: bool,
}

/// Walk the marker segments up to the first start-of-frame.
fn jpeg_frame(bytes: &[u8]) -> Option<JpegFrame> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut adobe = false;
    let mut i = 2;
    loop {
        if *bytes.get(i)? != 0xFF {
            return None;
        }
        while *bytes.get(i)? == 0xFF {
            i += 1;
        }
        let marker = *bytes.get(i)?;
        i += 1;
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            continue;
        }
        if marker == 0xD9 || marker == 0xDA {
            return None;
        }
        let len = u16::from_be_bytes([*bytes.get(i)?, *bytes.get(i + 1)?]) as usize;
        let segment = bytes.get(i + 2..i + len)?;
        match marker {
            0xEE if segment.starts_with(b"Adobe") => adobe = true,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                return Some(JpegFrame {
                    height: u16::from_be_bytes([*segment.get(1)?, *segment.get(2)?]) as u32,
                    width: u16::from_be_bytes([*segment.get(3)?, *segment.get(4)?]) as u32,
                    components: *segment.get(5)?,
                    adobe,
                });
            }
            _ => {}
        }
        i += len;
    }
}

/// Prepare `input` for embedding: JPEG sources pass through, anything else is
/// re-encoded to PNG first and then unpacked into samples.
///
/// A JPEG whose frame header cannot be read, or whose component count has no
/// PDF colour space, goes through the pixel path instead.
pub fn prepare_pdf_image(input: &InputFile) -> Result<PdfImage, ConvertError> {
    if matches!(image::guess_format(&input.bytes), Ok(ImageFormat::Jpeg)) {
        let frame = jpeg_frame(&input.bytes);
        let colour = frame.and_then(|f| match f.components {
            1 => Some(JpegColour::Gray),
            3 => Some(JpegColour::Rgb),
            4 => Some(JpegColour::Cmyk { inverted: f.adobe }),
            _ => None,
        });
        if let (Some(frame), Some(colour)) = (frame, colour) {
            debug!(
                "Embedding JPEG {} directly ({}x{}, {})",
                input.name,
                frame.width,
                frame.height,
                colour.colour_space()
            );
            return Ok(PdfImage::Jpeg {
                data: input.bytes.clone(),
                width: frame.width,
                height: frame.height,
                colour,
            });
        }
        warn!("JPEG {} has an unusual frame layout; embedding decoded pixels", input.name);
    }

    let png = reencode(input, "png", 100)?;
    let rgba = decode(&png.bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for px in rgba.pixels() {
        rgb.extend_from_slice(&px.0[..3]);
        alpha.push(px[3]);
    }
    let alpha = alpha.iter().any(|&a| a < 255).then_some(alpha);

    Ok(PdfImage::Pixels {
        width,
        height,
        rgb,
        alpha,
    })
}
