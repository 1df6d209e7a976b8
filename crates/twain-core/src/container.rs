//! Minimal TIFF container for memory-transfer pages.
//!
//! Memory transfer delivers raw, uncompressed rows. Each row may carry
//! alignment padding past the last pixel; it is stripped before the rows
//! are written after a fixed little-endian TIFF header and a single image
//! file directory.
//!
//! Layout:
//! ```text
//! 0    "II" 42 <ifd offset = 8>
//! 8    IFD: entry count, 14 x 12-byte entries, next IFD = 0
//! 182  BitsPerSample (RGB only, 3 x u16)
//! ...  XResolution, YResolution (rationals)
//! ...  pixel data, one strip
//! ```

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{Result, TwainError};
use crate::protocol::Fix32;

const TIFF_MAGIC: u16 = 42;
const HEADER_SIZE: usize = 8;
const ENTRY_COUNT: usize = 14;
const IFD_SIZE: usize = 2 + ENTRY_COUNT * 12 + 4;

const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

const TAG_NEW_SUBFILE_TYPE: u16 = 254;
const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_X_RESOLUTION: u16 = 282;
const TAG_Y_RESOLUTION: u16 = 283;
const TAG_PLANAR_CONFIGURATION: u16 = 284;
const TAG_RESOLUTION_UNIT: u16 = 296;

const COMPRESSION_NONE: u16 = 1;
const PHOTOMETRIC_BLACK_IS_ZERO: u16 = 1;
const PHOTOMETRIC_RGB: u16 = 2;
const PLANAR_CHUNKY: u16 = 1;
const RESOLUTION_UNIT_INCH: u16 = 2;

/// Resolution written when the source reported none.
const FALLBACK_DPI: f32 = 72.0;

/// Raw rows from a memory transfer.
#[derive(Debug, Clone, Copy)]
pub struct RawRaster<'a> {
    pub columns: u32,
    pub rows: u32,
    pub bits_per_pixel: u16,
    /// Row stride as reported by the source, padding included. 0 means
    /// unpadded.
    pub bytes_per_row: u32,
    pub x_resolution: Fix32,
    pub y_resolution: Fix32,
    pub data: &'a [u8],
}

/// Sample layout of a supported depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SampleFormat {
    samples: u16,
    bits: u16,
    photometric: u16,
}

impl SampleFormat {
    fn for_depth(bits_per_pixel: u16) -> Result<Self> {
        match bits_per_pixel {
            24 => Ok(Self {
                samples: 3,
                bits: 8,
                photometric: PHOTOMETRIC_RGB,
            }),
            8 | 16 => Ok(Self {
                samples: 1,
                bits: bits_per_pixel,
                photometric: PHOTOMETRIC_BLACK_IS_ZERO,
            }),
            other => Err(TwainError::UnsupportedPixelFormat(other)),
        }
    }
}

/// Copy `rows` rows of `row_bytes` meaningful bytes out of `data`, skipping
/// whatever follows each row up to `stride`.
pub fn strip_row_padding(data: &[u8], rows: usize, stride: usize, row_bytes: usize) -> Result<Vec<u8>> {
    if stride < row_bytes {
        return Err(TwainError::InvalidBitmap(format!(
            "row stride {stride} shorter than {row_bytes} pixel bytes"
        )));
    }
    if rows == 0 || row_bytes == 0 {
        return Ok(Vec::new());
    }

    let needed = (rows - 1) * stride + row_bytes;
    if data.len() < needed {
        return Err(TwainError::TruncatedImageData {
            needed,
            actual: data.len(),
        });
    }

    if stride == row_bytes {
        return Ok(data[..needed].to_vec());
    }
    let mut out = Vec::with_capacity(rows * row_bytes);
    for row in data.chunks(stride).take(rows) {
        out.extend_from_slice(&row[..row_bytes]);
    }
    Ok(out)
}

/// Build a single-strip uncompressed TIFF from raw rows.
///
/// 24-bit data becomes RGB, 8 and 16-bit data greyscale; other depths fail
/// with [`TwainError::UnsupportedPixelFormat`].
pub fn encode_tiff(raster: &RawRaster<'_>) -> Result<Vec<u8>> {
    let format = SampleFormat::for_depth(raster.bits_per_pixel)?;
    let row_bytes = raster.columns as usize * (raster.bits_per_pixel as usize / 8);
    let stride = match raster.bytes_per_row {
        0 => row_bytes,
        n => n as usize,
    };
    let pixels = strip_row_padding(raster.data, raster.rows as usize, stride, row_bytes)?;

    // Out-of-line values follow the directory.
    let mut offset = HEADER_SIZE + IFD_SIZE;
    let bits_offset = offset;
    if format.samples > 1 {
        offset += format.samples as usize * 2;
    }
    let x_res_offset = offset;
    let y_res_offset = offset + 8;
    let data_offset = offset + 16;

    let mut out = Vec::with_capacity(data_offset + pixels.len());
    out.extend_from_slice(b"II");
    out.write_u16::<LittleEndian>(TIFF_MAGIC).ok();
    out.write_u32::<LittleEndian>(HEADER_SIZE as u32).ok();

    out.write_u16::<LittleEndian>(ENTRY_COUNT as u16).ok();
    write_long(&mut out, TAG_NEW_SUBFILE_TYPE, 0);
    write_long(&mut out, TAG_IMAGE_WIDTH, raster.columns);
    write_long(&mut out, TAG_IMAGE_LENGTH, raster.rows);
    if format.samples > 1 {
        write_entry(
            &mut out,
            TAG_BITS_PER_SAMPLE,
            TYPE_SHORT,
            format.samples as u32,
            bits_offset as u32,
        );
    } else {
        write_short(&mut out, TAG_BITS_PER_SAMPLE, format.bits);
    }
    write_short(&mut out, TAG_COMPRESSION, COMPRESSION_NONE);
    write_short(&mut out, TAG_PHOTOMETRIC, format.photometric);
    write_long(&mut out, TAG_STRIP_OFFSETS, data_offset as u32);
    write_short(&mut out, TAG_SAMPLES_PER_PIXEL, format.samples);
    write_long(&mut out, TAG_ROWS_PER_STRIP, raster.rows);
    write_long(&mut out, TAG_STRIP_BYTE_COUNTS, pixels.len() as u32);
    write_entry(&mut out, TAG_X_RESOLUTION, TYPE_RATIONAL, 1, x_res_offset as u32);
    write_entry(&mut out, TAG_Y_RESOLUTION, TYPE_RATIONAL, 1, y_res_offset as u32);
    write_short(&mut out, TAG_PLANAR_CONFIGURATION, PLANAR_CHUNKY);
    write_short(&mut out, TAG_RESOLUTION_UNIT, RESOLUTION_UNIT_INCH);
    out.write_u32::<LittleEndian>(0).ok();

    if format.samples > 1 {
        for _ in 0..format.samples {
            out.write_u16::<LittleEndian>(format.bits).ok();
        }
    }

    let x_dpi = dpi_or_fallback(raster.x_resolution);
    let y_dpi = match raster.y_resolution.to_f32() {
        dpi if dpi > 0.0 => dpi,
        _ => x_dpi,
    };
    write_rational(&mut out, x_dpi);
    write_rational(&mut out, y_dpi);

    debug_assert_eq!(out.len(), data_offset);
    out.extend_from_slice(&pixels);
    Ok(out)
}

fn dpi_or_fallback(resolution: Fix32) -> f32 {
    match resolution.to_f32() {
        dpi if dpi > 0.0 => dpi,
        _ => FALLBACK_DPI,
    }
}

fn write_entry(out: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, value: u32) {
    out.write_u16::<LittleEndian>(tag).ok();
    out.write_u16::<LittleEndian>(field_type).ok();
    out.write_u32::<LittleEndian>(count).ok();
    out.write_u32::<LittleEndian>(value).ok();
}

/// A single SHORT sits left-justified in the value slot.
fn write_short(out: &mut Vec<u8>, tag: u16, value: u16) {
    out.write_u16::<LittleEndian>(tag).ok();
    out.write_u16::<LittleEndian>(TYPE_SHORT).ok();
    out.write_u32::<LittleEndian>(1).ok();
    out.write_u16::<LittleEndian>(value).ok();
    out.write_u16::<LittleEndian>(0).ok();
}

fn write_long(out: &mut Vec<u8>, tag: u16, value: u32) {
    write_entry(out, tag, TYPE_LONG, 1, value);
}

/// Hundredths of a dot per inch.
fn write_rational(out: &mut Vec<u8>, dpi: f32) {
    out.write_u32::<LittleEndian>((dpi * 100.0).round() as u32).ok();
    out.write_u32::<LittleEndian>(100).ok();
}
