//! Device-independent bitmap produced by a native transfer.
//!
//! Layout: `BITMAPINFOHEADER`, optional colour table, then row-padded pixel
//! data, usually bottom-up. Nothing here renders pixels; the bitmap can be
//! wrapped into a `.bmp` file for any standard decoder.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, TwainError};
use crate::protocol::constants::{BITMAPFILEHEADER_SIZE, BITMAPINFOHEADER_SIZE};

/// `BI_BITFIELDS`: three colour masks follow a 40-byte header.
const BI_BITFIELDS: u32 = 3;

/// Parsed `BITMAPINFOHEADER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DibHeader {
    pub header_size: u32,
    pub width: i32,
    /// Positive for bottom-up rows, negative for top-down.
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    pub compression: u32,
    pub size_image: u32,
    pub x_pels_per_meter: i32,
    pub y_pels_per_meter: i32,
    pub clr_used: u32,
    pub clr_important: u32,
}

impl DibHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < BITMAPINFOHEADER_SIZE {
            return Err(TwainError::InvalidBitmap(format!(
                "header needs {} bytes, got {}",
                BITMAPINFOHEADER_SIZE,
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        let read_err = |e: std::io::Error| TwainError::InvalidBitmap(e.to_string());

        let header = Self {
            header_size: cursor.read_u32::<LittleEndian>().map_err(read_err)?,
            width: cursor.read_i32::<LittleEndian>().map_err(read_err)?,
            height: cursor.read_i32::<LittleEndian>().map_err(read_err)?,
            planes: cursor.read_u16::<LittleEndian>().map_err(read_err)?,
            bit_count: cursor.read_u16::<LittleEndian>().map_err(read_err)?,
            compression: cursor.read_u32::<LittleEndian>().map_err(read_err)?,
            size_image: cursor.read_u32::<LittleEndian>().map_err(read_err)?,
            x_pels_per_meter: cursor.read_i32::<LittleEndian>().map_err(read_err)?,
            y_pels_per_meter: cursor.read_i32::<LittleEndian>().map_err(read_err)?,
            clr_used: cursor.read_u32::<LittleEndian>().map_err(read_err)?,
            clr_important: cursor.read_u32::<LittleEndian>().map_err(read_err)?,
        };

        if (header.header_size as usize) < BITMAPINFOHEADER_SIZE {
            return Err(TwainError::InvalidBitmap(format!(
                "unsupported header size {}",
                header.header_size
            )));
        }
        if header.width <= 0 || header.height == 0 {
            return Err(TwainError::InvalidBitmap(format!(
                "bad dimensions {}x{}",
                header.width, header.height
            )));
        }
        Ok(header)
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.write_u32::<LittleEndian>(self.header_size).ok();
        out.write_i32::<LittleEndian>(self.width).ok();
        out.write_i32::<LittleEndian>(self.height).ok();
        out.write_u16::<LittleEndian>(self.planes).ok();
        out.write_u16::<LittleEndian>(self.bit_count).ok();
        out.write_u32::<LittleEndian>(self.compression).ok();
        out.write_u32::<LittleEndian>(self.size_image).ok();
        out.write_i32::<LittleEndian>(self.x_pels_per_meter).ok();
        out.write_i32::<LittleEndian>(self.y_pels_per_meter).ok();
        out.write_u32::<LittleEndian>(self.clr_used).ok();
        out.write_u32::<LittleEndian>(self.clr_important).ok();
    }

    pub fn is_bottom_up(&self) -> bool {
        self.height > 0
    }

    pub fn rows(&self) -> u32 {
        self.height.unsigned_abs()
    }

    /// Row size in bytes, padded to a 32-bit boundary.
    pub fn stride(&self) -> usize {
        ((self.width as usize * self.bit_count as usize + 31) & !31) >> 3
    }

    /// Number of colour table entries.
    pub fn palette_len(&self) -> usize {
        if self.clr_used != 0 {
            self.clr_used as usize
        } else if self.bit_count <= 8 {
            1usize << self.bit_count
        } else {
            0
        }
    }

    /// Pixel data size; computed from the geometry when the source left it 0.
    pub fn image_size(&self) -> usize {
        if self.size_image != 0 {
            self.size_image as usize
        } else {
            self.stride() * self.rows() as usize
        }
    }

    /// Offset of the first pixel byte from the start of the header.
    pub fn pixel_offset(&self) -> usize {
        let masks = if self.compression == BI_BITFIELDS && self.header_size as usize == BITMAPINFOHEADER_SIZE {
            12
        } else {
            0
        };
        self.header_size as usize + masks + self.palette_len() * 4
    }

    /// Horizontal resolution in dots per inch.
    pub fn x_dpi(&self) -> f32 {
        pels_per_meter_to_dpi(self.x_pels_per_meter)
    }

    /// Vertical resolution in dots per inch.
    pub fn y_dpi(&self) -> f32 {
        pels_per_meter_to_dpi(self.y_pels_per_meter)
    }
}

fn pels_per_meter_to_dpi(ppm: i32) -> f32 {
    ((ppm as f64 / 1000.0 * 25.4 * 100.0).round() / 100.0) as f32
}

fn dpi_to_pels_per_meter(dpi: f32) -> i32 {
    (dpi as f64 / 25.4 * 1000.0).round() as i32
}

/// A native-transfer page, copied out of the source's handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DibImage {
    header: DibHeader,
    data: Vec<u8>,
}

impl DibImage {
    /// Validate and take ownership of a packed DIB.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let header = DibHeader::parse(&data)?;
        let needed = header.pixel_offset() + header.image_size();
        if data.len() < needed {
            return Err(TwainError::InvalidBitmap(format!(
                "needs {} bytes, got {}",
                needed,
                data.len()
            )));
        }
        Ok(Self { header, data })
    }

    /// Build an uncompressed bottom-up DIB. `pixel` returns the sample bytes
    /// for `(x, y)` counted from the top row; 8-bit and below get a grey
    /// palette.
    pub fn synthesize<F>(width: u32, height: u32, bit_count: u16, dpi: f32, mut pixel: F) -> Self
    where
        F: FnMut(u32, u32) -> [u8; 3],
    {
        let mut header = DibHeader {
            header_size: BITMAPINFOHEADER_SIZE as u32,
            width: width as i32,
            height: height as i32,
            planes: 1,
            bit_count,
            compression: 0,
            size_image: 0,
            x_pels_per_meter: dpi_to_pels_per_meter(dpi),
            y_pels_per_meter: dpi_to_pels_per_meter(dpi),
            clr_used: 0,
            clr_important: 0,
        };
        header.size_image = header.image_size() as u32;

        let mut data = Vec::with_capacity(header.pixel_offset() + header.image_size());
        header.write(&mut data);

        let palette = header.palette_len();
        for i in 0..palette {
            let level = if palette > 1 {
                (i * 255 / (palette - 1)) as u8
            } else {
                0
            };
            data.extend_from_slice(&[level, level, level, 0]);
        }

        let stride = header.stride();
        for row in (0..height).rev() {
            let mut line = vec![0u8; stride];
            for x in 0..width {
                let [r, g, b] = pixel(x, row);
                match bit_count {
                    24 => {
                        let at = x as usize * 3;
                        line[at] = b;
                        line[at + 1] = g;
                        line[at + 2] = r;
                    }
                    8 => line[x as usize] = r,
                    1 => {
                        if r >= 0x80 {
                            line[x as usize / 8] |= 0x80 >> (x % 8);
                        }
                    }
                    _ => {}
                }
            }
            data.extend_from_slice(&line);
        }

        Self { header, data }
    }

    pub fn header(&self) -> &DibHeader {
        &self.header
    }

    pub fn width(&self) -> u32 {
        self.header.width as u32
    }

    pub fn height(&self) -> u32 {
        self.header.rows()
    }

    pub fn bits_per_pixel(&self) -> u16 {
        self.header.bit_count
    }

    /// The packed DIB exactly as the source delivered it.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Pixel rows, still padded and in storage order.
    pub fn pixels(&self) -> &[u8] {
        let start = self.header.pixel_offset();
        let end = (start + self.header.image_size()).min(self.data.len());
        &self.data[start..end]
    }

    /// Wrap as a `.bmp` file by prefixing a `BITMAPFILEHEADER`.
    pub fn to_bmp(&self) -> Vec<u8> {
        let file_size = BITMAPFILEHEADER_SIZE + self.data.len();
        let offset = BITMAPFILEHEADER_SIZE + self.header.pixel_offset();

        let mut out = Vec::with_capacity(file_size);
        out.extend_from_slice(b"BM");
        out.write_u32::<LittleEndian>(file_size as u32).ok();
        out.write_u32::<LittleEndian>(0).ok();
        out.write_u32::<LittleEndian>(offset as u32).ok();
        out.extend_from_slice(&self.data);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesized_grey_layout() {
        let dib = DibImage::synthesize(10, 4, 8, 300.0, |x, _| [x as u8, 0, 0]);
        let header = dib.header();
        assert_eq!(header.stride(), 12);
        assert_eq!(header.palette_len(), 256);
        assert_eq!(header.pixel_offset(), 40 + 1024);
        assert_eq!(dib.pixels().len(), 48);
        assert_eq!(dib.as_bytes().len(), 40 + 1024 + 48);
        assert!((header.x_dpi() - 300.0).abs() < 0.1);

        let parsed = DibImage::from_bytes(dib.as_bytes().to_vec()).unwrap();
        assert_eq!(parsed, dib);
    }

    #[test]
    fn test_image_size_computed_when_zero() {
        let mut dib = DibImage::synthesize(3, 2, 24, 96.0, |_, _| [1, 2, 3]);
        // Sources may leave biSizeImage at 0.
        dib.data[20..24].copy_from_slice(&0u32.to_le_bytes());
        let parsed = DibImage::from_bytes(dib.data.clone()).unwrap();
        assert_eq!(parsed.header().size_image, 0);
        assert_eq!(parsed.header().image_size(), 2 * 12);
        assert_eq!(parsed.header().palette_len(), 0);
        // BGR order, top row stored last.
        assert_eq!(&parsed.pixels()[..3], &[3, 2, 1]);
    }

    #[test]
    fn test_rejects_truncated_bitmap() {
        let dib = DibImage::synthesize(16, 16, 8, 150.0, |_, _| [0, 0, 0]);
        let mut bytes = dib.into_bytes();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            DibImage::from_bytes(bytes),
            Err(TwainError::InvalidBitmap(_))
        ));
        assert!(DibImage::from_bytes(vec![0; 12]).is_err());
    }

    #[test]
    fn test_bmp_wrapper_decodes() {
        let dib = DibImage::synthesize(7, 5, 24, 200.0, |x, y| [x as u8 * 30, y as u8 * 40, 9]);
        let bmp = dib.to_bmp();
        assert_eq!(&bmp[..2], b"BM");

        let img = image::load_from_memory_with_format(&bmp, image::ImageFormat::Bmp)
            .unwrap()
            .to_rgb8();
        assert_eq!(img.dimensions(), (7, 5));
        assert_eq!(img.get_pixel(2, 3).0, [60, 120, 9]);
    }
}
