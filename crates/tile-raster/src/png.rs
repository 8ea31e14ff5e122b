//! PNG codec for nowcast tiles.
//!
//! Tiles arrive in two shapes:
//! - **Indexed PNG (color type 3)**: the palette index *is* the intensity
//!   step, with per-entry transparency in `tRNS`. Decoding reads the
//!   scanlines untransformed so the raw indices survive next to the
//!   expanded RGBA.
//! - **Grayscale or truecolor PNG**: expanded to 8-bit RGBA.
//!
//! The encoders produce the same two shapes and are used for debug overlays
//! and synthetic test tiles.

use std::io::Write;

use ::png::{BitDepth, ColorType, Decoder, Transformations};
use thiserror::Error;

/// PNG file signature.
const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Upper bound on decoded dimensions; tiles are 256×256.
const MAX_DIMENSION: u32 = 8192;

#[derive(Debug, Error)]
pub enum PngError {
    #[error("PNG decode failed: {0}")]
    Decode(#[from] ::png::DecodingError),

    #[error("Missing {0} chunk")]
    MissingChunk(&'static str),

    #[error("Unsupported PNG layout: {0}")]
    Unsupported(String),

    #[error("Corrupt image data: {0}")]
    Corrupt(String),
}

/// Result of decoding a PNG.
#[derive(Debug, Clone)]
pub struct DecodedPng {
    pub width: u32,
    pub height: u32,
    /// RGBA pixels, 4 bytes per pixel, row-major.
    pub rgba: Vec<u8>,
    /// Raw palette indices for indexed images, 1 byte per pixel.
    pub indices: Option<Vec<u8>>,
}

/// Decode a PNG, keeping palette indices for indexed images.
pub fn decode(data: &[u8]) -> Result<DecodedPng, PngError> {
    let mut decoder = Decoder::new(data);
    decoder.set_transformations(Transformations::IDENTITY);
    let mut reader = decoder.read_info()?;

    let info = reader.info();
    let (width, height) = (info.width, info.height);
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(PngError::Unsupported(format!(
            "{}x{} exceeds {}px",
            width, height, MAX_DIMENSION
        )));
    }
    if info.color_type != ColorType::Indexed {
        return decode_expanded(data);
    }

    let palette = info
        .palette
        .as_ref()
        .map(|p| p.to_vec())
        .ok_or(PngError::MissingChunk("PLTE"))?;
    let trns = info.trns.as_ref().map(|t| t.to_vec()).unwrap_or_default();

    let mut buf = vec![0u8; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf)?;
    let indices = unpack_indices(&buf, frame.width, frame.height, frame.line_size, frame.bit_depth)?;

    let mut rgba = Vec::with_capacity(indices.len() * 4);
    for &idx in &indices {
        let i = idx as usize;
        let rgb = palette
            .get(i * 3..i * 3 + 3)
            .ok_or_else(|| PngError::Corrupt(format!("palette index {} out of range", idx)))?;
        rgba.extend_from_slice(rgb);
        rgba.push(trns.get(i).copied().unwrap_or(255));
    }

    Ok(DecodedPng {
        width: frame.width,
        height: frame.height,
        rgba,
        indices: Some(indices),
    })
}

/// Decode a non-indexed PNG to 8-bit RGBA.
fn decode_expanded(data: &[u8]) -> Result<DecodedPng, PngError> {
    let mut decoder = Decoder::new(data);
    decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
    let mut reader = decoder.read_info()?;

    let mut buf = vec![0u8; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf)?;
    let pixels = &buf[..frame.buffer_size()];

    let pixel_count = frame.width as usize * frame.height as usize;
    let mut rgba = Vec::with_capacity(pixel_count * 4);
    match frame.color_type {
        ColorType::Grayscale => {
            for &g in pixels {
                rgba.extend_from_slice(&[g, g, g, 255]);
            }
        }
        ColorType::GrayscaleAlpha => {
            for px in pixels.chunks_exact(2) {
                rgba.extend_from_slice(&[px[0], px[0], px[0], px[1]]);
            }
        }
        ColorType::Rgb => {
            for px in pixels.chunks_exact(3) {
                rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
            }
        }
        ColorType::Rgba => rgba.extend_from_slice(pixels),
        ColorType::Indexed => {
            return Err(PngError::Unsupported("palette survived expansion".to_string()));
        }
    }
    if rgba.len() != pixel_count * 4 {
        return Err(PngError::Corrupt(format!(
            "{} RGBA bytes for {}x{}",
            rgba.len(),
            frame.width,
            frame.height
        )));
    }

    Ok(DecodedPng {
        width: frame.width,
        height: frame.height,
        rgba,
        indices: None,
    })
}

/// Spread packed 1/2/4/8-bit palette indices to one byte per pixel.
fn unpack_indices(
    buf: &[u8],
    width: u32,
    height: u32,
    line_size: usize,
    depth: BitDepth,
) -> Result<Vec<u8>, PngError> {
    let bits = match depth {
        BitDepth::One => 1,
        BitDepth::Two => 2,
        BitDepth::Four => 4,
        BitDepth::Eight => 8,
        BitDepth::Sixteen => {
            return Err(PngError::Unsupported("16-bit palette".to_string()));
        }
    };
    let width = width as usize;
    let mask = ((1u16 << bits) - 1) as u8;

    let mut indices = Vec::with_capacity(width * height as usize);
    for row in buf.chunks(line_size).take(height as usize) {
        if row.len() * 8 < width * bits {
            return Err(PngError::Corrupt("short scanline".to_string()));
        }
        if bits == 8 {
            indices.extend_from_slice(&row[..width]);
            continue;
        }
        for x in 0..width {
            let bit = x * bits;
            let shift = 8 - bits - bit % 8;
            indices.push((row[bit / 8] >> shift) & mask);
        }
    }
    Ok(indices)
}

/// Create an indexed PNG (color type 3) from palette and indices.
///
/// Palette entries with alpha below 255 produce a `tRNS` chunk.
pub fn create_png_indexed(
    width: usize,
    height: usize,
    palette: &[(u8, u8, u8, u8)],
    indices: &[u8],
) -> Result<Vec<u8>, String> {
    if indices.len() != width * height {
        return Err(format!(
            "expected {} indices, got {}",
            width * height,
            indices.len()
        ));
    }

    let mut png = Vec::new();

    // PNG signature
    png.extend_from_slice(&SIGNATURE);

    // IHDR chunk
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, 3));

    // PLTE chunk (palette)
    let mut plte_data = Vec::with_capacity(palette.len() * 3);
    for (r, g, b, _) in palette {
        plte_data.push(*r);
        plte_data.push(*g);
        plte_data.push(*b);
    }
    write_chunk(&mut png, b"PLTE", &plte_data);

    // tRNS chunk (transparency) - only if any color has alpha < 255
    if palette.iter().any(|(_, _, _, a)| *a < 255) {
        let trns_data: Vec<u8> = palette.iter().map(|(_, _, _, a)| *a).collect();
        write_chunk(&mut png, b"tRNS", &trns_data);
    }

    // IDAT chunk (image data)
    let idat_data = deflate_scanlines(indices, width, height)
        .map_err(|e| format!("IDAT compression failed: {}", e))?;
    write_chunk(&mut png, b"IDAT", &idat_data);

    // IEND chunk
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// Create a PNG image from RGBA pixel data (color type 6).
pub fn create_png(pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>, String> {
    if pixels.len() != width * height * 4 {
        return Err(format!(
            "expected {} RGBA bytes, got {}",
            width * height * 4,
            pixels.len()
        ));
    }

    let mut png = Vec::new();
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, 6));

    let idat_data = deflate_scanlines(pixels, width * 4, height)
        .map_err(|e| format!("IDAT compression failed: {}", e))?;
    write_chunk(&mut png, b"IDAT", &idat_data);

    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

fn ihdr(width: usize, height: usize, color_type: u8) -> Vec<u8> {
    let mut ihdr_data = Vec::with_capacity(13);
    ihdr_data.extend_from_slice(&(width as u32).to_be_bytes());
    ihdr_data.extend_from_slice(&(height as u32).to_be_bytes());
    ihdr_data.push(8); // bit depth
    ihdr_data.push(color_type);
    ihdr_data.push(0); // compression method
    ihdr_data.push(0); // filter method
    ihdr_data.push(0); // interlace method
    ihdr_data
}

/// Write a PNG chunk
fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let crc_data = [chunk_type.as_slice(), data].concat();
    png.extend_from_slice(&crc32_checksum(&crc_data).to_be_bytes());
}

/// Prefix each `row_bytes`-wide scanline with filter type 0 and deflate.
fn deflate_scanlines(
    bytes: &[u8],
    row_bytes: usize,
    height: usize,
) -> Result<Vec<u8>, std::io::Error> {
    let mut uncompressed = Vec::with_capacity(height * (1 + row_bytes));
    for y in 0..height {
        uncompressed.push(0); // filter type: none
        uncompressed.extend_from_slice(&bytes[y * row_bytes..(y + 1) * row_bytes]);
    }

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(&uncompressed)?;
    encoder.finish()
}

/// Simple CRC32 checksum (PNG-style)
fn crc32_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
