//! Image helpers for puzzles: shrink uploads (PNG, JPEG, WebP or GIF) to a
//! storage budget as PNG, and cut thumbnails around answer locations.

use std::io::Cursor;

use png::{BitDepth, ColorType, Decoder, Encoder, Transformations};
use puzzle_core::models::Point;
use puzzle_core::thumbnail::{CropRegion, crop_region};
use thiserror::Error;
use tracing::debug;

/// Longest side kept for stored puzzle images.
pub const MAX_SIDE: u32 = 2048;
/// `compress` stops shrinking once the shorter side would drop below this.
pub const MIN_SIDE: u32 = 200;
/// Default byte budget for a stored image.
pub const DEFAULT_BUDGET: usize = 1_500_000;
/// Longest side of a rendered thumbnail.
pub const THUMBNAIL_SIDE: u32 = 96;

const SHRINK_STEP: f64 = 0.8;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("cannot decode image: {0}")]
    Decode(String),
    #[error("cannot encode image: {0}")]
    Encode(String),
    #[error("image is empty")]
    Empty,
}

impl From<png::DecodingError> for ImagingError {
    fn from(e: png::DecodingError) -> Self {
        ImagingError::Decode(e.to_string())
    }
}

impl From<image::ImageError> for ImagingError {
    fn from(e: image::ImageError) -> Self {
        ImagingError::Decode(e.to_string())
    }
}

impl From<png::EncodingError> for ImagingError {
    fn from(e: png::EncodingError) -> Self {
        ImagingError::Encode(e.to_string())
    }
}

/// 8-bit RGBA pixels, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbaImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ImagingError> {
        if width == 0 || height == 0 {
            return Err(ImagingError::Empty);
        }
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(ImagingError::Decode(format!(
                "{} bytes for a {width}x{height} image",
                pixels.len()
            )));
        }
        Ok(RgbaImage {
            width,
            height,
            pixels,
        })
    }

    fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        &self.pixels[i..i + 4]
    }

    /// Copy of a region; the region is clipped to the image.
    pub fn crop(&self, region: CropRegion) -> Result<RgbaImage, ImagingError> {
        let x0 = region.x.min(self.width);
        let y0 = region.y.min(self.height);
        let w = region.width.min(self.width - x0);
        let h = region.height.min(self.height - y0);
        let mut out = Vec::with_capacity(w as usize * h as usize * 4);
        for y in y0..y0 + h {
            let start = (y as usize * self.width as usize + x0 as usize) * 4;
            out.extend_from_slice(&self.pixels[start..start + w as usize * 4]);
        }
        RgbaImage::new(w, h, out)
    }

    /// Box-filter downscale so neither side exceeds `max_side`.
    pub fn fit_within(&self, max_side: u32) -> RgbaImage {
        let longest = self.width.max(self.height);
        if longest <= max_side {
            return self.clone();
        }
        let scale = f64::from(max_side) / f64::from(longest);
        let w = ((f64::from(self.width) * scale).round() as u32).max(1);
        let h = ((f64::from(self.height) * scale).round() as u32).max(1);
        self.resize_box(w, h)
    }

    /// Each output pixel is the mean of the source pixels it covers.
    pub fn resize_box(&self, width: u32, height: u32) -> RgbaImage {
        let (sw, sh) = (u64::from(self.width), u64::from(self.height));
        let (tw, th) = (u64::from(width), u64::from(height));
        let mut out = Vec::with_capacity(width as usize * height as usize * 4);
        for ty in 0..th {
            let y0 = ty * sh / th;
            let y1 = ((ty + 1) * sh / th).max(y0 + 1);
            for tx in 0..tw {
                let x0 = tx * sw / tw;
                let x1 = ((tx + 1) * sw / tw).max(x0 + 1);
                let mut sum = [0u64; 4];
                for y in y0..y1 {
                    for x in x0..x1 {
                        for (s, v) in sum.iter_mut().zip(self.pixel(x as u32, y as u32)) {
                            *s += u64::from(*v);
                        }
                    }
                }
                let n = (y1 - y0) * (x1 - x0);
                out.extend(sum.iter().map(|s| ((s + n / 2) / n) as u8));
            }
        }
        RgbaImage {
            width,
            height,
            pixels: out,
        }
    }
}

/// Decodes any PNG colour type into RGBA8.
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, ImagingError> {
    let mut decoder = Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(Transformations::normalize_to_color8());
    let mut reader = decoder.read_info()?;
    let (width, height) = {
        let info = reader.info();
        (info.width, info.height)
    };
    if width == 0 || height == 0 {
        return Err(ImagingError::Empty);
    }
    // After normalisation every sample is 8-bit with at most four channels.
    let mut buf = vec![0; width as usize * height as usize * 4];
    let frame = reader.next_frame(&mut buf)?;
    let data = &buf[..frame.buffer_size()];
    let pixels = match frame.color_type {
        ColorType::Rgba => data.to_vec(),
        ColorType::Rgb => data
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        ColorType::GrayscaleAlpha => data
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        ColorType::Grayscale => data.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        ColorType::Indexed => {
            return Err(ImagingError::Decode("palette was not expanded".into()));
        }
    };
    RgbaImage::new(frame.width, frame.height, pixels)
}

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE)
}

/// Decodes PNG directly and every other supported format through `image`.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, ImagingError> {
    if is_png(bytes) {
        return decode_png(bytes);
    }
    let decoded = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = decoded.dimensions();
    RgbaImage::new(width, height, decoded.into_raw())
}

// Deterministic for the same input.
pub fn encode_rgba_to_png_bytes(
    width: u32,
    height: u32,
    rgba: &[u8],
) -> Result<Vec<u8>, png::EncodingError> {
    let mut buf = Vec::new();
    {
        let mut enc = Encoder::new(&mut buf, width, height);
        enc.set_color(ColorType::Rgba);
        enc.set_depth(BitDepth::Eight);
        let mut writer = enc.write_header()?;
        writer.write_image_data(rgba)?;
    }
    Ok(buf)
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ImagingError> {
    Ok(encode_rgba_to_png_bytes(
        image.width,
        image.height,
        &image.pixels,
    )?)
}

/// Shrinks an uploaded image until it fits `budget` bytes as PNG.
///
/// PNGs already within [`MAX_SIDE`] and the budget come back untouched; other
/// formats are always re-encoded.
/// Otherwise the image is scaled down in steps; once the shorter side would
/// fall below [`MIN_SIDE`] the smallest attempt is returned even if it is
/// still over budget.
pub fn compress(bytes: &[u8], budget: usize) -> Result<Vec<u8>, ImagingError> {
    let image = decode_image(bytes)?;
    if is_png(bytes) && bytes.len() <= budget && image.width.max(image.height) <= MAX_SIDE {
        return Ok(bytes.to_vec());
    }
    let mut current = image.fit_within(MAX_SIDE);
    let mut out = encode_png(&current)?;
    while out.len() > budget {
        let w = (f64::from(current.width) * SHRINK_STEP).round() as u32;
        let h = (f64::from(current.height) * SHRINK_STEP).round() as u32;
        if w.min(h) < MIN_SIDE {
            debug!(bytes = out.len(), budget, "minimum size reached");
            break;
        }
        current = current.resize_box(w, h);
        out = encode_png(&current)?;
    }
    debug!(
        from = bytes.len(),
        to = out.len(),
        width = current.width,
        height = current.height,
        "image compressed"
    );
    Ok(out)
}

/// PNG thumbnail around a puzzle-space point.
pub fn thumbnail(bytes: &[u8], center: Point) -> Result<Vec<u8>, ImagingError> {
    let image = decode_image(bytes)?;
    let region = crop_region(center, image.width, image.height);
    let thumb = image.crop(region)?.fit_within(THUMBNAIL_SIDE);
    encode_png(&thumb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        let mut px = Vec::new();
        for y in 0..h {
            for x in 0..w {
                px.extend([(x % 256) as u8, (y % 256) as u8, 128, 255]);
            }
        }
        RgbaImage::new(w, h, px).unwrap()
    }

    fn noise(w: u32, h: u32) -> RgbaImage {
        let mut state: u32 = 0x9e37_79b9;
        let mut px = Vec::new();
        for _ in 0..w * h {
            for _ in 0..3 {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                px.push(state as u8);
            }
            px.push(255);
        }
        RgbaImage::new(w, h, px).unwrap()
    }

    #[test]
    fn png_bytes_decode_back_to_the_same_pixels() {
        let img = gradient(37, 11);
        let bytes = encode_png(&img).unwrap();
        assert_eq!(decode_png(&bytes).unwrap(), img);
        // Deterministic output.
        assert_eq!(encode_png(&img).unwrap(), bytes);
    }

    #[test]
    fn rgb_pngs_gain_an_opaque_alpha() {
        let mut buf = Vec::new();
        {
            let mut enc = Encoder::new(&mut buf, 2, 1);
            enc.set_color(ColorType::Rgb);
            enc.set_depth(BitDepth::Eight);
            let mut w = enc.write_header().unwrap();
            w.write_image_data(&[1, 2, 3, 4, 5, 6]).unwrap();
        }
        let img = decode_png(&buf).unwrap();
        assert_eq!(img.pixels, [1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            decode_png(b"not a png"),
            Err(ImagingError::Decode(_))
        ));
        assert!(matches!(
            decode_image(b"not an image"),
            Err(ImagingError::Decode(_))
        ));
        assert!(matches!(
            RgbaImage::new(0, 3, vec![]),
            Err(ImagingError::Empty)
        ));
    }

    #[test]
    fn box_filter_averages() {
        let img = RgbaImage::new(2, 1, vec![0, 0, 0, 255, 100, 200, 50, 255]).unwrap();
        let half = img.resize_box(1, 1);
        assert_eq!(half.pixels, [50, 100, 25, 255]);
        let small = gradient(400, 100).fit_within(200);
        assert_eq!((small.width, small.height), (200, 50));
        assert_eq!(gradient(10, 10).fit_within(200).width, 10);
    }

    #[test]
    fn crop_copies_rows() {
        let img = gradient(10, 10);
        let c = img
            .crop(CropRegion {
                x: 8,
                y: 2,
                width: 5,
                height: 2,
            })
            .unwrap();
        assert_eq!((c.width, c.height), (2, 2));
        assert_eq!(&c.pixels[..4], &[8, 2, 128, 255]);
        assert_eq!(&c.pixels[8..12], &[8, 3, 128, 255]);
    }

    #[test]
    fn compress_meets_the_budget() {
        let bytes = encode_png(&noise(400, 400)).unwrap();
        let budget = 200_000;
        assert!(bytes.len() > budget);
        let out = compress(&bytes, budget).unwrap();
        assert!(out.len() <= budget, "{} > {budget}", out.len());
        let img = decode_png(&out).unwrap();
        assert!(img.width < 400 && img.width >= MIN_SIDE);
    }

    #[test]
    fn compress_stops_at_the_minimum_side() {
        let bytes = encode_png(&noise(220, 220)).unwrap();
        let out = compress(&bytes, 10).unwrap();
        assert_eq!(decode_png(&out).unwrap().width, 220);
    }

    #[test]
    fn small_images_pass_through() {
        let bytes = encode_png(&gradient(50, 50)).unwrap();
        assert_eq!(compress(&bytes, DEFAULT_BUDGET).unwrap(), bytes);
    }

    fn jpeg(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(w, h, |x, y| image::Rgb([x as u8, y as u8, 90]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    #[test]
    fn jpeg_uploads_come_back_as_png() {
        let bytes = jpeg(300, 200);
        assert!(!is_png(&bytes));
        let out = compress(&bytes, DEFAULT_BUDGET).unwrap();
        assert!(is_png(&out));
        let img = decode_png(&out).unwrap();
        assert_eq!((img.width, img.height), (300, 200));
        assert!(matches!(
            compress(&bytes[..20], DEFAULT_BUDGET),
            Err(ImagingError::Decode(_))
        ));
    }

    #[test]
    fn thumbnails_are_small_crops() {
        let bytes = encode_png(&gradient(1000, 1000)).unwrap();
        let thumb = decode_png(&thumbnail(&bytes, Point::new(500.0, 500.0)).unwrap()).unwrap();
        assert_eq!((thumb.width, thumb.height), (96, 96));
    }
}
