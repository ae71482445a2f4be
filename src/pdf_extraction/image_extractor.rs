// Image extraction - decode pricebook images and write padded PNG thumbnails
use flate2::read::ZlibDecoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::lopdf_helper::{get_number, get_resolved, resolve, stream_data, stream_filters};
use crate::config::{Config, IMAGE_FORMAT_EXTENSION};
use crate::sku::safe_filename;
use crate::types::{PricebookError, Result, SkuMap};

/// Writes one thumbnail per SKU into an output directory.
///
/// The directory is the configured `temp_image_dir` or a fresh temporary
/// directory that lives as long as the extractor (see [`ImageExtractor::keep`]).
/// Files written are removed when the extractor is dropped unless it was kept.
pub struct ImageExtractor {
    output_dir: PathBuf,
    temp_dir: Option<TempDir>,
    target_size: (u32, u32),
    cache: HashMap<ObjectId, RgbImage>,
    written: Vec<PathBuf>,
}

impl ImageExtractor {
    pub fn new(config: &Config) -> Result<Self> {
        let (output_dir, temp_dir) = match &config.temp_image_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                (dir.clone(), None)
            }
            None => {
                let temp = tempfile::Builder::new().prefix("pricebook_images_").tempdir()?;
                (temp.path().to_path_buf(), Some(temp))
            }
        };
        debug!("Image output directory: {}", output_dir.display());

        Ok(Self {
            output_dir,
            temp_dir,
            target_size: config.image_target_size,
            cache: HashMap::new(),
            written: Vec::new(),
        })
    }

    /// Extract the image of every SKU that has one.
    ///
    /// Returns normalized SKU -> PNG path. Images that cannot be decoded are
    /// logged and skipped.
    pub fn extract_images(&mut self, document: &Document, skus: &SkuMap) -> Result<BTreeMap<String, PathBuf>> {
        let mut paths = BTreeMap::new();
        let total = skus.values().filter(|e| e.has_image()).count();
        info!("Extracting {} images...", total);

        let mut stems = HashSet::new();
        for (normalized, entry) in skus {
            let Some(image_ref) = &entry.image else {
                continue;
            };
            let Some(object_id) = image_ref.object_id else {
                debug!("{}: inline image on page {} has no object, skipping", entry.sku, image_ref.page);
                continue;
            };

            let stem = unique_stem(normalized, &mut stems);
            match self.write_thumbnail(document, object_id, &stem) {
                Ok(path) => {
                    debug!("{} -> {}", entry.sku, path.display());
                    paths.insert(normalized.clone(), path);
                }
                Err(e) => warn!("Failed to extract image for {}: {}", entry.sku, e),
            }
        }

        info!("Extracted {}/{} images", paths.len(), total);
        Ok(paths)
    }

    fn write_thumbnail(&mut self, document: &Document, object_id: ObjectId, stem: &str) -> Result<PathBuf> {
        let decoded = match self.cache.get(&object_id) {
            Some(image) => image.clone(),
            None => {
                let image = decode_image_object(document, object_id)?;
                self.cache.insert(object_id, image.clone());
                image
            }
        };

        let canvas = fit_on_canvas(&decoded, self.target_size);
        let path = self
            .output_dir
            .join(format!("{}.{}", stem, IMAGE_FORMAT_EXTENSION));
        canvas.save_with_format(&path, ImageFormat::Png)?;
        self.written.push(path.clone());
        Ok(path)
    }

    /// Delete every file written so far.
    pub fn cleanup(&mut self) {
        for path in self.written.drain(..) {
            if let Err(e) = fs::remove_file(&path) {
                debug!("Could not remove {}: {}", path.display(), e);
            }
        }
    }

    /// Keep the output directory on disk after the extractor is dropped.
    pub fn keep(mut self) -> PathBuf {
        self.written.clear();
        match self.temp_dir.take() {
            Some(temp) => temp.into_path(),
            None => self.output_dir.clone(),
        }
    }
}

impl Drop for ImageExtractor {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// File stem for a normalized SKU, suffixed when sanitizing makes it clash
/// with one already handed out.
fn unique_stem(normalized: &str, taken: &mut HashSet<String>) -> String {
    let base = match safe_filename(normalized) {
        stem if stem.is_empty() => "image".to_string(),
        stem => stem,
    };
    let mut stem = base.clone();
    let mut n = 2;
    while !taken.insert(stem.clone()) {
        stem = format!("{}_{}", base, n);
        n += 1;
    }
    stem
}

/// Shrink to fit `target` (never enlarge) and center on a white canvas.
pub fn fit_on_canvas(image: &RgbImage, target: (u32, u32)) -> RgbImage {
    let (tw, th) = target;
    let source = DynamicImage::ImageRgb8(image.clone());
    let fitted = if image.width() > tw || image.height() > th {
        source.resize(tw, th, FilterType::Lanczos3).to_rgb8()
    } else {
        source.to_rgb8()
    };

    let mut canvas = RgbImage::from_pixel(tw, th, Rgb([255, 255, 255]));
    let x = (tw.saturating_sub(fitted.width()) / 2) as i64;
    let y = (th.saturating_sub(fitted.height()) / 2) as i64;
    imageops::overlay(&mut canvas, &fitted, x, y);
    canvas
}

/// Decode an image XObject to RGB, with any soft mask flattened onto white.
pub fn decode_image_object(document: &Document, object_id: ObjectId) -> Result<RgbImage> {
    let stream = document.get_object(object_id)?.as_stream()?;
    let rgba = decode_stream(document, stream)?;
    Ok(flatten_on_white(&rgba))
}

fn decode_stream(document: &Document, stream: &Stream) -> Result<RgbaImage> {
    let filters = stream_filters(document, stream);

    let mut rgba = match filters.split_last() {
        Some((&b"DCTDecode", outer)) => {
            let jpeg = undo_filters(&stream.content, outer)?;
            image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)?.to_rgba8()
        }
        Some((&b"JPXDecode", _)) | Some((&b"JBIG2Decode", _)) | Some((&b"CCITTFaxDecode", _)) => {
            let names: Vec<String> = filters.iter().map(|f| String::from_utf8_lossy(f).into_owned()).collect();
            return Err(PricebookError::UnsupportedImage(names.join(" + ")));
        }
        _ => decode_samples(document, stream)?,
    };

    if let Some(Object::Stream(mask)) = get_resolved(document, &stream.dict, b"SMask") {
        match decode_samples(document, mask) {
            Ok(mask) => apply_soft_mask(&mut rgba, &mask),
            Err(e) => debug!("Ignoring undecodable soft mask: {}", e),
        }
    }
    Ok(rgba)
}

/// Undo byte-level filters applied on top of an image codec, outermost first.
fn undo_filters(content: &[u8], filters: &[&[u8]]) -> Result<Vec<u8>> {
    let mut data = content.to_vec();
    for filter in filters {
        data = match *filter {
            b"FlateDecode" | b"Fl" => {
                let mut decoded = Vec::new();
                ZlibDecoder::new(data.as_slice()).read_to_end(&mut decoded)?;
                decoded
            }
            other => Stream::new(dictionary! { "Filter" => Object::Name(other.to_vec()) }, data)
                .decompressed_content()
                .map_err(|_| PricebookError::UnsupportedImage(String::from_utf8_lossy(other).into_owned()))?,
        };
    }
    Ok(data)
}

/// Color model of raw image samples.
#[derive(Debug, Clone, PartialEq)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    /// Palette of RGB triples
    Indexed(Vec<[u8; 3]>),
}

impl ColorModel {
    fn components(&self) -> usize {
        match self {
            ColorModel::Gray | ColorModel::Indexed(_) => 1,
            ColorModel::Rgb => 3,
            ColorModel::Cmyk => 4,
        }
    }
}

fn color_model(document: &Document, stream: &Stream) -> Result<ColorModel> {
    if stream.dict.get(b"ImageMask").map(|o| matches!(o, Object::Boolean(true))).unwrap_or(false) {
        return Ok(ColorModel::Gray);
    }
    match get_resolved(document, &stream.dict, b"ColorSpace") {
        None => Ok(ColorModel::Gray),
        Some(space) => parse_color_space(document, space),
    }
}

fn parse_color_space(document: &Document, space: &Object) -> Result<ColorModel> {
    match resolve(document, space) {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Ok(ColorModel::Gray),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(ColorModel::Rgb),
            b"DeviceCMYK" | b"CMYK" => Ok(ColorModel::Cmyk),
            other => Err(PricebookError::UnsupportedImage(format!(
                "color space {}",
                String::from_utf8_lossy(other)
            ))),
        },
        Object::Array(parts) => {
            let family = parts.first().map(|o| resolve(document, o));
            match family {
                Some(Object::Name(n)) if n == b"ICCBased" => {
                    let components = parts
                        .get(1)
                        .and_then(|o| match resolve(document, o) {
                            Object::Stream(s) => get_number(document, &s.dict, b"N"),
                            _ => None,
                        })
                        .unwrap_or(3.0) as usize;
                    match components {
                        1 => Ok(ColorModel::Gray),
                        4 => Ok(ColorModel::Cmyk),
                        _ => Ok(ColorModel::Rgb),
                    }
                }
                Some(Object::Name(n)) if n == b"Indexed" || n == b"I" => indexed_palette(document, parts),
                Some(Object::Name(n)) if n == b"CalRGB" || n == b"Lab" => Ok(ColorModel::Rgb),
                Some(Object::Name(n)) if n == b"CalGray" => Ok(ColorModel::Gray),
                _ => Err(PricebookError::UnsupportedImage("color space array".to_string())),
            }
        }
        _ => Err(PricebookError::UnsupportedImage("color space".to_string())),
    }
}

// [/Indexed base hival lookup]
fn indexed_palette(document: &Document, parts: &[Object]) -> Result<ColorModel> {
    let base = match parts.get(1) {
        Some(obj) => parse_color_space(document, obj)?,
        None => return Err(PricebookError::UnsupportedImage("indexed without base".to_string())),
    };
    let lookup: Vec<u8> = match parts.get(3).map(|o| resolve(document, o)) {
        Some(Object::String(bytes, _)) => bytes.clone(),
        Some(Object::Stream(s)) => stream_data(s)?,
        _ => return Err(PricebookError::UnsupportedImage("indexed lookup".to_string())),
    };

    let palette = match base {
        ColorModel::Gray => lookup.iter().map(|g| [*g, *g, *g]).collect(),
        ColorModel::Rgb => lookup.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
        ColorModel::Cmyk => lookup
            .chunks_exact(4)
            .map(|c| cmyk_to_rgb(c[0], c[1], c[2], c[3]))
            .collect(),
        ColorModel::Indexed(_) => return Err(PricebookError::UnsupportedImage("nested indexed".to_string())),
    };
    Ok(ColorModel::Indexed(palette))
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let inv = |v: u8| (255 - v as u16) * (255 - k as u16) / 255;
    [inv(c) as u8, inv(m) as u8, inv(y) as u8]
}

/// Raw (optionally Flate/LZW compressed) samples to RGBA.
fn decode_samples(document: &Document, stream: &Stream) -> Result<RgbaImage> {
    let width = get_number(document, &stream.dict, b"Width").unwrap_or(0.0) as u32;
    let height = get_number(document, &stream.dict, b"Height").unwrap_or(0.0) as u32;
    if width == 0 || height == 0 {
        return Err(PricebookError::UnsupportedImage("missing dimensions".to_string()));
    }

    let is_mask = matches!(stream.dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
    let bits = if is_mask {
        1
    } else {
        get_number(document, &stream.dict, b"BitsPerComponent").unwrap_or(8.0) as usize
    };
    if bits != 8 && bits != 1 {
        return Err(PricebookError::UnsupportedImage(format!("{} bits per component", bits)));
    }

    let model = color_model(document, stream)?;
    let data = stream_data(stream)?;
    let components = model.components();
    let row_bytes = (width as usize * components * bits + 7) / 8;
    if data.len() < row_bytes * height as usize {
        return Err(PricebookError::UnsupportedImage(format!(
            "expected {} bytes of samples, found {}",
            row_bytes * height as usize,
            data.len()
        )));
    }

    let sample = |row: &[u8], index: usize| -> u8 {
        if bits == 8 {
            row[index]
        } else {
            let bit = (row[index / 8] >> (7 - index % 8)) & 1;
            // 1-bit gray is 0/255; 1-bit indices stay 0/1
            match model {
                ColorModel::Indexed(_) => bit,
                _ => bit * 255,
            }
        }
    };

    let mut image = RgbaImage::new(width, height);
    for y in 0..height as usize {
        let row = &data[y * row_bytes..(y + 1) * row_bytes];
        for x in 0..width as usize {
            let base = x * components;
            let rgb = match &model {
                ColorModel::Gray => {
                    let g = sample(row, base);
                    [g, g, g]
                }
                ColorModel::Rgb => [sample(row, base), sample(row, base + 1), sample(row, base + 2)],
                ColorModel::Cmyk => cmyk_to_rgb(
                    sample(row, base),
                    sample(row, base + 1),
                    sample(row, base + 2),
                    sample(row, base + 3),
                ),
                ColorModel::Indexed(palette) => palette
                    .get(sample(row, base) as usize)
                    .copied()
                    .unwrap_or([0, 0, 0]),
            };
            image.put_pixel(x as u32, y as u32, image::Rgba([rgb[0], rgb[1], rgb[2], 255]));
        }
    }

    // stencil masks paint where the sample is 0
    if is_mask {
        for pixel in image.pixels_mut() {
            let painted = pixel[0] == 0;
            *pixel = if painted {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            };
        }
    }
    Ok(image)
}

fn apply_soft_mask(image: &mut RgbaImage, mask: &RgbaImage) {
    let alpha: GrayImage = if mask.dimensions() == image.dimensions() {
        DynamicImage::ImageRgba8(mask.clone()).to_luma8()
    } else {
        DynamicImage::ImageRgba8(mask.clone())
            .resize_exact(image.width(), image.height(), FilterType::Triangle)
            .to_luma8()
    };
    for (pixel, a) in image.pixels_mut().zip(alpha.pixels()) {
        pixel[3] = a[0];
    }
}

pub fn flatten_on_white(image: &RgbaImage) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let alpha = pixel[3] as u16;
        let blend = |c: u8| ((c as u16 * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    out
}
