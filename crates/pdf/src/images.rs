//! Image XObject decoding, re-embedding and page rasterization.

use image::{DynamicImage, GrayImage, Rgb, RgbImage, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use safedoc_render::Rect;
use zeroize::Zeroize;

use crate::error::{PdfError, Result};
use crate::filters::{decode_stream, stream_filters};
use crate::matrix::Matrix;
use crate::redact::replace_contents;
use crate::utils::{get_number, name_of, resolve};

/// Resource name of the bitmap that replaces a rasterized page.
pub const RASTER_IMAGE: &[u8] = b"SdIm0";

fn dict_int(doc: &Document, stream: &Stream, key: &[u8]) -> Option<u32> {
    stream
        .dict
        .get(key)
        .ok()
        .and_then(|o| get_number(resolve(doc, o)))
        .filter(|v| *v > 0.0)
        .map(|v| v as u32)
}

/// Number of colour components, `None` for colour spaces we do not decode.
fn components(doc: &Document, stream: &Stream) -> Option<u32> {
    let cs = resolve(doc, stream.dict.get(b"ColorSpace").ok()?);
    match cs {
        Object::Name(n) => match n.as_slice() {
            b"DeviceRGB" | b"CalRGB" => Some(3),
            b"DeviceGray" | b"CalGray" => Some(1),
            b"DeviceCMYK" => Some(4),
            _ => None,
        },
        Object::Array(arr) => match arr.first().and_then(name_of) {
            Some(b"ICCBased") => {
                let Object::Stream(profile) = resolve(doc, arr.get(1)?) else {
                    return None;
                };
                dict_int(doc, profile, b"N")
            }
            Some(b"CalRGB") => Some(3),
            Some(b"CalGray") => Some(1),
            _ => None,
        },
        _ => None,
    }
}

/// Decodes an image XObject into pixels.
///
/// Supports DCT images and Flate, LZW, RunLength or unfiltered samples at
/// 8 bits per component in gray, RGB or CMYK, plus 1-bit gray. Anything
/// else yields `None`.
pub fn decode_image(doc: &Document, id: ObjectId) -> Option<DynamicImage> {
    let Ok(Object::Stream(stream)) = doc.get_object(id) else {
        return None;
    };
    if matches!(stream.dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        return None;
    }
    let width = dict_int(doc, stream, b"Width")?;
    let height = dict_int(doc, stream, b"Height")?;
    let filters = stream_filters(doc, stream);

    match filters.last().map(Vec::as_slice) {
        Some(b"DCTDecode") if filters.len() == 1 => {
            return image::load_from_memory(&stream.content).ok();
        }
        Some(b"DCTDecode") | Some(b"JPXDecode") | Some(b"JBIG2Decode") | Some(b"CCITTFaxDecode") => {
            return None;
        }
        _ => {}
    }

    let mut data = decode_stream(doc, stream)?;
    let bpc = dict_int(doc, stream, b"BitsPerComponent").unwrap_or(8);
    let n = components(doc, stream)?;
    let image = samples_to_image(&data, width, height, n, bpc);
    data.zeroize();
    image
}

fn samples_to_image(data: &[u8], width: u32, height: u32, n: u32, bpc: u32) -> Option<DynamicImage> {
    let pixels = (width as usize).checked_mul(height as usize)?;
    match (n, bpc) {
        (1, 8) => {
            let raw = data.get(..pixels)?.to_vec();
            GrayImage::from_raw(width, height, raw).map(DynamicImage::ImageLuma8)
        }
        (3, 8) => {
            let raw = data.get(..pixels * 3)?.to_vec();
            RgbImage::from_raw(width, height, raw).map(DynamicImage::ImageRgb8)
        }
        (4, 8) => {
            let raw = data.get(..pixels * 4)?;
            let mut img = RgbImage::new(width, height);
            for (pixel, cmyk) in img.pixels_mut().zip(raw.chunks_exact(4)) {
                let k = 255 - cmyk[3] as u32;
                let channel = |c: u8| ((255 - c as u32) * k / 255) as u8;
                *pixel = Rgb([channel(cmyk[0]), channel(cmyk[1]), channel(cmyk[2])]);
            }
            Some(DynamicImage::ImageRgb8(img))
        }
        (1, 1) => {
            let row_bytes = (width as usize).div_ceil(8);
            if data.len() < row_bytes * height as usize {
                return None;
            }
            let img = GrayImage::from_fn(width, height, |x, y| {
                let byte = data[y as usize * row_bytes + x as usize / 8];
                let bit = (byte >> (7 - (x % 8))) & 1;
                image::Luma([if bit == 1 { 255 } else { 0 }])
            });
            Some(DynamicImage::ImageLuma8(img))
        }
        _ => None,
    }
}

/// Flattens alpha onto white.
pub fn to_opaque_rgb(image: &RgbaImage) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (dst, src) in out.pixels_mut().zip(image.pixels()) {
        let a = src[3] as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a)) / 255) as u8;
        *dst = Rgb([blend(src[0]), blend(src[1]), blend(src[2])]);
    }
    out
}

fn rgb_stream(image: &RgbImage) -> Stream {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width() as i64,
        "Height" => image.height() as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    let mut stream = Stream::new(dict, image.as_raw().clone());
    if let Err(e) = stream.compress() {
        log::warn!("[Image] stream left uncompressed: {}", e);
    }
    stream
}

/// Overwrites an image XObject in place with opaque RGB8 samples.
pub fn replace_image(doc: &mut Document, id: ObjectId, image: &RgbaImage) -> Result<()> {
    let rgb = to_opaque_rgb(image);
    let replacement = rgb_stream(&rgb);
    match doc.get_object_mut(id) {
        Ok(Object::Stream(stream)) => {
            stream.content.zeroize();
            *stream = replacement;
            log::info!("[Image] re-embedded {:?} ({}x{})", id, rgb.width(), rgb.height());
            Ok(())
        }
        _ => Err(PdfError::Image(format!("object {:?} is not an image stream", id))),
    }
}

/// Replaces the whole page with a single bitmap of the rendered page.
///
/// The page box becomes the bitmap size at `dpi`, with rotation and crop
/// already applied by the renderer.
pub fn replace_page_with_raster(
    doc: &mut Document,
    page_id: ObjectId,
    image: &RgbaImage,
    dpi: u32,
) -> Result<()> {
    let scale = 72.0 / dpi.max(1) as f32;
    let width = image.width() as f32 * scale;
    let height = image.height() as f32 * scale;

    let image_id = doc.add_object(rgb_stream(&to_opaque_rgb(image)));
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(width),
                    0.into(),
                    0.into(),
                    Object::Real(height),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(RASTER_IMAGE.to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let data = content
        .encode()
        .map_err(|e| PdfError::Write(format!("encode content: {}", e)))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, data));
    replace_contents(doc, page_id, content_id)?;

    let page_box: Object = vec![0.into(), 0.into(), Object::Real(width), Object::Real(height)].into();
    let page = doc.get_dictionary_mut(page_id)?;
    page.set(
        "Resources",
        dictionary! {
            "XObject" => dictionary! { "SdIm0" => image_id },
        },
    );
    page.set("MediaBox", page_box.clone());
    page.set("CropBox", page_box);
    page.set("Rotate", 0);
    for key in [b"BleedBox".as_slice(), b"TrimBox", b"ArtBox", b"Group"] {
        page.remove(key);
    }
    log::info!(
        "[Image] page {:?} replaced by {}x{} raster",
        page_id,
        image.width(),
        image.height()
    );
    Ok(())
}

/// Maps a user-space rectangle onto the pixel grid of a placed image.
pub fn page_rect_to_pixels(ctm: &Matrix, width: u32, height: u32, rect: &Rect) -> Option<Rect> {
    let inverse = ctm.invert()?;
    let corners = [
        (rect.x0, rect.y0),
        (rect.x1, rect.y0),
        (rect.x0, rect.y1),
        (rect.x1, rect.y1),
    ];
    let pixels: Vec<(f32, f32)> = corners
        .iter()
        .map(|(x, y)| {
            let (u, v) = inverse.apply(*x, *y);
            (u * width as f32, (1.0 - v) * height as f32)
        })
        .collect();
    Rect::from_points(&pixels)
}
