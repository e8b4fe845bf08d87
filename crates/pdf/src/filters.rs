//! Stream filter decoding for image samples.
//!
//! lopdf refuses to decompress streams whose `/Subtype` is `/Image`, so image
//! XObjects are decoded here: Flate and LZW with their PNG/TIFF predictors,
//! plus RunLength.

use std::io::Read;

use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object, Stream};
use weezl::{decode::Decoder as LzwDecoder, BitOrder};
use zeroize::Zeroize;

use crate::utils::{get_number, name_of, resolve};

/// Predictor settings from a `/DecodeParms` dictionary.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Predictor {
    kind: u32,
    colors: usize,
    bits: usize,
    columns: usize,
}

impl Predictor {
    fn from_params(doc: &Document, params: Option<&Dictionary>) -> Self {
        let int = |key: &[u8], default: u32| {
            params
                .and_then(|p| p.get(key).ok())
                .and_then(|o| get_number(resolve(doc, o)))
                .map(|v| v as u32)
                .unwrap_or(default)
        };
        Self {
            kind: int(b"Predictor", 1),
            colors: int(b"Colors", 1).max(1) as usize,
            bits: int(b"BitsPerComponent", 8).max(1) as usize,
            columns: int(b"Columns", 1).max(1) as usize,
        }
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits).div_ceil(8).max(1)
    }

    fn row_bytes(&self) -> usize {
        (self.colors * self.bits * self.columns).div_ceil(8)
    }

    fn apply(&self, data: Vec<u8>) -> Option<Vec<u8>> {
        match self.kind {
            0 | 1 => Some(data),
            2 => self.undo_tiff(data),
            10..=15 => self.undo_png(data),
            other => {
                log::debug!("[Filter] unknown predictor {}", other);
                None
            }
        }
    }

    /// TIFF predictor 2, 8-bit components only.
    fn undo_tiff(&self, mut data: Vec<u8>) -> Option<Vec<u8>> {
        if self.bits != 8 {
            return None;
        }
        let row = self.row_bytes();
        let bpp = self.bytes_per_pixel();
        for line in data.chunks_mut(row) {
            for i in bpp..line.len() {
                line[i] = line[i].wrapping_add(line[i - bpp]);
            }
        }
        Some(data)
    }

    /// PNG predictors: every row carries its own filter-type byte.
    fn undo_png(&self, mut data: Vec<u8>) -> Option<Vec<u8>> {
        let row = self.row_bytes();
        let bpp = self.bytes_per_pixel();
        let mut out = Vec::with_capacity(data.len() / (row + 1) * row);
        let mut prev = vec![0u8; row];

        for line in data.chunks(row + 1) {
            let (&filter, encoded) = line.split_first()?;
            let mut cur = encoded.to_vec();
            cur.resize(row, 0);
            for i in 0..row {
                let left = if i >= bpp { cur[i - bpp] } else { 0 };
                let up = prev[i];
                let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
                cur[i] = match filter {
                    0 => cur[i],
                    1 => cur[i].wrapping_add(left),
                    2 => cur[i].wrapping_add(up),
                    3 => cur[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                    4 => cur[i].wrapping_add(paeth(left, up, up_left)),
                    _ => return None,
                };
            }
            out.extend_from_slice(&cur);
            prev.zeroize();
            prev = cur;
        }
        prev.zeroize();
        data.zeroize();
        Some(out)
    }
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Filter names of a stream in application order.
pub fn stream_filters(doc: &Document, stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter").map(|o| resolve(doc, o)) {
        Ok(Object::Name(n)) => vec![n.clone()],
        Ok(Object::Array(arr)) => arr.iter().filter_map(name_of).map(<[u8]>::to_vec).collect(),
        _ => Vec::new(),
    }
}

/// `/DecodeParms` entry for the filter at `index`.
fn decode_params<'a>(doc: &'a Document, stream: &'a Stream, index: usize) -> Option<&'a Dictionary> {
    match resolve(doc, stream.dict.get(b"DecodeParms").ok()?) {
        Object::Dictionary(d) if index == 0 => Some(d),
        Object::Array(arr) => match resolve(doc, arr.get(index)?) {
            Object::Dictionary(d) => Some(d),
            _ => None,
        },
        _ => None,
    }
}

fn inflate(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    match ZlibDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => Some(out),
        // Truncated trailers are common in scanner output; keep what inflated.
        Err(e) if !out.is_empty() => {
            log::debug!("[Filter] partial flate stream: {}", e);
            Some(out)
        }
        Err(e) => {
            log::debug!("[Filter] flate decode failed: {}", e);
            None
        }
    }
}

fn unlzw(doc: &Document, params: Option<&Dictionary>, data: &[u8]) -> Option<Vec<u8>> {
    let early_change = params
        .and_then(|p| p.get(b"EarlyChange").ok())
        .and_then(|o| get_number(resolve(doc, o)))
        .map_or(true, |v| v != 0.0);
    let mut decoder = if early_change {
        LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        LzwDecoder::new(BitOrder::Msb, 8)
    };
    decoder
        .decode(data)
        .map_err(|e| log::debug!("[Filter] lzw decode failed: {}", e))
        .ok()
}

fn run_length(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let len = data[i];
        i += 1;
        match len {
            128 => break,
            0..=127 => {
                let n = len as usize + 1;
                out.extend_from_slice(data.get(i..i + n)?);
                i += n;
            }
            _ => {
                let byte = *data.get(i)?;
                out.extend(std::iter::repeat(byte).take(257 - len as usize));
                i += 1;
            }
        }
    }
    Some(out)
}

/// Runs the stream's byte filters and returns the decoded samples.
///
/// Image codecs (DCT, JPX, JBIG2, CCITT) are not byte filters and yield
/// `None`, as does any filter or predictor we do not know.
pub fn decode_stream(doc: &Document, stream: &Stream) -> Option<Vec<u8>> {
    let mut data = stream.content.clone();
    for (index, name) in stream_filters(doc, stream).iter().enumerate() {
        let params = decode_params(doc, stream, index);
        let decoded = match name.as_slice() {
            b"FlateDecode" | b"Fl" => inflate(&data)
                .and_then(|raw| Predictor::from_params(doc, params).apply(raw)),
            b"LZWDecode" | b"LZW" => unlzw(doc, params, &data)
                .and_then(|raw| Predictor::from_params(doc, params).apply(raw)),
            b"RunLengthDecode" | b"RL" => run_length(&data),
            other => {
                log::debug!("[Filter] unsupported filter {}", String::from_utf8_lossy(other));
                None
            }
        };
        data.zeroize();
        data = decoded?;
    }
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use lopdf::dictionary;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_flate_image_stream() {
        let doc = Document::with_version("1.5");
        let stream = Stream::new(
            dictionary! { "Subtype" => "Image", "Filter" => "FlateDecode" },
            deflate(&[1, 2, 3, 4]),
        );
        assert_eq!(decode_stream(&doc, &stream), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_png_up_and_sub_predictors() {
        // Two rows of two gray pixels: [10, 20] then [15, 25].
        // Row one uses Sub, row two uses Up.
        let encoded = [1, 10, 10, 2, 5, 5];
        let doc = Document::with_version("1.5");
        let stream = Stream::new(
            dictionary! {
                "Filter" => "FlateDecode",
                "DecodeParms" => dictionary! { "Predictor" => 12, "Columns" => 2 },
            },
            deflate(&encoded),
        );
        assert_eq!(decode_stream(&doc, &stream), Some(vec![10, 20, 15, 25]));
    }

    #[test]
    fn test_tiff_predictor_rgb() {
        let predictor = Predictor { kind: 2, colors: 3, bits: 8, columns: 2 };
        let out = predictor.apply(vec![10, 20, 30, 1, 2, 3]).unwrap();
        assert_eq!(out, vec![10, 20, 30, 11, 22, 33]);
    }

    #[test]
    fn test_paeth_picks_nearest() {
        assert_eq!(paeth(10, 20, 10), 20);
        assert_eq!(paeth(20, 10, 10), 20);
        assert_eq!(paeth(0, 0, 0), 0);
    }

    #[test]
    fn test_lzw_stream() {
        let raw = b"aaaaaaaaaabbbbbbbbbb".to_vec();
        let encoded = weezl::encode::Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
            .encode(&raw)
            .unwrap();
        let doc = Document::with_version("1.5");
        let stream = Stream::new(dictionary! { "Filter" => "LZWDecode" }, encoded);
        assert_eq!(decode_stream(&doc, &stream), Some(raw));
    }

    #[test]
    fn test_run_length() {
        assert_eq!(run_length(&[2, b'a', b'b', b'c', 254, b'z', 128]), Some(b"abczzz".to_vec()));
        assert_eq!(run_length(&[5, b'a']), None);
    }

    #[test]
    fn test_codec_filter_is_none() {
        let doc = Document::with_version("1.5");
        let stream = Stream::new(dictionary! { "Filter" => "DCTDecode" }, vec![0xFF, 0xD8]);
        assert!(decode_stream(&doc, &stream).is_none());
    }
}
