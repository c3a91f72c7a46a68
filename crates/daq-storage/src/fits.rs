//! Minimal FITS codec for 2-D 16-bit primary images.
//!
//! Writes a single primary HDU: 80-character ASCII header cards padded to
//! 2880-byte blocks, followed by the big-endian image body padded the same way.
//! Pixel values go through the usual linear transform
//! `physical = BZERO + BSCALE * stored`, so unsigned 16-bit data is stored as
//! signed 16-bit with `BZERO = 32768`.
//!
//! Failures carry a numeric status code (the cfitsio numbering, so values
//! match what astronomers see from other tools) plus a diagnostic string.
//!
//! [`FitsReader`] parses what [`FitsFile`] writes and is used to verify
//! persisted frames.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// FITS logical record size.
pub const BLOCK_SIZE: usize = 2880;
/// Header card width.
pub const CARD_LEN: usize = 80;

/// Status codes reported by the codec.
pub mod status {
    pub const FILE_NOT_OPENED: i32 = 104;
    pub const FILE_NOT_CREATED: i32 = 105;
    pub const WRITE_ERROR: i32 = 106;
    pub const READ_ERROR: i32 = 108;
    pub const HEADER_NOT_EMPTY: i32 = 201;
    pub const KEY_NO_EXIST: i32 = 202;
    pub const BAD_KEYCHAR: i32 = 207;
    pub const BAD_ORDER: i32 = 208;
    pub const NO_END: i32 = 210;
    pub const BAD_BITPIX: i32 = 211;
    pub const BAD_NAXIS: i32 = 212;
    pub const BAD_ELEM_NUM: i32 = 308;
    pub const BAD_DIMEN: i32 = 320;
    pub const BAD_F2C: i32 = 402;
    pub const VALUE_TOO_LONG: i32 = 403;
    pub const NUM_OVERFLOW: i32 = 412;
}

/// Codec failure: status code plus diagnostic text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("FITS status {status}: {diagnostic}")]
pub struct FitsError {
    status: i32,
    diagnostic: String,
}

impl FitsError {
    pub fn new(status: i32, diagnostic: impl Into<String>) -> Self {
        Self {
            status,
            diagnostic: diagnostic.into(),
        }
    }

    fn io(status: i32, what: &str, path: &Path, err: std::io::Error) -> Self {
        Self::new(status, format!("{} {}: {}", what, path.display(), err))
    }

    pub fn status(&self) -> i32 {
        self.status
    }

    pub fn diagnostic(&self) -> &str {
        &self.diagnostic
    }

    /// Values were clipped to the storage type; data was still written.
    pub fn is_overflow(&self) -> bool {
        self.status == status::NUM_OVERFLOW
    }
}

/// Storage type of the image body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitpix {
    /// Signed 16-bit integers.
    Short,
}

impl Bitpix {
    fn code(self) -> i64 {
        match self {
            Bitpix::Short => 16,
        }
    }
}

/// Value of a header card.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Logical(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        HeaderValue::Logical(v)
    }
}

impl From<i32> for HeaderValue {
    fn from(v: i32) -> Self {
        HeaderValue::Integer(v as i64)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Integer(v)
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        HeaderValue::Float(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Text(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::Text(v)
    }
}

impl HeaderValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers are accepted where a float is expected.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HeaderValue::Logical(v) => Some(*v),
            _ => None,
        }
    }

    fn render(&self) -> Result<String, FitsError> {
        match self {
            HeaderValue::Logical(v) => Ok(format!("{:>20}", if *v { "T" } else { "F" })),
            HeaderValue::Integer(v) => Ok(format!("{:>20}", v)),
            HeaderValue::Float(v) => {
                if !v.is_finite() {
                    return Err(FitsError::new(
                        status::BAD_F2C,
                        format!("cannot write non-finite value {} to header", v),
                    ));
                }
                // Debug keeps a '.' or exponent so readers see a float.
                let text = format!("{:?}", v).replace('e', "E");
                Ok(format!("{:>20}", text))
            }
            HeaderValue::Text(v) => {
                if !v.is_ascii() || v.chars().any(|c| c.is_ascii_control()) {
                    return Err(FitsError::new(
                        status::BAD_KEYCHAR,
                        format!("string value '{}' is not printable ASCII", v),
                    ));
                }
                let quoted = format!("'{:<8}'", v.replace('\'', "''"));
                if quoted.len() > CARD_LEN - 10 {
                    return Err(FitsError::new(
                        status::VALUE_TOO_LONG,
                        format!("string value of {} characters does not fit a card", v.len()),
                    ));
                }
                Ok(format!("{:<20}", quoted))
            }
        }
    }
}

/// One parsed header card.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub key: String,
    pub value: Option<HeaderValue>,
    pub comment: String,
}

fn validate_key(key: &str) -> Result<(), FitsError> {
    let valid = !key.is_empty()
        && key.len() <= 8
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(FitsError::new(
            status::BAD_KEYCHAR,
            format!("illegal keyword name '{}'", key),
        ))
    }
}

fn format_card(key: &str, value: &HeaderValue, comment: &str) -> Result<String, FitsError> {
    validate_key(key)?;
    let mut card = format!("{:<8}= {}", key, value.render()?);
    if !comment.is_empty() && card.len() + 3 < CARD_LEN {
        card.push_str(" / ");
        card.push_str(comment);
    }
    card.truncate(CARD_LEN);
    Ok(format!("{:<80}", card))
}

fn pad_to_block(len: usize) -> usize {
    (BLOCK_SIZE - len % BLOCK_SIZE) % BLOCK_SIZE
}

#[derive(Debug, Clone, Copy)]
struct ImageSpec {
    width: usize,
    height: usize,
}

impl ImageSpec {
    fn pixels(&self) -> usize {
        self.width * self.height
    }
}

/// A FITS file being written.
///
/// Calls follow the order `create` → `create_image` → `write_key`* →
/// `write_image_u16`* → `close`. The header is flushed on the first body write.
pub struct FitsFile {
    path: PathBuf,
    out: BufWriter<File>,
    cards: Vec<String>,
    image: Option<ImageSpec>,
    header_flushed: bool,
    next_elem: usize,
    scale: f64,
    offset: f64,
}

impl FitsFile {
    /// Create a new file; with `overwrite` an existing file is replaced.
    pub fn create(path: impl AsRef<Path>, overwrite: bool) -> Result<Self, FitsError> {
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options
            .open(path)
            .map_err(|e| FitsError::io(status::FILE_NOT_CREATED, "could not create", path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            cards: Vec::new(),
            image: None,
            header_flushed: false,
            next_elem: 1,
            scale: 1.0,
            offset: 0.0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the mandatory keywords of a 2-D primary image.
    pub fn create_image(
        &mut self,
        width: usize,
        height: usize,
        bitpix: Bitpix,
    ) -> Result<(), FitsError> {
        if self.image.is_some() {
            return Err(FitsError::new(
                status::HEADER_NOT_EMPTY,
                "primary image already created",
            ));
        }
        if width == 0 || height == 0 {
            return Err(FitsError::new(
                status::BAD_NAXIS,
                format!("illegal image dimensions {}x{}", width, height),
            ));
        }
        let mandatory = [
            ("SIMPLE", HeaderValue::Logical(true), "file does conform to FITS standard"),
            ("BITPIX", HeaderValue::Integer(bitpix.code()), "number of bits per data pixel"),
            ("NAXIS", HeaderValue::Integer(2), "number of data axes"),
            ("NAXIS1", HeaderValue::Integer(width as i64), "length of data axis 1"),
            ("NAXIS2", HeaderValue::Integer(height as i64), "length of data axis 2"),
            ("EXTEND", HeaderValue::Logical(true), "FITS dataset may contain extensions"),
        ];
        for (key, value, comment) in mandatory.iter() {
            self.cards.push(format_card(key, value, comment)?);
        }
        self.image = Some(ImageSpec { width, height });
        Ok(())
    }

    /// Append a keyword card to the header.
    pub fn write_key(
        &mut self,
        key: &str,
        value: impl Into<HeaderValue>,
        comment: &str,
    ) -> Result<(), FitsError> {
        if self.image.is_none() {
            return Err(FitsError::new(
                status::BAD_ORDER,
                format!("keyword {} written before the image was created", key),
            ));
        }
        if self.header_flushed {
            return Err(FitsError::new(
                status::BAD_ORDER,
                format!("keyword {} written after image data", key),
            ));
        }
        let card = format_card(key, &value.into(), comment)?;
        self.cards.push(card);
        Ok(())
    }

    /// Set the linear transform applied to pixel values on write.
    pub fn set_scale_offset(&mut self, scale: f64, offset: f64) -> Result<(), FitsError> {
        if scale == 0.0 || !scale.is_finite() || !offset.is_finite() {
            return Err(FitsError::new(
                status::BAD_F2C,
                format!("illegal scale/offset {} / {}", scale, offset),
            ));
        }
        self.scale = scale;
        self.offset = offset;
        Ok(())
    }

    fn flush_header(&mut self) -> Result<(), FitsError> {
        let mut header = self.cards.concat();
        header.push_str(&format!("{:<80}", "END"));
        header.push_str(&" ".repeat(pad_to_block(header.len())));
        self.out.write_all(header.as_bytes()).map_err(|e| {
            FitsError::io(status::WRITE_ERROR, "error writing header to", &self.path, e)
        })?;
        self.header_flushed = true;
        Ok(())
    }

    /// Write unsigned pixels starting at 1-based element `first_elem`.
    ///
    /// Elements must be written in order. Values that do not fit the
    /// storage type after scaling are clipped; the whole slice is still
    /// written and `NUM_OVERFLOW` is reported afterwards.
    pub fn write_image_u16(&mut self, first_elem: usize, pixels: &[u16]) -> Result<(), FitsError> {
        let spec = self.image.ok_or_else(|| {
            FitsError::new(status::BAD_ORDER, "image data written before the image was created")
        })?;
        if first_elem != self.next_elem {
            return Err(FitsError::new(
                status::BAD_ELEM_NUM,
                format!(
                    "first element {} out of sequence, expected {}",
                    first_elem, self.next_elem
                ),
            ));
        }
        let end = first_elem - 1 + pixels.len();
        if end > spec.pixels() {
            return Err(FitsError::new(
                status::BAD_DIMEN,
                format!(
                    "writing {} elements at {} exceeds image size {}",
                    pixels.len(),
                    first_elem,
                    spec.pixels()
                ),
            ));
        }
        if !self.header_flushed {
            self.flush_header()?;
        }

        let mut overflowed = 0usize;
        let mut body = Vec::with_capacity(pixels.len() * 2);
        for &pixel in pixels {
            let stored = ((pixel as f64 - self.offset) / self.scale).round();
            let clipped = stored.clamp(i16::MIN as f64, i16::MAX as f64);
            if clipped != stored {
                overflowed += 1;
            }
            body.extend_from_slice(&(clipped as i16).to_be_bytes());
        }
        self.out.write_all(&body).map_err(|e| {
            FitsError::io(status::WRITE_ERROR, "error writing image to", &self.path, e)
        })?;
        self.next_elem = end + 1;

        if overflowed > 0 {
            return Err(FitsError::new(
                status::NUM_OVERFLOW,
                format!("{} pixel values overflowed and were clipped", overflowed),
            ));
        }
        Ok(())
    }

    /// Zero-fill any unwritten pixels, pad the last block and flush.
    pub fn close(mut self) -> Result<(), FitsError> {
        let spec = self
            .image
            .ok_or_else(|| FitsError::new(status::BAD_ORDER, "closing a file without an image"))?;
        if !self.header_flushed {
            self.flush_header()?;
        }
        let written = (self.next_elem - 1) * 2;
        let total = spec.pixels() * 2;
        let tail = (total - written) + pad_to_block(total);
        self.out
            .write_all(&vec![0u8; tail])
            .and_then(|_| self.out.flush())
            .map_err(|e| FitsError::io(status::WRITE_ERROR, "error closing", &self.path, e))?;
        Ok(())
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Parsed primary HDU of a 16-bit image file.
#[derive(Debug, Clone)]
pub struct FitsReader {
    cards: Vec<Card>,
    width: usize,
    height: usize,
    pixels: Vec<u16>,
}

fn parse_value(raw: &str) -> Result<(Option<HeaderValue>, String), FitsError> {
    let trimmed = raw.trim_start();
    if let Some(rest) = trimmed.strip_prefix('\'') {
        let mut text = String::new();
        let mut chars = rest.char_indices().peekable();
        let mut end = None;
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    text.push('\'');
                    chars.next();
                } else {
                    end = Some(i + 1);
                    break;
                }
            } else {
                text.push(c);
            }
        }
        let end = end.ok_or_else(|| {
            FitsError::new(status::BAD_F2C, format!("unterminated string in '{}'", raw))
        })?;
        let comment = rest[end..]
            .trim_start()
            .strip_prefix('/')
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        return Ok((Some(HeaderValue::Text(text.trim_end().to_string())), comment));
    }

    let (value, comment) = match trimmed.split_once('/') {
        Some((v, c)) => (v.trim(), c.trim().to_string()),
        None => (trimmed.trim(), String::new()),
    };
    let parsed = match value {
        "" => None,
        "T" => Some(HeaderValue::Logical(true)),
        "F" => Some(HeaderValue::Logical(false)),
        v => {
            if let Ok(i) = v.parse::<i64>() {
                Some(HeaderValue::Integer(i))
            } else if let Ok(f) = v.replace('D', "E").parse::<f64>() {
                Some(HeaderValue::Float(f))
            } else {
                return Err(FitsError::new(
                    status::BAD_F2C,
                    format!("unparseable header value '{}'", v),
                ));
            }
        }
    };
    Ok((parsed, comment))
}

fn parse_card(raw: &str) -> Result<Card, FitsError> {
    let key = raw.get(..8).unwrap_or(raw).trim_end().to_string();
    if raw.get(8..10) == Some("= ") {
        let (value, comment) = parse_value(raw.get(10..).unwrap_or(""))?;
        Ok(Card {
            key,
            value,
            comment,
        })
    } else {
        Ok(Card {
            key,
            value: None,
            comment: raw.get(8..).unwrap_or("").trim().to_string(),
        })
    }
}

impl FitsReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FitsError> {
        let path = path.as_ref();
        let mut bytes = Vec::new();
        File::open(path)
            .map_err(|e| FitsError::io(status::FILE_NOT_OPENED, "could not open", path, e))?
            .read_to_end(&mut bytes)
            .map_err(|e| FitsError::io(status::READ_ERROR, "error reading", path, e))?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, FitsError> {
        let mut cards = Vec::new();
        let mut offset = 0;
        let mut found_end = false;
        while offset + CARD_LEN <= bytes.len() {
            let raw = std::str::from_utf8(&bytes[offset..offset + CARD_LEN])
                .map_err(|_| FitsError::new(status::BAD_KEYCHAR, "header card is not ASCII"))?;
            offset += CARD_LEN;
            let card = parse_card(raw)?;
            if card.key == "END" {
                found_end = true;
                break;
            }
            cards.push(card);
        }
        if !found_end {
            return Err(FitsError::new(status::NO_END, "header has no END card"));
        }
        let data_start = offset + pad_to_block(offset);

        let mut reader = Self {
            cards,
            width: 0,
            height: 0,
            pixels: Vec::new(),
        };
        let bitpix = reader.required_int("BITPIX")?;
        if bitpix != 16 {
            return Err(FitsError::new(
                status::BAD_BITPIX,
                format!("unsupported BITPIX {}", bitpix),
            ));
        }
        let naxis = reader.required_int("NAXIS")?;
        if naxis != 2 {
            return Err(FitsError::new(
                status::BAD_NAXIS,
                format!("expected a 2-D image, NAXIS = {}", naxis),
            ));
        }
        let width = usize::try_from(reader.required_int("NAXIS1")?)
            .map_err(|_| FitsError::new(status::BAD_NAXIS, "negative NAXIS1"))?;
        let height = usize::try_from(reader.required_int("NAXIS2")?)
            .map_err(|_| FitsError::new(status::BAD_NAXIS, "negative NAXIS2"))?;
        let bzero = reader.float("BZERO").unwrap_or(0.0);
        let bscale = reader.float("BSCALE").unwrap_or(1.0);

        let body_len = width * height * 2;
        let body = bytes
            .get(data_start..data_start + body_len)
            .ok_or_else(|| FitsError::new(status::READ_ERROR, "image body is truncated"))?;
        reader.pixels = body
            .chunks_exact(2)
            .map(|b| {
                let stored = i16::from_be_bytes([b[0], b[1]]) as f64;
                (bzero + bscale * stored).round().clamp(0.0, u16::MAX as f64) as u16
            })
            .collect();
        reader.width = width;
        reader.height = height;
        Ok(reader)
    }

    fn required_int(&self, key: &str) -> Result<i64, FitsError> {
        self.int(key).ok_or_else(|| {
            FitsError::new(status::KEY_NO_EXIST, format!("keyword {} not found", key))
        })
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Keywords in header order.
    pub fn keys(&self) -> Vec<&str> {
        self.cards.iter().map(|c| c.key.as_str()).collect()
    }

    pub fn value(&self, key: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|c| c.key == key)
            .and_then(|c| c.value.as_ref())
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.value(key).and_then(HeaderValue::as_i64)
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        self.value(key).and_then(HeaderValue::as_f64)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(HeaderValue::as_str)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }
}
