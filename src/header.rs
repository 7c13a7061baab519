//! The fixed 0x7000-byte G3A container header.
//!
//! # Layout
//! The header is modelled as an explicit field table ([`layout`]) rather
//! than a packed in-memory struct.  Every multi-byte scalar is big-endian.
//!
//! | Offset   | Size    | Field                                        |
//! |----------|---------|----------------------------------------------|
//! | `0x0000` | 14      | magic                                        |
//! | `0x000E` | 7       | copy protection (derived from file size)     |
//! | `0x0016` | 2       | CRC (unused, left zero)                      |
//! | `0x0020` | 4       | checksum                                     |
//! | `0x0024` | 2       | flags, always `01 01`                        |
//! | `0x002E` | 4       | offset of the trailing checksum copy, from `0x7000` |
//! | `0x0040` | 0x1C    | basic name                                   |
//! | `0x005C` | 4       | total file size                              |
//! | `0x0060` | 0x0B    | internal name (`@NAME`)                      |
//! | `0x006B` | 8x0x18  | localized names                              |
//! | `0x0130` | 0x0C    | version                                      |
//! | `0x013C` | 15      | timestamp `YYYY.MMDD.HHMM`                   |
//! | `0x0170` | 8x0x24  | long localized names                         |
//! | `0x0290` | 0x300   | monochrome icon                              |
//! | `0x0EBC` | 0x144   | file name                                    |
//! | `0x1000` | 0x2E00  | unselected icon                              |
//! | `0x4000` | 0x2E00  | selected icon                                |
//! | `0x7000` |         | payload, then a 4-byte checksum copy         |
//!
//! String fields are NUL-padded and always keep at least one trailing NUL.

use std::io::{self, Read, Write};
use std::ops::Range;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use thiserror::Error;

use crate::icon::{Icon, IconSet, MonoIcon, ICON_BYTES};
use crate::names::{Locale, LocalizedNames};

pub const HEADER_SIZE: usize = 0x7000;

pub const MAGIC: [u8; 14] = [
    0xAA, 0xAC, 0xBD, 0xAF, 0x90, 0x88, 0x9A,
    0x8D, 0xD3, 0xFF, 0xFE, 0xFF, 0xFE, 0xFF,
];

/// Value of the two flag bytes at `0x24`.
pub const FLAGS: [u8; 2] = [0x01, 0x01];

/// Header plus the trailing checksum copy.  `file_size = payload + this`.
pub const SIZE_OVERHEAD: u32 = HEADER_SIZE as u32 + 4;

pub const DEFAULT_VERSION: &str = "01.00.0000";

pub const TIMESTAMP_FORMAT: &str = "%Y.%m%d.%H%M";

/// A fixed region of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub offset: usize,
    pub len:    usize,
}

impl Field {
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    pub const fn end(self) -> usize {
        self.offset + self.len
    }

    pub const fn range(self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    /// The `i`-th of a run of equally sized slots starting at this field.
    pub const fn slot(self, i: usize) -> Field {
        Field::new(self.offset + i * self.len, self.len)
    }
}

pub mod layout {
    use super::Field;
    use crate::icon::{ICON_BYTES, MONO_ICON_BYTES};

    pub const MAGIC:           Field = Field::new(0x0000, 14);
    pub const CPROT:           Field = Field::new(0x000E, 7);
    pub const CRC:             Field = Field::new(0x0016, 2);
    pub const CHECKSUM:        Field = Field::new(0x0020, 4);
    pub const FLAGS:           Field = Field::new(0x0024, 2);
    pub const CHECKSUM_OFFSET: Field = Field::new(0x002E, 4);
    pub const NAME_BASIC:      Field = Field::new(0x0040, 0x1C);
    pub const FILE_SIZE:       Field = Field::new(0x005C, 4);
    pub const NAME_INTERNAL:   Field = Field::new(0x0060, 0x0B);
    /// First of 8 localized name slots.
    pub const NAME_LOCALIZED:  Field = Field::new(0x006B, 0x18);
    pub const VERSION:         Field = Field::new(0x0130, 0x0C);
    pub const TIMESTAMP:       Field = Field::new(0x013C, 15);
    /// First of 8 long localized name slots.
    pub const NAME_LONG:       Field = Field::new(0x0170, 0x24);
    pub const ICON_MONO:       Field = Field::new(0x0290, MONO_ICON_BYTES);
    pub const FILENAME:        Field = Field::new(0x0EBC, 0x144);
    pub const ICON_UNSELECTED: Field = Field::new(0x1000, ICON_BYTES);
    pub const ICON_SELECTED:   Field = Field::new(0x4000, ICON_BYTES);

    pub const LOCALIZED_SLOTS: usize = 8;
}

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Container is {0} bytes, shorter than the 0x7000-byte header")]
    Truncated(usize),
    #[error("Invalid magic number")]
    InvalidMagic,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct G3aHeader {
    pub magic:           [u8; 14],
    pub cprot:           [u8; 7],
    pub crc:             u16,
    pub checksum:        u32,
    pub flags:           [u8; 2],
    pub checksum_offset: u32,
    pub name_basic:      String,
    pub file_size:       u32,
    pub name_internal:   String,
    pub localized_names: [String; 8],
    pub version:         String,
    pub timestamp:       String,
    pub long_names:      [String; 8],
    pub filename:        String,
    pub icons:           IconSet,
}

impl G3aHeader {
    /// A header with the constant fields set, the default version, and the
    /// current local time.
    pub fn new() -> Self {
        let mut h = Self {
            magic:   MAGIC,
            flags:   FLAGS,
            version: DEFAULT_VERSION.to_owned(),
            ..Self::default()
        };
        h.fill_timestamp();
        h
    }

    // ── Derived fields ───────────────────────────────────────────────────────

    /// Set the size-dependent fields for a payload of `payload_size` bytes.
    pub fn fill_size(&mut self, payload_size: u32) {
        self.checksum_offset = payload_size;
        self.file_size = payload_size.wrapping_add(SIZE_OVERHEAD);
    }

    /// Derive the copy-protection block from the current file size.
    pub fn fill_cprot(&mut self) {
        self.cprot = copy_protection(self.file_size);
    }

    pub fn fill_icons(&mut self, icons: &IconSet) {
        self.icons = icons.clone();
    }

    pub fn fill_version(&mut self, version: &str) {
        self.version = version.to_owned();
    }

    pub fn fill_timestamp(&mut self) {
        self.fill_timestamp_at(&Local::now());
    }

    pub fn fill_timestamp_at<Tz: TimeZone>(&mut self, at: &DateTime<Tz>)
    where
        Tz::Offset: std::fmt::Display,
    {
        self.timestamp = at.format(TIMESTAMP_FORMAT).to_string();
    }

    /// Store the last path segment of `path`.
    pub fn fill_filename(&mut self, path: &Path) {
        self.filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    /// Fill the basic, internal and localized names.
    ///
    /// The internal name is `@` followed by the first 9 bytes of its source,
    /// upper-cased.  Unset localized slots take the basic name.
    pub fn fill_names(&mut self, names: &LocalizedNames) {
        self.name_basic = names.basic.clone();

        let src = truncate_bytes(names.internal_source(), layout::NAME_INTERNAL.len - 2);
        self.name_internal = format!("@{}", src.to_ascii_uppercase());

        for lc in Locale::ALL {
            self.localized_names[lc.index()] = names.resolve(lc).to_owned();
        }
    }

    // ── Serialization ────────────────────────────────────────────────────────

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[layout::MAGIC.range()].copy_from_slice(&self.magic);
        buf[layout::CPROT.range()].copy_from_slice(&self.cprot);
        BigEndian::write_u16(&mut buf[layout::CRC.range()], self.crc);
        BigEndian::write_u32(&mut buf[layout::CHECKSUM.range()], self.checksum);
        buf[layout::FLAGS.range()].copy_from_slice(&self.flags);
        BigEndian::write_u32(&mut buf[layout::CHECKSUM_OFFSET.range()], self.checksum_offset);
        put_str(&mut buf, layout::NAME_BASIC, &self.name_basic);
        BigEndian::write_u32(&mut buf[layout::FILE_SIZE.range()], self.file_size);
        put_str(&mut buf, layout::NAME_INTERNAL, &self.name_internal);
        for (i, name) in self.localized_names.iter().enumerate() {
            put_str(&mut buf, layout::NAME_LOCALIZED.slot(i), name);
        }
        put_str(&mut buf, layout::VERSION, &self.version);
        put_str(&mut buf, layout::TIMESTAMP, &self.timestamp);
        for (i, name) in self.long_names.iter().enumerate() {
            put_str(&mut buf, layout::NAME_LONG.slot(i), name);
        }
        if let Some(mono) = &self.icons.mono {
            buf[layout::ICON_MONO.range()].copy_from_slice(mono.as_bytes());
        }
        put_str(&mut buf, layout::FILENAME, &self.filename);
        buf[layout::ICON_UNSELECTED.range()].copy_from_slice(self.icons.unselected.as_bytes());
        buf[layout::ICON_SELECTED.range()].copy_from_slice(self.icons.selected.as_bytes());
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < HEADER_SIZE {
            return Err(HeaderError::Truncated(data.len()));
        }
        if data[layout::MAGIC.range()] != MAGIC {
            return Err(HeaderError::InvalidMagic);
        }

        let mut cprot = [0u8; 7];
        cprot.copy_from_slice(&data[layout::CPROT.range()]);
        let mut flags = [0u8; 2];
        flags.copy_from_slice(&data[layout::FLAGS.range()]);

        let icons = slice_icons(data)?;

        Ok(Self {
            magic: MAGIC,
            cprot,
            crc:             BigEndian::read_u16(&data[layout::CRC.range()]),
            checksum:        BigEndian::read_u32(&data[layout::CHECKSUM.range()]),
            flags,
            checksum_offset: BigEndian::read_u32(&data[layout::CHECKSUM_OFFSET.range()]),
            name_basic:      get_str(data, layout::NAME_BASIC),
            file_size:       BigEndian::read_u32(&data[layout::FILE_SIZE.range()]),
            name_internal:   get_str(data, layout::NAME_INTERNAL),
            localized_names: std::array::from_fn(|i| get_str(data, layout::NAME_LOCALIZED.slot(i))),
            version:         get_str(data, layout::VERSION),
            timestamp:       get_str(data, layout::TIMESTAMP),
            long_names:      std::array::from_fn(|i| get_str(data, layout::NAME_LONG.slot(i))),
            filename:        get_str(data, layout::FILENAME),
            icons,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    pub fn read<R: Read>(reader: R) -> Result<Self, HeaderError> {
        Self::from_bytes(&read_header_bytes(reader)?)
    }

    pub fn summary(&self) -> HeaderSummary {
        HeaderSummary {
            copy_protection: hex::encode(self.cprot),
            checksum:        self.checksum,
            checksum_offset: self.checksum_offset,
            file_size:       self.file_size,
            payload_size:    self.file_size.saturating_sub(SIZE_OVERHEAD),
            name_basic:      self.name_basic.clone(),
            name_internal:   self.name_internal.clone(),
            localized_names: Locale::ALL
                .iter()
                .map(|lc| (lc.code(), self.localized_names[lc.index()].clone()))
                .collect(),
            version:         self.version.clone(),
            timestamp:       self.timestamp.clone(),
            filename:        self.filename.clone(),
            has_mono_icon:   self.icons.mono.is_some(),
        }
    }
}

/// Read exactly one header's worth of bytes.  A short read reports how many
/// bytes were actually available.
pub fn read_header_bytes<R: Read>(reader: R) -> Result<Vec<u8>, HeaderError> {
    let mut buf = Vec::with_capacity(HEADER_SIZE);
    reader.take(HEADER_SIZE as u64).read_to_end(&mut buf)?;
    if buf.len() < HEADER_SIZE {
        return Err(HeaderError::Truncated(buf.len()));
    }
    Ok(buf)
}

/// Copy-protection block for a given file size.
///
/// Bytes 2..6 are the complement of the big-endian size; bytes 0 and 6 are
/// offsets from byte 5.
pub fn copy_protection(file_size: u32) -> [u8; 7] {
    let mut cprot = [0u8; 7];
    cprot[2..6].copy_from_slice(&(!file_size).to_be_bytes());
    cprot[0] = cprot[5].wrapping_sub(0x41);
    cprot[1] = 0xFE;
    cprot[6] = cprot[5].wrapping_sub(0xB8);
    cprot
}

/// Printable view of a header, without the icon data.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderSummary {
    pub copy_protection: String,
    pub checksum:        u32,
    pub checksum_offset: u32,
    pub file_size:       u32,
    pub payload_size:    u32,
    pub name_basic:      String,
    pub name_internal:   String,
    pub localized_names: Vec<(&'static str, String)>,
    pub version:         String,
    pub timestamp:       String,
    pub filename:        String,
    pub has_mono_icon:   bool,
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn put_str(buf: &mut [u8], field: Field, s: &str) {
    let s = truncate_bytes(s, field.len - 1);
    buf[field.offset..field.offset + s.len()].copy_from_slice(s.as_bytes());
}

fn get_str(data: &[u8], field: Field) -> String {
    let raw = &data[field.range()];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Copy the icon regions out of a serialized header.  Only the length is
/// checked; the monochrome icon is reported when any of its bytes are set.
pub fn slice_icons(data: &[u8]) -> Result<IconSet, HeaderError> {
    if data.len() < HEADER_SIZE {
        return Err(HeaderError::Truncated(data.len()));
    }
    let mono = &data[layout::ICON_MONO.range()];
    Ok(IconSet {
        selected:   icon_at(data, layout::ICON_SELECTED),
        unselected: icon_at(data, layout::ICON_UNSELECTED),
        mono:       if mono.iter().any(|&b| b != 0) {
            MonoIcon::from_bytes(mono.to_vec()).ok()
        } else {
            None
        },
    })
}

// The slice is exactly one icon wide, so construction cannot fail.
fn icon_at(data: &[u8], field: Field) -> Icon {
    Icon::from_bytes(data[field.range()].to_vec()).unwrap_or_default()
}

const _: () = assert!(layout::NAME_LOCALIZED.slot(layout::LOCALIZED_SLOTS).offset <= layout::VERSION.offset);
const _: () = assert!(layout::NAME_LONG.slot(layout::LOCALIZED_SLOTS).offset == layout::ICON_MONO.offset);
const _: () = assert!(layout::FILENAME.end() == layout::ICON_UNSELECTED.offset);
const _: () = assert!(layout::ICON_SELECTED.end() + 0x200 == HEADER_SIZE);
const _: () = assert!(ICON_BYTES == 0x2E00);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icon::MONO_ICON_BYTES;
    use chrono::NaiveDate;

    #[test]
    fn constant_fields_land_at_their_offsets() {
        let h = G3aHeader::new();
        let b = h.to_bytes();
        assert_eq!(b.len(), HEADER_SIZE);
        assert_eq!(&b[..14], &MAGIC);
        assert_eq!(&b[0x24..0x26], &[1, 1]);
        assert_eq!(&b[0x130..0x13A], b"01.00.0000");
        assert_eq!(b[0x13A], 0);
    }

    #[test]
    fn size_fields_are_big_endian() {
        let mut h = G3aHeader::new();
        h.fill_size(0x0102);
        let b = h.to_bytes();
        assert_eq!(&b[0x2E..0x32], &[0, 0, 0x01, 0x02]);
        assert_eq!(&b[0x5C..0x60], &[0, 0, 0x71, 0x06]);
        assert_eq!(h.file_size, 0x7106);
    }

    #[test]
    fn cprot_derivation() {
        // size 0x00007106 -> complement ff ff 8e f9
        let c = copy_protection(0x7106);
        assert_eq!(&c[2..6], &[0xFF, 0xFF, 0x8E, 0xF9]);
        assert_eq!(c[0], 0xF9 - 0x41);
        assert_eq!(c[1], 0xFE);
        assert_eq!(c[6], 0xF9 - 0xB8);

        // byte5 below the offsets wraps.
        let c = copy_protection(0xFF);
        assert_eq!(c[5], 0x00);
        assert_eq!(c[0], 0xBF);
        assert_eq!(c[6], 0x48);
    }

    #[test]
    fn internal_name_is_prefixed_and_upper_cased() {
        let mut h = G3aHeader::new();
        h.fill_names(&LocalizedNames::new("conv"));
        assert_eq!(h.name_internal, "@CONV");

        let mut names = LocalizedNames::new("basic");
        names.internal = Some("averylongname".into());
        h.fill_names(&names);
        assert_eq!(h.name_internal, "@AVERYLONG");

        let b = h.to_bytes();
        assert_eq!(&b[0x60..0x6B], b"@AVERYLONG\0");
    }

    #[test]
    fn localized_names_fall_back_to_basic() {
        let mut names = LocalizedNames::new("Calc");
        names.set(crate::names::NameSlot::Localized(Locale::De), "Rechner");
        let mut h = G3aHeader::new();
        h.fill_names(&names);
        let b = h.to_bytes();
        assert_eq!(&b[0x6B..0x6F], b"Calc");
        assert_eq!(&b[0x6B + 2 * 0x18..0x6B + 2 * 0x18 + 7], b"Rechner");
        assert_eq!(&b[0x6B + 7 * 0x18..0x6B + 7 * 0x18 + 4], b"Calc");
        assert_eq!(&b[0x40..0x44], b"Calc");
    }

    #[test]
    fn strings_are_truncated_leaving_a_nul() {
        let mut h = G3aHeader::new();
        h.name_basic = "x".repeat(100);
        let b = h.to_bytes();
        assert!(b[0x40..0x40 + 0x1B].iter().all(|&c| c == b'x'));
        assert_eq!(b[0x40 + 0x1B], 0);
        assert_eq!(&b[0x5C..0x60], &[0, 0, 0, 0]);
    }

    #[test]
    fn timestamp_format() {
        let at = NaiveDate::from_ymd_opt(2011, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 0)
            .unwrap()
            .and_utc();
        let mut h = G3aHeader::new();
        h.fill_timestamp_at(&at);
        assert_eq!(h.timestamp, "2011.0309.0705");
        assert_eq!(&h.to_bytes()[0x13C..0x14B], b"2011.0309.0705\0");
    }

    #[test]
    fn filename_is_last_segment() {
        let mut h = G3aHeader::new();
        h.fill_filename(Path::new("build/out/app.g3a"));
        assert_eq!(h.filename, "app.g3a");
        assert_eq!(&h.to_bytes()[0xEBC..0xEC3], b"app.g3a");
    }

    #[test]
    fn decode_reverses_encode() {
        let mut h = G3aHeader::new();
        h.fill_size(1234);
        h.fill_cprot();
        h.fill_names(&LocalizedNames::new("demo"));
        h.fill_filename(Path::new("demo.g3a"));
        h.checksum = 0xDEADBEEF;
        let mut sel = vec![0u8; ICON_BYTES];
        sel[5] = 9;
        h.icons.selected = Icon::from_bytes(sel).unwrap();
        h.icons.mono = Some(MonoIcon::from_bytes(vec![0x70; MONO_ICON_BYTES]).unwrap());

        let mut out = Vec::new();
        h.write(&mut out).unwrap();
        assert_eq!(G3aHeader::read(&out[..]).unwrap(), h);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(G3aHeader::from_bytes(&[0u8; 16]), Err(HeaderError::Truncated(16))));
        assert!(matches!(G3aHeader::from_bytes(&vec![0u8; HEADER_SIZE]), Err(HeaderError::InvalidMagic)));
        assert!(matches!(G3aHeader::read(&[0u8; 3][..]), Err(HeaderError::Truncated(3))));
    }

    #[test]
    fn short_read_reports_available_length() {
        let err = G3aHeader::read(&[0u8; 100][..]).unwrap_err();
        assert!(matches!(err, HeaderError::Truncated(100)));
        assert_eq!(err.to_string(), "Container is 100 bytes, shorter than the 0x7000-byte header");

        // Trailing payload is not consumed.
        let mut data = G3aHeader::new().to_bytes();
        data.extend_from_slice(b"payload");
        let mut reader = &data[..];
        assert_eq!(read_header_bytes(&mut reader).unwrap().len(), HEADER_SIZE);
        assert_eq!(reader, b"payload");
    }

    #[test]
    fn summary_serializes() {
        let mut h = G3aHeader::new();
        h.fill_names(&LocalizedNames::new("demo"));
        let json = serde_json::to_value(h.summary()).unwrap();
        assert_eq!(json["name_internal"], "@DEMO");
        assert_eq!(json["localized_names"][0][0], "en");
    }
}
