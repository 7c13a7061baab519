//! Container operations: build, icon update, icon extraction, verification.
//!
//! ```no_run
//! use fxg3a::container::{build, BuildOptions};
//! use fxg3a::names::LocalizedNames;
//!
//! let opts = BuildOptions {
//!     names: LocalizedNames::new("Demo"),
//!     ..BuildOptions::default()
//! };
//! let header = build("demo.bin", "demo.g3a", &opts)?;
//! println!("{} bytes, checksum {:#010x}", header.file_size, header.checksum);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Checksums
//! A freshly built file carries the byte-sum of header and payload in the
//! header slot at `0x20` and again in the last four bytes of the file.
//! [`update_icons`] recomputes it over the whole file with both slots
//! zeroed, then writes it back to both.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::checksum::{checksum, Checksum};
use crate::header::{self, layout, G3aHeader, HeaderError, DEFAULT_VERSION, HEADER_SIZE};
use crate::icon::{Icon, IconSet};
use crate::image::ImageError;
use crate::names::LocalizedNames;

/// Largest payload accepted by [`build`]: 16 MiB.
pub const MAX_PAYLOAD_SIZE: u64 = 0x0100_0000;

/// Smallest file [`update_icons`] accepts: header plus trailing checksum.
pub const MIN_CONTAINER_SIZE: usize = HEADER_SIZE + 4;

const COPY_CHUNK: usize = 64 * 1024;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Unable to open {}: {source}", path.display())]
    Open { path: PathBuf, #[source] source: io::Error },
    #[error("Unable to create {}: {source}", path.display())]
    Create { path: PathBuf, #[source] source: io::Error },
    #[error("Payload is {size} bytes; refusing to package anything larger than {MAX_PAYLOAD_SIZE} bytes")]
    PayloadTooLarge { size: u64 },
    #[error("Container is {size} bytes, too small to be valid (minimum {MIN_CONTAINER_SIZE})")]
    TooSmall { size: usize },
    #[error("Unable to allocate {0} bytes for the container")]
    OutOfMemory(usize),
    #[error("Failed to load icon {}: {source}", path.display())]
    Icon { path: PathBuf, #[source] source: ImageError },
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── BuildOptions ─────────────────────────────────────────────────────────────

/// Configuration for [`build`].
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub names:     LocalizedNames,
    pub icons:     IconSet,
    pub version:   String,
    /// Creation time written to the header.  `None` uses the current time.
    pub timestamp: Option<DateTime<Local>>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            names:     LocalizedNames::default(),
            icons:     IconSet::default(),
            version:   DEFAULT_VERSION.to_owned(),
            timestamp: None,
        }
    }
}

// ── Build ────────────────────────────────────────────────────────────────────

/// Package the file at `payload` into a new container at `output`.
///
/// The payload size is checked before `output` is created.  If anything
/// fails after that, the partial output is removed on a best-effort basis.
pub fn build<P: AsRef<Path>, Q: AsRef<Path>>(
    payload: P,
    output:  Q,
    opts:    &BuildOptions,
) -> Result<G3aHeader, ContainerError> {
    let (payload, output) = (payload.as_ref(), output.as_ref());

    let mut input = File::open(payload).map_err(|source| ContainerError::Open {
        path: payload.to_owned(),
        source,
    })?;
    let size = input.metadata()?.len();
    if size > MAX_PAYLOAD_SIZE {
        return Err(ContainerError::PayloadTooLarge { size });
    }

    let out = File::create(output).map_err(|source| ContainerError::Create {
        path: output.to_owned(),
        source,
    })?;
    let result = write_container(&mut input, out, output, opts);
    match &result {
        Ok(header) => info!(
            output = %output.display(),
            file_size = header.file_size,
            checksum = header.checksum,
            "built container"
        ),
        Err(e) => {
            debug!(error = %e, "build failed, removing partial output");
            if let Err(rm) = fs::remove_file(output) {
                warn!(output = %output.display(), error = %rm, "could not remove partial output");
            }
        }
    }
    result
}

/// Stream `payload` after a reserved header region of `writer`, then write
/// the finished header at offset 0.
///
/// `output_path` only supplies the file name stored in the header.
pub fn write_container<R: Read, W: Write + Seek>(
    mut payload: R,
    mut writer:  W,
    output_path: &Path,
    opts:        &BuildOptions,
) -> Result<G3aHeader, ContainerError> {
    writer.seek(SeekFrom::Start(HEADER_SIZE as u64))?;

    let mut sum = Checksum::new();
    let mut size = 0u64;
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        let n = match payload.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        size += n as u64;
        if size > MAX_PAYLOAD_SIZE {
            return Err(ContainerError::PayloadTooLarge { size });
        }
        sum.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
    }
    debug!(size, payload_checksum = sum.finalize(), "copied payload");

    let mut header = G3aHeader::new();
    if let Some(at) = &opts.timestamp {
        header.fill_timestamp_at(at);
    }
    header.fill_size(size as u32);
    header.fill_cprot();
    header.fill_icons(&opts.icons);
    header.fill_version(&opts.version);
    header.fill_filename(output_path);
    header.fill_names(&opts.names);

    // The checksum slot is still zero here.
    sum.update(&header.to_bytes());
    header.checksum = sum.finalize();

    writer.write_all(&header.checksum.to_be_bytes())?;
    writer.seek(SeekFrom::Start(0))?;
    header.write(&mut writer)?;
    writer.flush()?;
    Ok(header)
}

// ── Icon update ──────────────────────────────────────────────────────────────

/// Replace both colour icons in a serialized container and refresh its
/// checksums.  Returns the new checksum.
pub fn update_icons(container: &mut [u8], selected: &Icon, unselected: &Icon) -> Result<u32, ContainerError> {
    let len = container.len();
    if len < MIN_CONTAINER_SIZE {
        return Err(ContainerError::TooSmall { size: len });
    }

    container[layout::ICON_SELECTED.range()].copy_from_slice(selected.as_bytes());
    container[layout::ICON_UNSELECTED.range()].copy_from_slice(unselected.as_bytes());

    container[layout::CHECKSUM.range()].fill(0);
    container[len - 4..].fill(0);
    let sum = checksum(container);
    BigEndian::write_u32(&mut container[layout::CHECKSUM.range()], sum);
    BigEndian::write_u32(&mut container[len - 4..], sum);
    debug!(checksum = sum, "refreshed checksums");
    Ok(sum)
}

/// [`update_icons`] on a file, rewriting it in place.
pub fn update_icons_in_file<P: AsRef<Path>>(path: P, selected: &Icon, unselected: &Icon) -> Result<u32, ContainerError> {
    let path = path.as_ref();
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| ContainerError::Open { path: path.to_owned(), source })?;
    let mut contents = read_all(&mut file)?;
    let sum = update_icons(&mut contents, selected, unselected)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&contents)?;
    file.flush()?;
    info!(path = %path.display(), checksum = sum, "updated icons");
    Ok(sum)
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// Slice the icon regions out of a container header.  Nothing else in the
/// header is examined.
pub fn extract_icons(header: &[u8]) -> Result<IconSet, ContainerError> {
    Ok(header::slice_icons(header)?)
}

/// Read just the header of the container at `path` and extract its icons.
pub fn extract_icons_from_file<P: AsRef<Path>>(path: P) -> Result<IconSet, ContainerError> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|source| ContainerError::Open { path: path.to_owned(), source })?;
    let header = header::read_header_bytes(&mut file)?;
    extract_icons(&header)
}

// ── Verification ─────────────────────────────────────────────────────────────

/// Stored and recomputed checksums of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ChecksumReport {
    pub header:   u32,
    pub trailer:  u32,
    pub computed: u32,
}

impl ChecksumReport {
    pub fn is_valid(&self) -> bool {
        self.header == self.computed && self.trailer == self.computed
    }
}

/// Recompute the whole-file checksum, counting both checksum slots as zero.
pub fn verify_checksums(container: &[u8]) -> Result<ChecksumReport, ContainerError> {
    let len = container.len();
    if len < MIN_CONTAINER_SIZE {
        return Err(ContainerError::TooSmall { size: len });
    }
    let header_slot = &container[layout::CHECKSUM.range()];
    let trailer_slot = &container[len - 4..];
    let computed = checksum(container)
        .wrapping_sub(checksum(header_slot))
        .wrapping_sub(checksum(trailer_slot));
    Ok(ChecksumReport {
        header:  BigEndian::read_u32(header_slot),
        trailer: BigEndian::read_u32(trailer_slot),
        computed,
    })
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Read a whole container, surfacing allocation failure as an error.
pub fn read_container<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, ContainerError> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|source| ContainerError::Open { path: path.to_owned(), source })?;
    read_all(&mut file)
}

fn read_all(file: &mut File) -> Result<Vec<u8>, ContainerError> {
    let len = file.metadata()?.len() as usize;
    let mut contents = Vec::new();
    contents
        .try_reserve_exact(len)
        .map_err(|_| ContainerError::OutOfMemory(len))?;
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

/// Load the selected and unselected icons.  With the `parallel` feature the
/// two images decode concurrently.
pub fn load_icon_pair(selected: &Path, unselected: &Path) -> Result<(Icon, Icon), ContainerError> {
    let load = |path: &Path| {
        Icon::load(path).map_err(|source| ContainerError::Icon { path: path.to_owned(), source })
    };

    #[cfg(feature = "parallel")]
    let (sel, unsel) = rayon::join(|| load(selected), || load(unselected));
    #[cfg(not(feature = "parallel"))]
    let (sel, unsel) = (load(selected), load(unselected));

    Ok((sel?, unsel?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_in_memory(payload: &[u8]) -> (G3aHeader, Vec<u8>) {
        let mut out = Cursor::new(Vec::new());
        let opts = BuildOptions {
            names: LocalizedNames::new("mem"),
            ..BuildOptions::default()
        };
        let header = write_container(payload, &mut out, Path::new("mem.g3a"), &opts).unwrap();
        (header, out.into_inner())
    }

    #[test]
    fn checksum_covers_header_and_payload() {
        let payload = [1u8, 2, 3, 250];
        let (header, file) = build_in_memory(&payload);

        let mut zeroed = header.clone();
        zeroed.checksum = 0;
        let expected = checksum(&zeroed.to_bytes()).wrapping_add(checksum(&payload));
        assert_eq!(header.checksum, expected);
        assert_eq!(&file[file.len() - 4..], &expected.to_be_bytes());
        assert_eq!(verify_checksums(&file).unwrap().computed, expected);
    }

    #[test]
    fn verification_detects_corruption() {
        let (_, mut file) = build_in_memory(b"payload");
        assert!(verify_checksums(&file).unwrap().is_valid());

        file[HEADER_SIZE] ^= 0x01;
        let report = verify_checksums(&file).unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.header, report.trailer);
    }

    #[test]
    fn update_icons_restores_a_valid_checksum() {
        let (header, mut file) = build_in_memory(&[0xAA; 32]);
        let selected = Icon::from_bytes(vec![0x12; crate::icon::ICON_BYTES]).unwrap();
        let unselected = Icon::from_bytes(vec![0x34; crate::icon::ICON_BYTES]).unwrap();

        let sum = update_icons(&mut file, &selected, &unselected).unwrap();
        let report = verify_checksums(&file).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.computed, sum);
        assert_ne!(sum, header.checksum);
        assert_eq!(&file[layout::ICON_SELECTED.range()], selected.as_bytes());
        assert_eq!(&file[layout::ICON_UNSELECTED.range()], unselected.as_bytes());
    }

    #[test]
    fn update_and_verify_reject_short_buffers() {
        let mut small = vec![0u8; MIN_CONTAINER_SIZE - 1];
        let icon = Icon::blank();
        assert!(matches!(update_icons(&mut small, &icon, &icon), Err(ContainerError::TooSmall { .. })));
        assert!(matches!(verify_checksums(&small), Err(ContainerError::TooSmall { .. })));
    }

    #[test]
    fn extract_from_short_file_reports_its_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.g3a");
        fs::write(&path, vec![0u8; 100]).unwrap();
        assert!(matches!(
            extract_icons_from_file(&path),
            Err(ContainerError::Header(HeaderError::Truncated(100)))
        ));

        let (header, file) = build_in_memory(b"abc");
        fs::write(&path, &file).unwrap();
        assert_eq!(extract_icons_from_file(&path).unwrap(), header.icons);
    }

    #[test]
    fn extract_needs_only_the_header() {
        let (header, file) = build_in_memory(b"x");
        let icons = extract_icons(&file[..HEADER_SIZE]).unwrap();
        assert_eq!(icons, header.icons);
        assert!(matches!(
            extract_icons(&file[..HEADER_SIZE - 1]),
            Err(ContainerError::Header(HeaderError::Truncated(_)))
        ));
    }
}
