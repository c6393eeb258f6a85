//! Little-endian primitives shared by the map file codecs.

use crate::errors::{MapEditError, MapEditResult};
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Read a fixed magic and fail with a format error on mismatch
pub fn expect_magic<R: Read>(reader: &mut R, expected: &[u8], what: &str) -> MapEditResult<()> {
    let mut magic = vec![0u8; expected.len()];
    reader.read_exact(&mut magic)?;
    if magic != expected {
        return Err(MapEditError::format(format!(
            "Not a {what}: expected magic {:?}, found {:?}",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(&magic)
        )));
    }
    Ok(())
}

/// Read a NUL-terminated string
pub fn read_cstring<R: Read>(reader: &mut R) -> MapEditResult<String> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        reader.read_exact(&mut byte)?;
        if byte[0] == 0 {
            break;
        }
        bytes.push(byte[0]);
    }
    String::from_utf8(bytes).map_err(|e| MapEditError::format(format!("Invalid string: {e}")))
}

/// Write a NUL-terminated string
pub fn write_cstring<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    writer.write_all(value.as_bytes())?;
    writer.write_u8(0)
}

/// Read an `i32` field that must hold a fixed value
pub fn expect_i32(value: i32, expected: i32, field: &str) -> MapEditResult<()> {
    if value != expected {
        return Err(MapEditError::format(format!(
            "Unsupported {field}: expected {expected}, found {value}"
        )));
    }
    Ok(())
}

/// Convert a file-supplied count into a usize, rejecting negatives
pub fn non_negative(value: i32, field: &str) -> MapEditResult<usize> {
    usize::try_from(value)
        .map_err(|_| MapEditError::format(format!("Negative {field}: {value}")))
}

/// Longest image edge the readers accept. A 64x64 unit map texture is
/// 32768 texels on a side.
pub const MAX_IMAGE_EDGE: usize = 32768;

/// Upper bound on capacity reserved from a file-supplied count
const MAX_RESERVE: usize = 4096;

/// Check file-supplied image dimensions before anything is allocated for
/// them, returning the byte size of `bytes_per_cell` sized cells.
pub fn checked_area(width: usize, height: usize, bytes_per_cell: usize, what: &str) -> MapEditResult<usize> {
    if width > MAX_IMAGE_EDGE || height > MAX_IMAGE_EDGE {
        return Err(MapEditError::format(format!(
            "{what} of {width}x{height} exceeds {MAX_IMAGE_EDGE}x{MAX_IMAGE_EDGE}"
        )));
    }
    width
        .checked_mul(height)
        .and_then(|cells| cells.checked_mul(bytes_per_cell))
        .ok_or_else(|| MapEditError::format(format!("{what} of {width}x{height} is too large")))
}

/// Capacity to reserve for a count read from a file; the vector still
/// grows past it if the records are really there
pub fn reserve_hint(count: usize) -> usize {
    count.min(MAX_RESERVE)
}

/// Handle to a placeholder written by [`FixupWriter::placeholder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixupId(usize);

#[derive(Debug)]
struct Fixup {
    label: &'static str,
    offset: u64,
    value: Option<i32>,
}

/// Streaming writer that records pointer placeholders and patches them at the end.
///
/// A placeholder is written as `0`; once the section it points to starts,
/// [`resolve_here`](Self::resolve_here) records the real offset. All pending
/// fixups are written in one pass by [`finish`](Self::finish).
pub struct FixupWriter<W: Write + Seek> {
    inner: W,
    position: u64,
    fixups: Vec<Fixup>,
}

impl<W: Write + Seek> FixupWriter<W> {
    pub fn new(mut inner: W) -> io::Result<Self> {
        let position = inner.stream_position()?;
        Ok(Self {
            inner,
            position,
            fixups: Vec::new(),
        })
    }

    /// Current absolute offset in the output
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Write a zero `i32` placeholder to be patched later
    pub fn placeholder(&mut self, label: &'static str) -> io::Result<FixupId> {
        let offset = self.position;
        self.write_i32::<LittleEndian>(0)?;
        self.fixups.push(Fixup {
            label,
            offset,
            value: None,
        });
        Ok(FixupId(self.fixups.len() - 1))
    }

    /// Point a placeholder at the current output offset
    pub fn resolve_here(&mut self, id: FixupId) -> MapEditResult<()> {
        let position = i32::try_from(self.position).map_err(|_| {
            MapEditError::invalid(format!("Section offset {} exceeds 2 GiB", self.position))
        })?;
        self.resolve(id, position);
        Ok(())
    }

    /// Give a placeholder an explicit value
    pub fn resolve(&mut self, id: FixupId, value: i32) {
        self.fixups[id.0].value = Some(value);
    }

    /// Patch every placeholder and hand back the inner writer
    pub fn finish(mut self) -> MapEditResult<W> {
        for fixup in &self.fixups {
            let value = fixup.value.ok_or_else(|| {
                MapEditError::invalid(format!("Unresolved file pointer '{}'", fixup.label))
            })?;
            self.inner.seek(SeekFrom::Start(fixup.offset))?;
            self.inner.write_i32::<LittleEndian>(value)?;
        }
        self.inner.seek(SeekFrom::Start(self.position))?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write + Seek> Write for FixupWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Write a file through a temporary sibling and rename it into place.
///
/// The destination is only replaced once `write` succeeded; on failure the
/// temporary file is removed and the previous file is left untouched.
pub fn write_atomically<T>(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> MapEditResult<T>,
) -> MapEditResult<T> {
    let temp = partial_path(path);
    match write_file(&temp, write) {
        Ok(value) => {
            fs::rename(&temp, path)?;
            Ok(value)
        }
        Err(e) => {
            let _ = fs::remove_file(&temp);
            Err(e)
        }
    }
}

fn write_file<T>(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> MapEditResult<T>,
) -> MapEditResult<T> {
    let mut writer = BufWriter::new(File::create(path)?);
    let value = write(&mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ReadBytesExt;
    use std::io::Cursor;

    #[test]
    fn test_cstring_round_trip() {
        let mut buf = Vec::new();
        write_cstring(&mut buf, "GeoVent").unwrap();
        assert_eq!(buf.last(), Some(&0));

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_cstring(&mut cursor).unwrap(), "GeoVent");
    }

    #[test]
    fn test_expect_magic() {
        let mut ok = Cursor::new(b"SRAW....".to_vec());
        assert!(expect_magic(&mut ok, b"SRAW", "raw heightmap").is_ok());

        let mut bad = Cursor::new(b"BMxx".to_vec());
        let err = expect_magic(&mut bad, b"SRAW", "raw heightmap").unwrap_err();
        assert!(matches!(err, MapEditError::Format { .. }));
    }

    #[test]
    fn test_checked_area_limits() {
        assert_eq!(checked_area(4, 2, 3, "Bitmap").unwrap(), 24);
        assert!(matches!(
            checked_area(MAX_IMAGE_EDGE + 1, 1, 1, "Bitmap"),
            Err(MapEditError::Format { .. })
        ));
        assert!(matches!(
            checked_area(MAX_IMAGE_EDGE, MAX_IMAGE_EDGE, usize::MAX, "Bitmap"),
            Err(MapEditError::Format { .. })
        ));
        assert_eq!(reserve_hint(i32::MAX as usize), MAX_RESERVE);
    }

    #[test]
    fn test_fixup_writer_patches_placeholders() {
        let mut writer = FixupWriter::new(Cursor::new(Vec::new())).unwrap();
        let first = writer.placeholder("first").unwrap();
        let second = writer.placeholder("second").unwrap();
        writer.write_all(&[0xAA; 5]).unwrap();
        writer.resolve_here(second).unwrap();
        writer.write_all(&[0xBB; 3]).unwrap();
        writer.resolve(first, 1234);

        let bytes = writer.finish().unwrap().into_inner();
        let mut cursor = Cursor::new(&bytes);
        assert_eq!(cursor.read_i32::<LittleEndian>().unwrap(), 1234);
        assert_eq!(cursor.read_i32::<LittleEndian>().unwrap(), 13);
        assert_eq!(bytes.len(), 16);
    }

    #[test]
    fn test_unresolved_fixup_is_an_error() {
        let mut writer = FixupWriter::new(Cursor::new(Vec::new())).unwrap();
        writer.placeholder("dangling").unwrap();
        assert!(writer.finish().is_err());
    }

    #[test]
    fn test_write_atomically_keeps_old_file_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.bin");
        fs::write(&path, b"old").unwrap();

        let result: MapEditResult<()> = write_atomically(&path, |w| {
            w.write_all(b"new")?;
            Err(MapEditError::invalid("abort"))
        });
        assert!(result.is_err());
        assert_eq!(fs::read(&path).unwrap(), b"old");
        assert!(!partial_path(&path).exists());

        write_atomically(&path, |w| Ok(w.write_all(b"new")?)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }
}
