//! Fixed-size memory-mapped files with bounds-checked access.
//!
//! `MappedFile` owns the open file handle and one mapping over `[0, len)`.
//! Every higher-level component reads and writes through it; no raw pointer
//! leaves this module.

use std::{
    fs::{File, OpenOptions},
    io::ErrorKind,
    mem,
    ops::Range,
    path::{Path, PathBuf},
    sync::atomic::{self, AtomicU64, Ordering},
};

use fs2::FileExt;
use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::error::{Result, StorageError};

/// How a file is opened and mapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Create if absent, size to exactly `max_size`, map writable and take the
    /// writer lock.
    ReadWrite,
    /// Never create or resize; map at most `max_size` bytes of the existing file.
    ReadOnly,
}

enum Mapping {
    Writable(MmapMut),
    ReadOnly(Mmap),
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Mapping::Writable(m) => m,
            Mapping::ReadOnly(m) => m,
        }
    }
}

/// An open file together with its memory mapping.
///
/// The mapping is declared before the file so it is unmapped before the
/// handle closes (which also releases the writer lock).
pub struct MappedFile {
    map: Mapping,
    _file: File,
    path: PathBuf,
    len: u64,
}

impl MappedFile {
    /// Open `path` in `mode`.
    ///
    /// Read-write opens create the file, set its length to `max_size`
    /// (new bytes read as zero) and take an exclusive advisory lock, failing
    /// with `WriterLocked` if another writer holds it. Read-only opens fail
    /// with `NotFound` when the file is absent and map
    /// `min(max_size, file length)` bytes.
    pub fn open(path: impl AsRef<Path>, max_size: u64, mode: OpenMode) -> Result<Self> {
        match mode {
            OpenMode::ReadWrite => Self::open_read_write(path.as_ref(), max_size),
            OpenMode::ReadOnly => Self::open_read_only(path.as_ref(), Some(max_size)),
        }
    }

    fn open_read_write(path: &Path, max_size: u64) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)?;
        if let Err(e) = file.try_lock_exclusive() {
            let contended = fs2::lock_contended_error();
            if e.kind() == ErrorKind::WouldBlock || e.raw_os_error() == contended.raw_os_error() {
                return Err(StorageError::WriterLocked(path.to_path_buf()));
            }
            return Err(e.into());
        }
        if file.metadata()?.len() != max_size {
            file.set_len(max_size)?;
        }
        // Safety: the mapping never outlives `file`, and all access is
        // bounds-checked against `len`.
        let map = unsafe { MmapMut::map_mut(&file)? };
        tracing::debug!(path = %path.display(), len = max_size, "mapped file read-write");
        Ok(Self {
            map: Mapping::Writable(map),
            _file: file,
            path: path.to_path_buf(),
            len: max_size,
        })
    }

    /// Open an existing file read-only, mapping the whole file when
    /// `max_size` is `None`.
    pub fn open_read_only(path: impl AsRef<Path>, max_size: Option<u64>) -> Result<Self> {
        let path = path.as_ref();
        let file = match OpenOptions::new().read(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StorageError::NotFound(path.to_path_buf())),
            Err(e) => return Err(e.into()),
        };
        let file_len = file.metadata()?.len();
        let len = max_size.map_or(file_len, |max| max.min(file_len));
        let map_len = to_usize(0, len, len)?;
        // Safety: we never write through this map
        let map = unsafe { MmapOptions::new().len(map_len).map(&file)? };
        tracing::debug!(path = %path.display(), len, "mapped file read-only");
        Ok(Self {
            map: Mapping::ReadOnly(map),
            _file: file,
            path: path.to_path_buf(),
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of mapped bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn mode(&self) -> OpenMode {
        match self.map {
            Mapping::Writable(_) => OpenMode::ReadWrite,
            Mapping::ReadOnly(_) => OpenMode::ReadOnly,
        }
    }

    fn range(&self, offset: u64, len: usize) -> Result<Range<usize>> {
        let len64 = len as u64;
        match offset.checked_add(len64) {
            Some(end) if end <= self.len => Ok(offset as usize..end as usize),
            _ => Err(StorageError::OutOfRange {
                offset,
                len: len64,
                limit: self.len,
            }),
        }
    }

    fn writable(&mut self) -> Result<&mut MmapMut> {
        match &mut self.map {
            Mapping::Writable(m) => Ok(m),
            Mapping::ReadOnly(_) => Err(StorageError::ReadOnly(self.path.clone())),
        }
    }

    /// Borrow `len` mapped bytes starting at `offset`.
    pub fn bytes(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let range = self.range(offset, len)?;
        Ok(&self.map.bytes()[range])
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        buf.copy_from_slice(self.bytes(offset, buf.len())?);
        Ok(())
    }

    /// Copy `data` into the mapping at `offset`.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let range = self.range(offset, data.len())?;
        self.writable()?[range].copy_from_slice(data);
        Ok(())
    }

    /// Little-endian `u64` at `offset`.
    pub fn read_u64(&self, offset: u64) -> Result<u64> {
        let mut raw = [0u8; 8];
        self.read_at(offset, &mut raw)?;
        Ok(u64::from_le_bytes(raw))
    }

    pub fn write_u64(&mut self, offset: u64, value: u64) -> Result<()> {
        self.write_at(offset, &value.to_le_bytes())
    }

    /// Load a little-endian `u64` published by [`MappedFile::store_u64_release`],
    /// possibly from another mapping or process. Bytes written before the
    /// matching store are visible once this returns the stored value.
    pub fn load_u64_acquire(&self, offset: u64) -> Result<u64> {
        let range = self.range(offset, 8)?;
        let ptr = self.map.bytes()[range].as_ptr();
        if ptr.align_offset(mem::align_of::<AtomicU64>()) != 0 {
            let value = self.read_u64(offset)?;
            atomic::fence(Ordering::Acquire);
            return Ok(value);
        }
        // Safety: the 8 bytes are in bounds and aligned, and only read through
        // the atomic for as long as `&self` keeps the mapping alive.
        let cell = unsafe { &*ptr.cast::<AtomicU64>() };
        Ok(u64::from_le(cell.load(Ordering::Acquire)))
    }

    /// Publish a little-endian `u64` after every preceding write to the mapping.
    pub fn store_u64_release(&mut self, offset: u64, value: u64) -> Result<()> {
        let range = self.range(offset, 8)?;
        let bytes = &mut self.writable()?[range];
        let ptr = bytes.as_mut_ptr();
        if ptr.align_offset(mem::align_of::<AtomicU64>()) != 0 {
            atomic::fence(Ordering::Release);
            bytes.copy_from_slice(&value.to_le_bytes());
            return Ok(());
        }
        // Safety: `ptr` comes from the unique borrow of the writable mapping,
        // is in bounds and aligned, and is not accessed non-atomically while
        // the atomic is alive.
        let cell = unsafe { AtomicU64::from_ptr(ptr.cast::<u64>()) };
        cell.store(value.to_le(), Ordering::Release);
        Ok(())
    }

    /// Durability barrier for the whole mapping. No-op for read-only maps.
    pub fn flush(&self) -> Result<()> {
        if let Mapping::Writable(m) = &self.map {
            m.flush()?;
        }
        Ok(())
    }

    /// Durability barrier for `len` bytes at `offset`.
    pub fn flush_range(&self, offset: u64, len: usize) -> Result<()> {
        let range = self.range(offset, len)?;
        if let Mapping::Writable(m) = &self.map {
            m.flush_range(range.start, range.len())?;
        }
        Ok(())
    }
}

fn to_usize(offset: u64, len: u64, limit: u64) -> Result<usize> {
    usize::try_from(len).map_err(|_| StorageError::OutOfRange { offset, len, limit })
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_read_write_creates_and_sizes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("mapped.dat");
        let mut mf = MappedFile::open(&path, 4096, OpenMode::ReadWrite).expect("failed_to_unwrap_value");
        assert_eq!(mf.len(), 4096);
        assert_eq!(mf.mode(), OpenMode::ReadWrite);
        assert_eq!(std::fs::metadata(&path).expect("failed_to_unwrap_value").len(), 4096);
        // fresh bytes read as zero
        assert_eq!(mf.read_u64(4088).expect("failed_to_unwrap_value"), 0);

        mf.write_at(100, b"sensor").expect("failed_to_unwrap_value");
        mf.write_u64(8, 0xDEAD_BEEF).expect("failed_to_unwrap_value");
        mf.flush().expect("failed_to_unwrap_value");
        drop(mf);

        let mut buf = Vec::new();
        File::open(&path).expect("failed_to_unwrap_value").read_to_end(&mut buf).expect("failed_to_unwrap_value");
        assert_eq!(&buf[100..106], b"sensor");
        assert_eq!(&buf[8..16], &0xDEAD_BEEFu64.to_le_bytes());
    }

    #[test]
    fn test_bounds_checked_access() {
        let tmp = TempDir::new().expect("tempdir");
        let mut mf = MappedFile::open(tmp.path().join("b.dat"), 64, OpenMode::ReadWrite).expect("failed_to_unwrap_value");
        assert!(mf.write_at(60, &[0u8; 4]).is_ok());
        let err = mf.write_at(61, &[0u8; 4]).unwrap_err();
        assert!(matches!(err, StorageError::OutOfRange { offset: 61, len: 4, limit: 64 }));
        assert!(matches!(mf.read_u64(u64::MAX - 2), Err(StorageError::OutOfRange { .. })));
        let mut buf = [0u8; 65];
        assert!(mf.read_at(0, &mut buf).is_err());
    }

    #[test]
    fn test_read_only_not_found() {
        let err = MappedFile::open("no-such-file.dat", 64, OpenMode::ReadOnly).err().expect("must fail");
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(!std::path::Path::new("no-such-file.dat").exists());
    }

    #[test]
    fn test_read_only_rejects_writes_and_never_resizes() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("ro.dat");
        {
            let mut mf = MappedFile::open(&path, 128, OpenMode::ReadWrite).expect("failed_to_unwrap_value");
            mf.write_u64(0, 42).expect("failed_to_unwrap_value");
        }
        let mut ro = MappedFile::open(&path, 4096, OpenMode::ReadOnly).expect("failed_to_unwrap_value");
        assert_eq!(ro.len(), 128);
        assert_eq!(ro.read_u64(0).expect("failed_to_unwrap_value"), 42);
        assert!(matches!(ro.write_u64(0, 1), Err(StorageError::ReadOnly(_))));
        assert!(ro.flush().is_ok());
        assert_eq!(std::fs::metadata(&path).expect("failed_to_unwrap_value").len(), 128);
    }

    #[test]
    fn test_second_writer_is_rejected() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("locked.dat");
        let first = MappedFile::open(&path, 64, OpenMode::ReadWrite).expect("failed_to_unwrap_value");
        let second = MappedFile::open(&path, 64, OpenMode::ReadWrite);
        assert!(matches!(second, Err(StorageError::WriterLocked(_))));
        // readers never lock
        assert!(MappedFile::open(&path, 64, OpenMode::ReadOnly).is_ok());
        drop(first);
        assert!(MappedFile::open(&path, 64, OpenMode::ReadWrite).is_ok());
    }

    #[test]
    fn test_release_store_visible_through_second_mapping() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("cursor.dat");
        let mut writer = MappedFile::open(&path, 64, OpenMode::ReadWrite).expect("failed_to_unwrap_value");
        let reader = MappedFile::open_read_only(&path, None).expect("failed_to_unwrap_value");
        writer.write_at(8, b"payload!").expect("failed_to_unwrap_value");
        writer.store_u64_release(0, 16).expect("failed_to_unwrap_value");
        assert_eq!(reader.load_u64_acquire(0).expect("failed_to_unwrap_value"), 16);
        assert_eq!(reader.bytes(8, 8).expect("failed_to_unwrap_value"), b"payload!");
    }

    #[test]
    fn test_release_store_at_aligned_and_unaligned_offsets() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("cursor.dat");
        let mut writer = MappedFile::open(&path, 64, OpenMode::ReadWrite).expect("failed_to_unwrap_value");
        writer.store_u64_release(8, 0x0102_0304_0506_0708).expect("failed_to_unwrap_value");
        // offset 20 is not 8-byte aligned and takes the fenced copy
        writer.store_u64_release(20, 77).expect("failed_to_unwrap_value");
        assert_eq!(writer.load_u64_acquire(8).expect("failed_to_unwrap_value"), 0x0102_0304_0506_0708);
        assert_eq!(writer.load_u64_acquire(20).expect("failed_to_unwrap_value"), 77);
        assert!(matches!(writer.store_u64_release(60, 1), Err(StorageError::OutOfRange { .. })));
        writer.flush().expect("failed_to_unwrap_value");

        let raw = std::fs::read(&path).expect("failed_to_unwrap_value");
        assert_eq!(&raw[8..16], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(&raw[20..28], &77u64.to_le_bytes());

        let mut ro = MappedFile::open_read_only(&path, None).expect("failed_to_unwrap_value");
        assert!(matches!(ro.store_u64_release(8, 1), Err(StorageError::ReadOnly(_))));
    }
}
