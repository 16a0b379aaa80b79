//! Positioned file and block-device I/O
//!
//! Member images may be regular files or block devices. All access is
//! positioned (`pread`/`pwrite`), so a single handle can serve concurrent
//! requests without a shared file cursor. I/O is byte-granular and goes
//! through the page cache; durability comes from an explicit sync.

use mirrorio_common::Result;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Open handle on one backing extent
#[derive(Debug)]
pub struct RawFile {
    file: File,
    path: String,
    size: u64,
    read_only: bool,
}

impl RawFile {
    /// Open an existing file or device
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let mut options = OpenOptions::new();
        options.read(true);
        if !read_only {
            options.write(true);
        }

        let file = options
            .open(&path)
            .map_err(|e| with_path(e, "failed to open", &path_str))?;

        let size = if Self::is_block_device(&path) {
            Self::get_block_device_size(&file, &path_str)?
        } else {
            file.metadata()
                .map_err(|e| with_path(e, "failed to get metadata for", &path_str))?
                .len()
        };

        Ok(Self {
            file,
            path: path_str,
            size,
            read_only,
        })
    }

    /// Create a zero-filled image of the given size
    ///
    /// Regular files are created or truncated to `size`. For block devices
    /// the device is opened as is and `size` is ignored.
    pub fn create(path: impl AsRef<Path>, size: u64) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let is_block_device = Self::is_block_device(&path);

        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if !is_block_device {
            options.create(true).truncate(true);
        }

        let file = options
            .open(&path)
            .map_err(|e| with_path(e, "failed to create", &path_str))?;

        let actual_size = if is_block_device {
            Self::get_block_device_size(&file, &path_str)?
        } else {
            file.set_len(size)
                .map_err(|e| with_path(e, "failed to set size for", &path_str))?;
            size
        };

        Ok(Self {
            file,
            path: path_str,
            size: actual_size,
            read_only: false,
        })
    }

    /// Check if path is a block device; missing paths are not
    fn is_block_device(path: impl AsRef<Path>) -> bool {
        use std::os::unix::fs::FileTypeExt;
        std::fs::metadata(path)
            .map(|m| m.file_type().is_block_device())
            .unwrap_or(false)
    }

    /// Get block device size using ioctl
    #[cfg(target_os = "linux")]
    #[allow(unsafe_code)]
    fn get_block_device_size(file: &File, path: &str) -> Result<u64> {
        use std::os::unix::io::AsRawFd;

        // BLKGETSIZE64 ioctl
        const BLKGETSIZE64: libc::c_ulong = 0x8008_1272;

        let mut size: u64 = 0;
        let ret = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64, &mut size) };
        if ret == -1 {
            return Err(with_path(
                io::Error::last_os_error(),
                "failed to get block device size for",
                path,
            )
            .into());
        }
        Ok(size)
    }

    /// Get block device size (non-Linux fallback)
    #[cfg(not(target_os = "linux"))]
    fn get_block_device_size(file: &File, path: &str) -> Result<u64> {
        use std::io::{Seek, SeekFrom};
        let mut f = file;
        let size = f
            .seek(SeekFrom::End(0))
            .map_err(|e| with_path(e, "failed to get device size for", path))?;
        Ok(size)
    }

    /// Get the file size
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Get the file path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fill `buf` from `offset`
    ///
    /// A short read (end of file reached before `buf` is full) is an error.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file
            .read_exact_at(buf, offset)
            .map_err(|e| with_path(e, "read failed on", &self.path).into())
    }

    /// Write all of `buf` at `offset`
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is read-only", self.path),
            )
            .into());
        }

        self.file
            .write_all_at(buf, offset)
            .map_err(|e| with_path(e, "write failed on", &self.path).into())
    }

    /// Sync data only (not metadata) to disk
    pub fn sync_data(&self) -> Result<()> {
        self.file
            .sync_data()
            .map_err(|e| with_path(e, "sync_data failed on", &self.path).into())
    }
}

fn with_path(e: io::Error, what: &str, path: &str) -> io::Error {
    io::Error::new(e.kind(), format!("{what} {path}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_raw_file_create_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("member0.img");

        {
            let file = RawFile::create(&path, 8192).unwrap();
            assert_eq!(file.size(), 8192);
            file.write_at(3, b"test data pattern").unwrap();
            file.sync_data().unwrap();
        }

        {
            let file = RawFile::open(&path, true).unwrap();
            assert_eq!(file.size(), 8192);
            let mut buf = vec![0u8; 17];
            file.read_at(3, &mut buf).unwrap();
            assert_eq!(&buf, b"test data pattern");

            let mut zeros = [0xAAu8; 3];
            file.read_at(0, &mut zeros).unwrap();
            assert_eq!(zeros, [0, 0, 0]);
        }
    }

    #[test]
    fn test_read_only_rejects_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.img");
        RawFile::create(&path, 1024).unwrap();

        let file = RawFile::open(&path, true).unwrap();
        assert!(file.write_at(0, b"x").is_err());
    }

    #[test]
    fn test_short_read_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.img");
        let file = RawFile::create(&path, 16).unwrap();

        let mut buf = [0u8; 8];
        assert!(file.read_at(12, &mut buf).is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempdir().unwrap();
        let err = RawFile::open(dir.path().join("nope.img"), false).unwrap_err();
        assert!(err.to_string().contains("failed to open"));
    }
}
