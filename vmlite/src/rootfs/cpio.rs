//! Minimal writer for the `newc` cpio format the kernel unpacks as initramfs.
//!
//! Every header is the magic `070701` followed by thirteen 8-digit hex
//! fields. Names and file data are padded to 4-byte boundaries. Timestamps
//! and ownership are zeroed so identical trees produce identical archives.

use std::io::{self, Read, Write};
use std::path::Path;

use walkdir::WalkDir;

const MAGIC: &str = "070701";
const TRAILER: &str = "TRAILER!!!";
const HEADER_LEN: usize = 110;

const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;
const S_IFCHR: u32 = 0o020000;

pub struct CpioWriter<W: Write> {
    inner: W,
    next_ino: u32,
}

struct Header<'a> {
    name: &'a str,
    mode: u32,
    nlink: u32,
    size: u32,
    rdev: (u32, u32),
}

impl<W: Write> CpioWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, next_ino: 1 }
    }

    pub fn append_dir(&mut self, name: &str, perm: u32) -> io::Result<()> {
        self.write_header(Header {
            name,
            mode: S_IFDIR | (perm & 0o7777),
            nlink: 2,
            size: 0,
            rdev: (0, 0),
        })
    }

    pub fn append_file<R: Read>(
        &mut self,
        name: &str,
        perm: u32,
        size: u64,
        mut data: R,
    ) -> io::Result<()> {
        let size = u32::try_from(size).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is too large for newc", name),
            )
        })?;
        self.write_header(Header {
            name,
            mode: S_IFREG | (perm & 0o7777),
            nlink: 1,
            size,
            rdev: (0, 0),
        })?;
        let copied = io::copy(&mut (&mut data).take(size as u64), &mut self.inner)?;
        if copied != size as u64 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} shrank while archiving", name),
            ));
        }
        self.pad(size as usize)
    }

    pub fn append_symlink(&mut self, name: &str, target: &str) -> io::Result<()> {
        self.write_header(Header {
            name,
            mode: S_IFLNK | 0o777,
            nlink: 1,
            size: target.len() as u32,
            rdev: (0, 0),
        })?;
        self.inner.write_all(target.as_bytes())?;
        self.pad(target.len())
    }

    pub fn append_char_device(
        &mut self,
        name: &str,
        perm: u32,
        major: u32,
        minor: u32,
    ) -> io::Result<()> {
        self.write_header(Header {
            name,
            mode: S_IFCHR | (perm & 0o7777),
            nlink: 1,
            size: 0,
            rdev: (major, minor),
        })
    }

    /// Write the trailer and hand back the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.next_ino = 0;
        self.write_header(Header {
            name: TRAILER,
            mode: 0,
            nlink: 1,
            size: 0,
            rdev: (0, 0),
        })?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn write_header(&mut self, header: Header<'_>) -> io::Result<()> {
        let ino = self.next_ino;
        if ino != 0 {
            self.next_ino += 1;
        }
        let namesize = header.name.len() + 1;
        let fields = [
            ino,
            header.mode,
            0, // uid
            0, // gid
            header.nlink,
            0, // mtime
            header.size,
            0, // devmajor
            0, // devminor
            header.rdev.0,
            header.rdev.1,
            namesize as u32,
            0, // check
        ];

        let mut buf = String::with_capacity(HEADER_LEN);
        buf.push_str(MAGIC);
        for field in fields {
            buf.push_str(&format!("{:08x}", field));
        }
        self.inner.write_all(buf.as_bytes())?;
        self.inner.write_all(header.name.as_bytes())?;
        self.inner.write_all(&[0])?;
        self.pad(HEADER_LEN + namesize)
    }

    fn pad(&mut self, written: usize) -> io::Result<()> {
        let padding = (4 - written % 4) % 4;
        self.inner.write_all(&[0u8; 3][..padding])
    }
}

/// Append every entry under `root` (sorted by path, root itself excluded).
pub fn append_tree<W: Write>(writer: &mut CpioWriter<W>, root: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?
            .to_string_lossy()
            .into_owned();
        let meta = entry.path().symlink_metadata()?;
        let perm = meta.permissions().mode();

        if meta.file_type().is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            writer.append_symlink(&rel, &target.to_string_lossy())?;
        } else if meta.is_dir() {
            writer.append_dir(&rel, perm)?;
        } else if meta.is_file() {
            let file = std::fs::File::open(entry.path())?;
            writer.append_file(&rel, perm, meta.len(), file)?;
        } else {
            tracing::debug!(path = %entry.path().display(), "Skipping special file");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parse `(name, mode, body)` entries back out of an archive.
    fn entries(bytes: &[u8]) -> Vec<(String, u32, Vec<u8>)> {
        let mut out = Vec::new();
        let mut pos = 0;
        loop {
            let header = std::str::from_utf8(&bytes[pos..pos + HEADER_LEN]).unwrap();
            assert_eq!(&header[..6], MAGIC);
            let field = |i: usize| u32::from_str_radix(&header[6 + i * 8..14 + i * 8], 16).unwrap();
            let mode = field(1);
            let size = field(6) as usize;
            let namesize = field(11) as usize;
            let name_start = pos + HEADER_LEN;
            let name = std::str::from_utf8(&bytes[name_start..name_start + namesize - 1])
                .unwrap()
                .to_string();
            let data_start = (name_start + namesize).div_ceil(4) * 4;
            let body = bytes[data_start..data_start + size].to_vec();
            pos = (data_start + size).div_ceil(4) * 4;
            if name == TRAILER {
                break;
            }
            out.push((name, mode, body));
        }
        out
    }

    #[test]
    fn test_headers_are_aligned() {
        let mut writer = CpioWriter::new(Vec::new());
        writer.append_dir("bin", 0o755).unwrap();
        writer.append_file("bin/x", 0o755, 3, &b"abc"[..]).unwrap();
        let bytes = writer.finish().unwrap();

        assert_eq!(bytes.len() % 4, 0);
        let parsed = entries(&bytes);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, "bin");
        assert_eq!(parsed[0].1, S_IFDIR | 0o755);
        assert_eq!(parsed[1].2, b"abc");
    }

    #[test]
    fn test_symlink_and_device() {
        let mut writer = CpioWriter::new(Vec::new());
        writer.append_symlink("bin/sh", "busybox").unwrap();
        writer.append_char_device("dev/console", 0o600, 5, 1).unwrap();
        let bytes = writer.finish().unwrap();

        let parsed = entries(&bytes);
        assert_eq!(parsed[0].1 & 0o170000, S_IFLNK);
        assert_eq!(parsed[0].2, b"busybox");
        assert_eq!(parsed[1].1, S_IFCHR | 0o600);
    }

    #[test]
    fn test_short_reader_is_an_error() {
        let mut writer = CpioWriter::new(Vec::new());
        let err = writer.append_file("f", 0o644, 10, &b"abc"[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_append_tree_is_sorted() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("sbin")).unwrap();
        std::fs::create_dir(temp.path().join("bin")).unwrap();
        std::fs::write(temp.path().join("init"), b"#!/bin/sh\n").unwrap();
        std::os::unix::fs::symlink("busybox", temp.path().join("bin/ls")).unwrap();

        let mut writer = CpioWriter::new(Vec::new());
        append_tree(&mut writer, temp.path()).unwrap();
        let bytes = writer.finish().unwrap();

        let names: Vec<_> = entries(&bytes).into_iter().map(|e| e.0).collect();
        assert_eq!(names, vec!["bin", "bin/ls", "init", "sbin"]);
    }
}
