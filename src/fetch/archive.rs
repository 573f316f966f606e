//! Archive extraction for downloaded datasets.
//!
//! Tar archives (plain or gzip compressed) are tried first, zip second.
//! Bzip2 and xz tarballs are recognised by their magic bytes and rejected
//! with an explicit error; repack them as `.tar.gz` or `.zip`.

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];
const BZIP2_MAGIC: [u8; 3] = [b'B', b'Z', b'h'];
const XZ_MAGIC: [u8; 6] = [0xfd, b'7', b'z', b'X', b'Z', 0x00];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    TarGz,
    Zip,
}

/// Guess the archive kind from its leading bytes. Anything unrecognised is
/// treated as an uncompressed tar, which has no reliable magic at offset 0.
/// Bzip2 and xz streams are an error.
pub fn sniff(path: &Path) -> Result<ArchiveKind> {
    let mut head = [0u8; 6];
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let read = read_prefix(&mut file, &mut head)?;
    let head = &head[..read];
    if head.starts_with(&GZIP_MAGIC) {
        Ok(ArchiveKind::TarGz)
    } else if head.starts_with(&ZIP_MAGIC) {
        Ok(ArchiveKind::Zip)
    } else if head.starts_with(&BZIP2_MAGIC) || head.starts_with(&XZ_MAGIC) {
        Err(anyhow!(
            "{}: bz2/xz tarballs are not supported, use .tar, .tar.gz or .zip",
            path.display()
        ))
    } else {
        Ok(ArchiveKind::Tar)
    }
}

/// Unpack `archive` into `dest`. Falls back to zip when the tar reader fails.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<ArchiveKind> {
    let kind = sniff(archive)?;
    if kind == ArchiveKind::Zip {
        unpack_zip(archive, dest)?;
        return Ok(kind);
    }
    match unpack_tar(archive, dest, kind) {
        Ok(()) => Ok(kind),
        Err(tar_err) => {
            log::debug!(
                "tar extraction of {} failed ({}); trying zip",
                archive.display(),
                tar_err
            );
            unpack_zip(archive, dest).map_err(|zip_err| {
                anyhow!(
                    "{} is neither a tar nor a zip archive (tar: {}; zip: {})",
                    archive.display(),
                    tar_err,
                    zip_err
                )
            })?;
            Ok(ArchiveKind::Zip)
        }
    }
}

fn unpack_tar(archive: &Path, dest: &Path, kind: ArchiveKind) -> Result<()> {
    let file = File::open(archive).with_context(|| format!("open {}", archive.display()))?;
    let reader: Box<dyn Read> = match kind {
        ArchiveKind::TarGz => Box::new(GzDecoder::new(BufReader::new(file))),
        _ => Box::new(BufReader::new(file)),
    };
    let mut tar = tar::Archive::new(reader);
    tar.unpack(dest)
        .with_context(|| format!("unpack tar {} into {}", archive.display(), dest.display()))
}

fn unpack_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).with_context(|| format!("open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("read zip {}", archive.display()))?;
    zip.extract(dest)
        .with_context(|| format!("unpack zip {} into {}", archive.display(), dest.display()))
}

fn read_prefix(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_recognises_magic_bytes() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let gz = tmp.path().join("a.bin");
        std::fs::write(&gz, [0x1f, 0x8b, 0x08, 0x00])?;
        assert_eq!(sniff(&gz)?, ArchiveKind::TarGz);

        let zip = tmp.path().join("b.bin");
        std::fs::write(&zip, b"PK\x03\x04rest")?;
        assert_eq!(sniff(&zip)?, ArchiveKind::Zip);

        let short = tmp.path().join("c.bin");
        std::fs::write(&short, b"x")?;
        assert_eq!(sniff(&short)?, ArchiveKind::Tar);
        Ok(())
    }

    #[test]
    fn bzip2_and_xz_are_rejected_up_front() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let bz2 = tmp.path().join("personx.tar.bz2");
        std::fs::write(&bz2, b"BZh91AY&SY")?;
        let xz = tmp.path().join("personx.tar.xz");
        std::fs::write(&xz, [0xfd, b'7', b'z', b'X', b'Z', 0x00, 0x00, 0x04])?;

        let dest = tmp.path().join("out");
        for archive in [&bz2, &xz] {
            let err = extract_archive(archive, &dest).unwrap_err();
            assert!(err.to_string().contains("bz2/xz tarballs are not supported"), "{err}");
        }
        assert!(!dest.exists());
        Ok(())
    }

    #[test]
    fn garbage_is_neither_tar_nor_zip() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let junk = tmp.path().join("junk.bin");
        std::fs::write(&junk, vec![7u8; 2048])?;
        let err = extract_archive(&junk, tmp.path()).unwrap_err();
        assert!(err.to_string().contains("neither a tar nor a zip"));
        Ok(())
    }
}
