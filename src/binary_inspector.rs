//! MD5 hashing, printable-string extraction, substring search (C2).
//!
//! Grounded on `original_source/src/util.py` (`io_md5`, `strings`,
//! `findStringInBinFile`).

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const BLOCK_SIZE: usize = 64 * 1024;

/// Streams the file in 64 KiB blocks through MD5, returning the lowercase
/// hex digest.
pub fn md5_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// A printable ASCII byte per the `string` module's `printable` set used by
/// the original Python (letters, digits, punctuation, whitespace).
fn is_printable(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte) || matches!(byte, b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// A finite, restartable iterator over the maximal runs of printable bytes
/// in a file that are at least `min_len` bytes long. Restartable because
/// C8 calls `strings()` many times per binary (§9) and re-reading the file
/// from disk is simpler and no less correct than buffering it all in memory.
pub struct Strings {
    reader: BufReader<File>,
    min_len: usize,
}

impl Strings {
    pub fn open(path: &Path, min_len: usize) -> std::io::Result<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
            min_len,
        })
    }
}

impl Iterator for Strings {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut run = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => {
                    // EOF: flush whatever run we were accumulating.
                    return if run.len() >= self.min_len {
                        Some(String::from_utf8_lossy(&run).into_owned())
                    } else {
                        None
                    };
                }
                Ok(_) => {
                    if is_printable(byte[0]) {
                        run.push(byte[0]);
                    } else if run.len() >= self.min_len {
                        return Some(String::from_utf8_lossy(&run).into_owned());
                    } else {
                        run.clear();
                    }
                }
                Err(_) => return None,
            }
        }
    }
}

/// Convenience entry point mirroring `util.strings(filePath, minLength)`.
pub fn strings(path: &Path, min_len: usize) -> std::io::Result<Strings> {
    Strings::open(path, min_len)
}

/// True iff some yielded string of `strings(file, 4)` contains `needle`.
pub fn contains_string(path: &Path, needle: &str) -> std::io::Result<bool> {
    for s in strings(path, 4)? {
        if s.contains(needle) {
            return Ok(true);
        }
    }
    Ok(false)
}
