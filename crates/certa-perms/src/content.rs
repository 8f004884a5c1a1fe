//! Streamed file encryption under a content key.
//!
//! Files are sealed with ChaCha20-Poly1305 in the STREAM construction: the
//! plaintext is cut into [`CHUNK_SIZE`] chunks, each sealed under a nonce
//! made of a random prefix and a big-endian chunk counter. The final chunk
//! (possibly empty) is sealed with the last-block flag, so truncation and
//! reordering are both detected.
//!
//! Layout: `version (1) || nonce prefix (7) || sealed chunks`.
//!
//! Output is written to a temporary file beside the target and renamed into
//! place only after the whole stream succeeded.

use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::stream::{DecryptorBE32, EncryptorBE32};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit};
use rand::RngCore;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{PermsError, Result};
use crate::keys::ContentKey;

/// Plaintext bytes per sealed chunk.
pub const CHUNK_SIZE: usize = 4096;

const TAG_SIZE: usize = 16;
const NONCE_PREFIX_SIZE: usize = 7;
const FORMAT_VERSION: u8 = 1;

fn cipher(key: &ContentKey) -> Result<ChaCha20Poly1305> {
    ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| PermsError::EncryptionError(e.to_string()))
}

// Fill `buf` unless the reader runs dry first.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Encrypt everything `reader` yields into `writer`.
pub fn encrypt_stream<R: Read, W: Write>(key: &ContentKey, mut reader: R, writer: &mut W) -> Result<()> {
    let mut prefix = [0u8; NONCE_PREFIX_SIZE];
    rand::thread_rng().fill_bytes(&mut prefix);
    let mut encryptor = EncryptorBE32::from_aead(cipher(key)?, GenericArray::from_slice(&prefix));

    writer.write_all(&[FORMAT_VERSION])?;
    writer.write_all(&prefix)?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let last = loop {
        let n = read_chunk(&mut reader, &mut buf)?;
        if n < CHUNK_SIZE {
            break n;
        }
        let sealed = encryptor
            .encrypt_next(buf.as_slice())
            .map_err(|e| PermsError::EncryptionError(e.to_string()))?;
        writer.write_all(&sealed)?;
    };

    let sealed = encryptor
        .encrypt_last(&buf[..last])
        .map_err(|e| PermsError::EncryptionError(e.to_string()))?;
    writer.write_all(&sealed)?;
    Ok(())
}

/// Decrypt a stream produced by [`encrypt_stream`].
pub fn decrypt_stream<R: Read, W: Write>(key: &ContentKey, mut reader: R, writer: &mut W) -> Result<()> {
    let mut header = [0u8; 1 + NONCE_PREFIX_SIZE];
    reader.read_exact(&mut header).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => PermsError::InvalidCiphertext("missing header".into()),
        _ => PermsError::Io(e),
    })?;
    if header[0] != FORMAT_VERSION {
        return Err(PermsError::InvalidCiphertext(format!(
            "unsupported format version {}",
            header[0]
        )));
    }
    let mut decryptor =
        DecryptorBE32::from_aead(cipher(key)?, GenericArray::from_slice(&header[1..]));

    let mut buf = vec![0u8; CHUNK_SIZE + TAG_SIZE];
    let last = loop {
        let n = read_chunk(&mut reader, &mut buf)?;
        if n < buf.len() {
            break n;
        }
        let plain = decryptor
            .decrypt_next(buf.as_slice())
            .map_err(|e| PermsError::DecryptionError(e.to_string()))?;
        writer.write_all(&plain)?;
    };

    if last < TAG_SIZE {
        return Err(PermsError::InvalidCiphertext("truncated final chunk".into()));
    }
    let plain = decryptor
        .decrypt_last(&buf[..last])
        .map_err(|e| PermsError::DecryptionError(e.to_string()))?;
    writer.write_all(&plain)?;
    Ok(())
}

/// Write `output` through a temporary file in the same directory.
///
/// The target is only replaced once `fill` and the flush both succeeded.
pub fn write_atomically<F>(output: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        fill(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(output).map_err(|e| PermsError::Io(e.error))?;
    Ok(())
}

/// Encrypt `input` into `output`, replacing any existing file.
pub fn encrypt_file(key: &ContentKey, input: &Path, output: &Path) -> Result<()> {
    let reader = BufReader::new(File::open(input)?);
    write_atomically(output, |w| encrypt_stream(key, reader, w))
}

/// Decrypt `input` into `output`, replacing any existing file.
///
/// On failure `output` is left as it was.
pub fn decrypt_file(key: &ContentKey, input: &Path, output: &Path) -> Result<()> {
    let reader = BufReader::new(File::open(input)?);
    write_atomically(output, |w| decrypt_stream(key, reader, w))
}
