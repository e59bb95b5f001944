use crate::compression::SegmentCompressor;
use crate::crypto::{random_salt, KeySchedule, SegmentCipher};
use crate::error::{LinaError, Result};
use crate::extract::read_entries;
use crate::format::{
    CipherAlgo, CompressionAlgo, Profile, Prologue, RootHeader, DEFAULT_SEGMENT_SIZE,
    MAX_SEGMENT_SIZE, MIN_SEGMENT_SIZE, ROOT_BLOCK_SIZE, SEGMENT_HEADER_SIZE,
};
use crate::keys::{PrivateKey, SymmetricKey, SIGNATURE_LEN};
use indicatif::ProgressBar;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, trace};

pub const DEFAULT_LEVEL: i32 = 6;

#[derive(Debug, Clone, Copy)]
pub struct SealOptions {
    pub profile: Profile,
    pub cipher: CipherAlgo,
    pub level: i32,
    pub segment_size: u32,
}

impl Default for SealOptions {
    fn default() -> Self {
        Self {
            profile: Profile::Signed,
            cipher: CipherAlgo::ChaCha20Poly1305,
            level: DEFAULT_LEVEL,
            segment_size: DEFAULT_SEGMENT_SIZE,
        }
    }
}

impl SealOptions {
    fn segment_cipher(&self) -> Result<CipherAlgo> {
        match (self.profile.is_encrypted(), self.cipher) {
            (false, _) => Ok(CipherAlgo::HmacSha256),
            (true, CipherAlgo::HmacSha256) => Err(LinaError::InvalidFormat(format!(
                "profile {} needs an AEAD cipher",
                self.profile.id()
            ))),
            (true, aead) => Ok(aead),
        }
    }

    fn validate(&self) -> Result<()> {
        if !(MIN_SEGMENT_SIZE..=MAX_SEGMENT_SIZE).contains(&self.segment_size) {
            return Err(LinaError::InvalidFormat(format!(
                "segment size must be between {MIN_SEGMENT_SIZE} and {MAX_SEGMENT_SIZE} bytes"
            )));
        }
        if !(crate::compression::MIN_LEVEL..=crate::compression::MAX_LEVEL).contains(&self.level) {
            return Err(LinaError::InvalidFormat(format!(
                "compression level out of range: {}",
                self.level
            )));
        }
        Ok(())
    }
}

#[derive(Default, Clone, Copy)]
pub struct SealKeys<'a> {
    pub signing: Option<&'a PrivateKey>,
    pub symmetric: Option<&'a SymmetricKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealSummary {
    pub raw_size: u64,
    pub segment_count: u32,
    pub container_size: u64,
}

// The root block is filled in after the last segment, hence `Seek`.
pub fn seal<R: Read, W: Write + Seek>(
    mut reader: R,
    writer: &mut W,
    auth_data: &[u8],
    keys: &SealKeys<'_>,
    options: &SealOptions,
    pb: Option<&ProgressBar>,
) -> Result<SealSummary> {
    options.validate()?;
    let profile = options.profile;
    let cipher_algo = options.segment_cipher()?;
    let signer = if profile.is_signed() {
        Some(keys.signing.ok_or_else(|| {
            LinaError::InvalidFormat(format!("profile {} requires a private key", profile.id()))
        })?)
    } else {
        None
    };

    let prologue = Prologue::new(profile, auth_data.to_vec())?.to_bytes();
    let salt = random_salt()?;
    let schedule = KeySchedule::derive(
        profile,
        &salt,
        keys.symmetric,
        signer.map(PrivateKey::public_key),
    )?;
    let mut cipher = SegmentCipher::new(cipher_algo, &schedule)?;
    let mut compressor = if options.level == 0 {
        None
    } else {
        Some(SegmentCompressor::new(options.level)?)
    };
    debug!(
        profile = profile.name(),
        cipher = cipher_algo.name(),
        level = options.level,
        segment_size = options.segment_size,
        "sealing container"
    );

    let start = writer.stream_position()?;
    writer.write_all(&prologue)?;
    let root_block_pos = writer.stream_position()?;
    writer.write_all(&[0u8; ROOT_BLOCK_SIZE])?;

    let mut buf = vec![0u8; options.segment_size as usize];
    let mut tags = Sha256::new();
    let mut raw_size = 0u64;
    let mut segment_count = 0u32;
    loop {
        let n = read_full(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        let raw = &buf[..n];
        let mut stored = match compressor.as_mut() {
            Some(c) => c.compress(raw)?.unwrap_or_else(|| raw.to_vec()),
            None => raw.to_vec(),
        };
        let mut header = [0u8; SEGMENT_HEADER_SIZE];
        header[0..4].copy_from_slice(&(stored.len() as u32).to_le_bytes());
        header[4..8].copy_from_slice(&(n as u32).to_le_bytes());
        let tag = cipher.seal(&header, &mut stored)?;
        writer.write_all(&header)?;
        writer.write_all(&stored)?;
        writer.write_all(&tag)?;
        tags.update(&tag);
        trace!(index = segment_count, raw = n, stored = stored.len(), "sealed segment");

        segment_count = segment_count
            .checked_add(1)
            .ok_or_else(|| LinaError::InvalidFormat("too many segments".into()))?;
        raw_size += n as u64;
        if let Some(pb) = pb {
            pb.inc(n as u64);
        }
        if n < buf.len() {
            break;
        }
    }
    if segment_count == 0 {
        return Err(LinaError::InvalidArchive("archive is empty".into()));
    }

    let root = RootHeader {
        raw_size,
        segment_size: options.segment_size,
        segment_count,
        compression: if compressor.is_some() {
            CompressionAlgo::Zstd
        } else {
            CompressionAlgo::None
        },
        cipher: cipher_algo,
    }
    .to_bytes();
    let digest = tags.finalize();
    let root_mac = schedule.root_mac(&[&prologue[..], &salt[..], &root[..], &digest[..]])?;
    let signature = match signer {
        Some(key) => {
            let message = [&prologue[..], &salt[..], &root[..], &digest[..], &root_mac[..]].concat();
            key.sign(&message)?
        }
        None => [0u8; SIGNATURE_LEN],
    };

    let end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(root_block_pos))?;
    writer.write_all(&signature)?;
    writer.write_all(&root_mac)?;
    writer.write_all(&salt)?;
    writer.write_all(&root)?;
    writer.seek(SeekFrom::Start(end))?;
    writer.flush()?;

    debug!(raw_size, segment_count, bytes = end - start, "container sealed");
    Ok(SealSummary {
        raw_size,
        segment_count,
        container_size: end - start,
    })
}

// Key length is checked before the archive is touched.
pub fn create_aea_from_aar(aar_path: &Path, private_key: &[u8], auth_data: &[u8]) -> Result<Vec<u8>> {
    let key = PrivateKey::from_x963(private_key)?;
    let keys = SealKeys {
        signing: Some(&key),
        symmetric: None,
    };
    let mut out = Cursor::new(Vec::new());
    seal_aar_file(aar_path, &mut out, auth_data, &keys, &SealOptions::default(), None)?;
    Ok(out.into_inner())
}

pub fn seal_aar_file<W: Write + Seek>(
    aar_path: &Path,
    writer: &mut W,
    auth_data: &[u8],
    keys: &SealKeys<'_>,
    options: &SealOptions,
    pb: Option<&ProgressBar>,
) -> Result<SealSummary> {
    let mut file = File::open(aar_path).map_err(|e| LinaError::read_failed(aar_path, e))?;
    let entries = read_entries(BufReader::new(&mut file)).map_err(|err| match err {
        LinaError::InvalidArchive(msg) => LinaError::InvalidArchive(msg),
        LinaError::Io(io_err) => LinaError::read_failed(aar_path, io_err),
        other => LinaError::InvalidArchive(other.to_string()),
    })?;
    debug!(path = %aar_path.display(), entries = entries.len(), "validated plain archive");
    file.seek(SeekFrom::Start(0))?;
    seal(BufReader::new(file), writer, auth_data, keys, options, pb)
}

pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
