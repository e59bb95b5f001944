use crate::error::{LinaError, Result};
use crate::keys::SIGNATURE_LEN;
use std::io::Read;

pub const MAGIC: &[u8; 4] = b"AEA1";
pub const PROLOGUE_FIXED_SIZE: usize = 12;
pub const MAX_AUTH_DATA_LEN: usize = 1024 * 1024;
pub const SALT_LEN: usize = 32;
pub const MAC_LEN: usize = 32;
pub const ROOT_HEADER_SIZE: usize = 32;
pub const ROOT_BLOCK_SIZE: usize = SIGNATURE_LEN + MAC_LEN + SALT_LEN + ROOT_HEADER_SIZE;
pub const SEGMENT_HEADER_SIZE: usize = 8;

pub const DEFAULT_SEGMENT_SIZE: u32 = 1024 * 1024;
pub const MIN_SEGMENT_SIZE: u32 = 16 * 1024;
pub const MAX_SEGMENT_SIZE: u32 = 16 * 1024 * 1024;

const PROFILE_MASK: u32 = 0x00ff_ffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Signed = 0,
    Symmetric = 1,
    SymmetricSigned = 2,
}

impl Profile {
    pub fn from_id(id: u32) -> Result<Self> {
        match id {
            0 => Ok(Profile::Signed),
            1 => Ok(Profile::Symmetric),
            2 => Ok(Profile::SymmetricSigned),
            other => Err(LinaError::UnsupportedProfile(other)),
        }
    }

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Profile::Signed => "hkdf_sha256_hmac__none__ecdsa_p256",
            Profile::Symmetric => "hkdf_sha256_aead__symmetric__none",
            Profile::SymmetricSigned => "hkdf_sha256_aead__symmetric__ecdsa_p256",
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Profile::Signed | Profile::SymmetricSigned)
    }

    pub fn is_encrypted(self) -> bool {
        matches!(self, Profile::Symmetric | Profile::SymmetricSigned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgo {
    None = 0,
    Zstd = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgo {
    HmacSha256 = 0,
    ChaCha20Poly1305 = 1,
    Aes256Gcm = 2,
}

impl CipherAlgo {
    pub fn tag_len(self) -> usize {
        match self {
            CipherAlgo::HmacSha256 => MAC_LEN,
            CipherAlgo::ChaCha20Poly1305 | CipherAlgo::Aes256Gcm => 16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherAlgo::HmacSha256 => "none (HMAC-SHA256)",
            CipherAlgo::ChaCha20Poly1305 => "ChaCha20-Poly1305",
            CipherAlgo::Aes256Gcm => "AES-256-GCM",
        }
    }

    pub fn is_aead(self) -> bool {
        self != CipherAlgo::HmacSha256
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prologue {
    pub profile: Profile,
    pub auth_data: Vec<u8>,
}

impl Prologue {
    pub fn new(profile: Profile, auth_data: Vec<u8>) -> Result<Self> {
        if auth_data.len() > MAX_AUTH_DATA_LEN {
            return Err(LinaError::InvalidFormat(format!(
                "auth data too large: {} bytes (max {MAX_AUTH_DATA_LEN})",
                auth_data.len()
            )));
        }
        Ok(Self { profile, auth_data })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PROLOGUE_FIXED_SIZE + self.auth_data.len());
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&self.profile.id().to_le_bytes());
        buf.extend_from_slice(&(self.auth_data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.auth_data);
        buf
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut fixed = [0u8; PROLOGUE_FIXED_SIZE];
        reader
            .read_exact(&mut fixed)
            .map_err(|_| LinaError::InvalidArchive("truncated container prologue".into()))?;
        if &fixed[0..4] != MAGIC {
            return Err(LinaError::InvalidArchive("not an AEA container".into()));
        }
        let raw_profile = u32::from_le_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
        if raw_profile & !PROFILE_MASK != 0 {
            return Err(LinaError::InvalidArchive("reserved profile bits set".into()));
        }
        let profile = Profile::from_id(raw_profile)?;
        let auth_len = u32::from_le_bytes([fixed[8], fixed[9], fixed[10], fixed[11]]) as usize;
        if auth_len > MAX_AUTH_DATA_LEN {
            return Err(LinaError::InvalidArchive(format!(
                "auth data length out of range: {auth_len}"
            )));
        }
        let mut auth_data = vec![0u8; auth_len];
        reader
            .read_exact(&mut auth_data)
            .map_err(|_| LinaError::InvalidArchive("truncated auth data".into()))?;
        Ok(Self { profile, auth_data })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootHeader {
    pub raw_size: u64,
    pub segment_size: u32,
    pub segment_count: u32,
    pub compression: CompressionAlgo,
    pub cipher: CipherAlgo,
}

impl RootHeader {
    pub fn to_bytes(&self) -> [u8; ROOT_HEADER_SIZE] {
        let mut buf = [0u8; ROOT_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.raw_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.segment_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.segment_count.to_le_bytes());
        buf[16] = self.compression as u8;
        buf[17] = self.cipher as u8;
        buf
    }

    pub fn from_bytes(bytes: [u8; ROOT_HEADER_SIZE]) -> Result<Self> {
        if bytes[18..].iter().any(|b| *b != 0) {
            return Err(LinaError::InvalidArchive(
                "reserved root header bytes are not zero".into(),
            ));
        }
        let raw_size = u64::from_le_bytes(field(&bytes[0..8]));
        let segment_size = u32::from_le_bytes(field(&bytes[8..12]));
        let segment_count = u32::from_le_bytes(field(&bytes[12..16]));
        if !(MIN_SEGMENT_SIZE..=MAX_SEGMENT_SIZE).contains(&segment_size) {
            return Err(LinaError::InvalidArchive(format!(
                "segment size out of range: {segment_size}"
            )));
        }
        let max_size = segment_count as u64 * segment_size as u64;
        let min_size = (segment_count as u64).saturating_sub(1) * segment_size as u64;
        if raw_size > max_size || (segment_count > 0 && raw_size <= min_size) {
            return Err(LinaError::InvalidArchive(
                "payload size does not match segment count".into(),
            ));
        }
        let compression = match bytes[16] {
            0 => CompressionAlgo::None,
            1 => CompressionAlgo::Zstd,
            other => {
                return Err(LinaError::InvalidArchive(format!(
                    "unknown compression algorithm: {other}"
                )))
            }
        };
        let cipher = match bytes[17] {
            0 => CipherAlgo::HmacSha256,
            1 => CipherAlgo::ChaCha20Poly1305,
            2 => CipherAlgo::Aes256Gcm,
            other => {
                return Err(LinaError::InvalidArchive(format!(
                    "unknown cipher: {other}"
                )))
            }
        };
        Ok(Self {
            raw_size,
            segment_size,
            segment_count,
            compression,
            cipher,
        })
    }
}

fn field<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
