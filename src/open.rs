use crate::compression::SegmentDecompressor;
use crate::crypto::{KeySchedule, SegmentCipher};
use crate::error::{LinaError, Result};
use crate::format::{
    CipherAlgo, CompressionAlgo, Profile, Prologue, RootHeader, MAC_LEN, ROOT_HEADER_SIZE,
    SALT_LEN, SEGMENT_HEADER_SIZE,
};
use crate::keys::{PublicKey, SymmetricKey, SIGNATURE_LEN};
use indicatif::ProgressBar;
use sha2::{Digest, Sha256};
use std::io::{self, Read};
use tracing::{debug, trace};

const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

#[derive(Default, Clone, Copy)]
pub struct OpenKeys<'a> {
    pub verify: Option<&'a PublicKey>,
    pub symmetric: Option<&'a SymmetricKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub profile: Profile,
    pub auth_data: Vec<u8>,
    pub root: RootHeader,
}

#[derive(Debug)]
pub struct OpenedArchive {
    pub info: ContainerInfo,
    pub payload: Vec<u8>,
}

struct RootBlock {
    signature: [u8; SIGNATURE_LEN],
    root_mac: [u8; MAC_LEN],
    salt: [u8; SALT_LEN],
    root_raw: [u8; ROOT_HEADER_SIZE],
    root: RootHeader,
}

impl RootBlock {
    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut signature = [0u8; SIGNATURE_LEN];
        let mut root_mac = [0u8; MAC_LEN];
        let mut salt = [0u8; SALT_LEN];
        let mut root_raw = [0u8; ROOT_HEADER_SIZE];
        for part in [
            &mut signature[..],
            &mut root_mac[..],
            &mut salt[..],
            &mut root_raw[..],
        ] {
            reader
                .read_exact(part)
                .map_err(|_| LinaError::InvalidArchive("truncated root block".into()))?;
        }
        let root = RootHeader::from_bytes(root_raw)?;
        Ok(Self {
            signature,
            root_mac,
            salt,
            root_raw,
            root,
        })
    }
}

pub fn inspect<R: Read>(mut reader: R) -> Result<ContainerInfo> {
    let prologue = Prologue::read_from(&mut reader)?;
    let block = RootBlock::read_from(&mut reader)?;
    Ok(ContainerInfo {
        profile: prologue.profile,
        auth_data: prologue.auth_data,
        root: block.root,
    })
}

// Nothing is returned before the root MAC and signature check out.
pub fn open<R: Read>(
    mut reader: R,
    keys: &OpenKeys<'_>,
    pb: Option<&ProgressBar>,
) -> Result<OpenedArchive> {
    let prologue = Prologue::read_from(&mut reader)?;
    let prologue_raw = prologue.to_bytes();
    let block = RootBlock::read_from(&mut reader)?;
    let profile = prologue.profile;
    let root = block.root;
    check_profile_cipher(profile, root.cipher)?;
    if !profile.is_signed() && block.signature.iter().any(|b| *b != 0) {
        return Err(LinaError::InvalidArchive(
            "unsigned container carries a signature".into(),
        ));
    }
    if profile.is_signed() && keys.verify.is_none() {
        return Err(LinaError::InvalidFormat(format!(
            "profile {} requires the signer's public key",
            profile.id()
        )));
    }
    debug!(
        profile = profile.name(),
        cipher = root.cipher.name(),
        segments = root.segment_count,
        raw_size = root.raw_size,
        "opening container"
    );

    let schedule = KeySchedule::derive(profile, &block.salt, keys.symmetric, keys.verify)?;
    let mut cipher = SegmentCipher::new(root.cipher, &schedule)?;
    let mut decompressor = match root.compression {
        CompressionAlgo::Zstd => Some(SegmentDecompressor::new()?),
        CompressionAlgo::None => None,
    };
    let mut payload = Vec::with_capacity(root.raw_size.min(MAX_PREALLOC) as usize);
    let mut tags = Sha256::new();

    for index in 0..root.segment_count {
        let mut header = [0u8; SEGMENT_HEADER_SIZE];
        read_segment_part(&mut reader, &mut header)?;
        let stored_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let raw_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let is_last = index + 1 == root.segment_count;
        check_segment_lengths(&root, stored_len, raw_len, is_last)?;

        let mut stored = vec![0u8; stored_len as usize];
        read_segment_part(&mut reader, &mut stored)?;
        let mut tag = vec![0u8; cipher.tag_len()];
        read_segment_part(&mut reader, &mut tag)?;
        cipher.open(&header, &mut stored, &tag)?;
        tags.update(&tag);

        if stored_len < raw_len {
            let decompressor = decompressor.as_mut().ok_or_else(|| {
                LinaError::InvalidArchive("compressed segment in uncompressed container".into())
            })?;
            payload.extend_from_slice(&decompressor.decompress(&stored, raw_len as usize)?);
        } else {
            payload.extend_from_slice(&stored);
        }
        trace!(index, stored = stored_len, raw = raw_len, "opened segment");
        if let Some(pb) = pb {
            pb.inc(raw_len as u64);
        }
    }

    if payload.len() as u64 != root.raw_size {
        return Err(LinaError::InvalidArchive(
            "payload size does not match root header".into(),
        ));
    }
    let mut probe = [0u8; 1];
    if read_some(&mut reader, &mut probe)? != 0 {
        return Err(LinaError::InvalidArchive(
            "trailing data after last segment".into(),
        ));
    }

    let digest = tags.finalize();
    schedule.verify_root_mac(
        &[&prologue_raw[..], &block.salt[..], &block.root_raw[..], &digest[..]],
        &block.root_mac,
    )?;
    if let Some(public) = keys.verify.filter(|_| profile.is_signed()) {
        let message = [
            &prologue_raw[..],
            &block.salt[..],
            &block.root_raw[..],
            &digest[..],
            &block.root_mac[..],
        ]
        .concat();
        public.verify(&message, &block.signature)?;
    }

    Ok(OpenedArchive {
        info: ContainerInfo {
            profile,
            auth_data: prologue.auth_data,
            root,
        },
        payload,
    })
}

fn check_profile_cipher(profile: Profile, cipher: CipherAlgo) -> Result<()> {
    if profile.is_encrypted() != cipher.is_aead() {
        return Err(LinaError::InvalidArchive(format!(
            "cipher {} does not match profile {}",
            cipher.name(),
            profile.id()
        )));
    }
    Ok(())
}

fn check_segment_lengths(root: &RootHeader, stored_len: u32, raw_len: u32, is_last: bool) -> Result<()> {
    if raw_len == 0 || raw_len > root.segment_size {
        return Err(LinaError::InvalidArchive(format!(
            "segment length out of range: {raw_len}"
        )));
    }
    if !is_last && raw_len != root.segment_size {
        return Err(LinaError::InvalidArchive("short segment before the last".into()));
    }
    if stored_len > raw_len
        || (root.compression == CompressionAlgo::None && stored_len != raw_len)
    {
        return Err(LinaError::InvalidArchive(format!(
            "stored segment length out of range: {stored_len}"
        )));
    }
    Ok(())
}

fn read_segment_part<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            LinaError::InvalidArchive("truncated segment".into())
        } else {
            LinaError::Io(err)
        }
    })
}

fn read_some<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
