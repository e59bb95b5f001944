use crate::error::{LinaError, Result};
use crate::format::{CipherAlgo, Profile, MAC_LEN, SALT_LEN, SEGMENT_HEADER_SIZE};
use crate::keys::{PublicKey, SymmetricKey};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 32;
const NONCE_PREFIX_LEN: usize = 8;

const LABEL_ROOT_MAC: &[u8] = b"AEA_RMK";
const LABEL_SEGMENT_MAC: &[u8] = b"AEA_SMK";
const LABEL_SEGMENT_KEY: &[u8] = b"AEA_SK";
const LABEL_SEGMENT_IV: &[u8] = b"AEA_SIV";

pub fn random_salt() -> Result<[u8; SALT_LEN]> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| LinaError::InvalidFormat("failed to generate salt".into()))?;
    Ok(salt)
}

pub struct KeySchedule {
    root_mac: Zeroizing<[u8; KEY_LEN]>,
    segment_mac: Zeroizing<[u8; KEY_LEN]>,
    segment_key: Zeroizing<[u8; KEY_LEN]>,
    nonce_prefix: [u8; NONCE_PREFIX_LEN],
}

impl KeySchedule {
    pub fn derive(
        profile: Profile,
        salt: &[u8; SALT_LEN],
        symmetric: Option<&SymmetricKey>,
        signer: Option<&PublicKey>,
    ) -> Result<Self> {
        let mut ikm = Zeroizing::new(Vec::with_capacity(KEY_LEN + 65));
        if profile.is_encrypted() {
            let key = symmetric.ok_or_else(|| {
                LinaError::InvalidFormat(format!(
                    "profile {} requires a symmetric key",
                    profile.id()
                ))
            })?;
            ikm.extend_from_slice(key.as_bytes());
        }
        if profile.is_signed() {
            let key = signer.ok_or_else(|| {
                LinaError::InvalidFormat(format!(
                    "profile {} requires a signing public key",
                    profile.id()
                ))
            })?;
            ikm.extend_from_slice(key.as_bytes());
        }

        let hk = Hkdf::<Sha256>::new(Some(&salt[..]), &ikm);
        let mut schedule = Self {
            root_mac: Zeroizing::new([0u8; KEY_LEN]),
            segment_mac: Zeroizing::new([0u8; KEY_LEN]),
            segment_key: Zeroizing::new([0u8; KEY_LEN]),
            nonce_prefix: [0u8; NONCE_PREFIX_LEN],
        };
        expand(&hk, LABEL_ROOT_MAC, profile, &mut schedule.root_mac[..])?;
        expand(&hk, LABEL_SEGMENT_MAC, profile, &mut schedule.segment_mac[..])?;
        expand(&hk, LABEL_SEGMENT_KEY, profile, &mut schedule.segment_key[..])?;
        expand(&hk, LABEL_SEGMENT_IV, profile, &mut schedule.nonce_prefix)?;
        Ok(schedule)
    }

    pub fn root_mac(&self, parts: &[&[u8]]) -> Result<[u8; MAC_LEN]> {
        let mut mac = new_mac(&self.root_mac[..])?;
        for part in parts {
            mac.update(part);
        }
        let mut out = [0u8; MAC_LEN];
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }

    pub fn verify_root_mac(&self, parts: &[&[u8]], tag: &[u8; MAC_LEN]) -> Result<()> {
        let mut mac = new_mac(&self.root_mac[..])?;
        for part in parts {
            mac.update(part);
        }
        mac.verify_slice(tag)
            .map_err(|_| LinaError::AuthenticationFailed)
    }
}

fn expand(hk: &Hkdf<Sha256>, label: &[u8], profile: Profile, out: &mut [u8]) -> Result<()> {
    let mut info = label.to_vec();
    info.push(profile.id() as u8);
    hk.expand(&info, out)
        .map_err(|_| LinaError::InvalidFormat("key derivation failed".into()))
}

fn new_mac(key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key)
        .map_err(|_| LinaError::InvalidFormat("invalid MAC key".into()))
}

fn algo_to_ring(algo: CipherAlgo) -> Result<&'static aead::Algorithm> {
    match algo {
        CipherAlgo::ChaCha20Poly1305 => Ok(&aead::CHACHA20_POLY1305),
        CipherAlgo::Aes256Gcm => Ok(&aead::AES_256_GCM),
        CipherAlgo::HmacSha256 => Err(LinaError::InvalidFormat(
            "cipher is not an AEAD".into(),
        )),
    }
}

#[derive(Clone)]
struct NonceCounter {
    prefix: [u8; NONCE_PREFIX_LEN],
    counter: u32,
}

impl NonceCounter {
    fn new(prefix: [u8; NONCE_PREFIX_LEN]) -> Self {
        Self { prefix, counter: 0 }
    }

    fn next(&mut self) -> Result<Nonce> {
        let ctr = self.counter;
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| LinaError::InvalidFormat("segment nonce counter exhausted".into()))?;
        let mut nonce_bytes = [0u8; aead::NONCE_LEN];
        nonce_bytes[0..NONCE_PREFIX_LEN].copy_from_slice(&self.prefix);
        nonce_bytes[NONCE_PREFIX_LEN..].copy_from_slice(&ctr.to_be_bytes());
        Nonce::try_assume_unique_for_key(&nonce_bytes)
            .map_err(|_| LinaError::InvalidFormat("invalid nonce".into()))
    }
}

enum Protection {
    Mac {
        key: Zeroizing<[u8; KEY_LEN]>,
        index: u32,
    },
    Aead {
        key: LessSafeKey,
        nonce: NonceCounter,
    },
}

// Segment order is authenticated: one instance per stream.
pub struct SegmentCipher {
    algo: CipherAlgo,
    protection: Protection,
}

impl SegmentCipher {
    pub fn new(algo: CipherAlgo, keys: &KeySchedule) -> Result<Self> {
        let protection = if algo.is_aead() {
            let unbound = UnboundKey::new(algo_to_ring(algo)?, &keys.segment_key[..])
                .map_err(|_| LinaError::InvalidFormat("invalid segment key".into()))?;
            Protection::Aead {
                key: LessSafeKey::new(unbound),
                nonce: NonceCounter::new(keys.nonce_prefix),
            }
        } else {
            Protection::Mac {
                key: keys.segment_mac.clone(),
                index: 0,
            }
        };
        Ok(Self { algo, protection })
    }

    pub fn tag_len(&self) -> usize {
        self.algo.tag_len()
    }

    pub fn seal(&mut self, header: &[u8; SEGMENT_HEADER_SIZE], data: &mut [u8]) -> Result<Vec<u8>> {
        match &mut self.protection {
            Protection::Mac { key, index } => {
                let mac = segment_mac(&key[..], *index, header, data)?;
                *index = next_index(*index)?;
                Ok(mac.finalize().into_bytes().to_vec())
            }
            Protection::Aead { key, nonce } => {
                let tag = key
                    .seal_in_place_separate_tag(nonce.next()?, Aad::from(header), data)
                    .map_err(|_| LinaError::InvalidFormat("encryption failed".into()))?;
                Ok(tag.as_ref().to_vec())
            }
        }
    }

    pub fn open(
        &mut self,
        header: &[u8; SEGMENT_HEADER_SIZE],
        data: &mut [u8],
        tag: &[u8],
    ) -> Result<()> {
        match &mut self.protection {
            Protection::Mac { key, index } => {
                let mac = segment_mac(&key[..], *index, header, data)?;
                *index = next_index(*index)?;
                mac.verify_slice(tag)
                    .map_err(|_| LinaError::AuthenticationFailed)
            }
            Protection::Aead { key, nonce } => {
                let tag: aead::Tag = tag
                    .try_into()
                    .map_err(|_| LinaError::AuthenticationFailed)?;
                key.open_in_place_separate_tag(nonce.next()?, Aad::from(header), tag, data, 0..)
                    .map_err(|_| LinaError::AuthenticationFailed)?;
                Ok(())
            }
        }
    }
}

fn segment_mac(
    key: &[u8],
    index: u32,
    header: &[u8; SEGMENT_HEADER_SIZE],
    data: &[u8],
) -> Result<HmacSha256> {
    let mut mac = new_mac(key)?;
    mac.update(&index.to_le_bytes());
    mac.update(header);
    mac.update(data);
    Ok(mac)
}

fn next_index(index: u32) -> Result<u32> {
    index
        .checked_add(1)
        .ok_or_else(|| LinaError::InvalidFormat("segment index exhausted".into()))
}
