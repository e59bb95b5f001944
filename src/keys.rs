use crate::error::{LinaError, Result};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

// Raw X9.63 private key: 0x04 || X || Y || D.
pub const PRIVATE_KEY_LEN: usize = 97;
pub const PUBLIC_KEY_LEN: usize = 65;
pub const SYMMETRIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

const SEC1_UNCOMPRESSED: u8 = 0x04;
const SCALAR_LEN: usize = 32;

pub struct PrivateKey {
    signing: SigningKey,
    public: PublicKey,
}

impl PrivateKey {
    pub fn from_x963(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(LinaError::InvalidKeySize {
                actual: bytes.len(),
            });
        }
        if bytes[0] != SEC1_UNCOMPRESSED {
            return Err(LinaError::InvalidKeyFormat(
                "missing uncompressed point prefix".into(),
            ));
        }
        let signing = SigningKey::from_slice(&bytes[PUBLIC_KEY_LEN..])
            .map_err(|_| LinaError::InvalidKeyFormat("private scalar out of range".into()))?;
        let public = PublicKey::from_verifying_key(signing.verifying_key().clone())?;
        if public.as_bytes()[..] != bytes[..PUBLIC_KEY_LEN] {
            return Err(LinaError::InvalidKeyFormat(
                "public point does not match private scalar".into(),
            ));
        }
        Ok(Self { signing, public })
    }

    pub fn generate() -> Result<Self> {
        let rng = SystemRandom::new();
        let mut scalar = Zeroizing::new([0u8; SCALAR_LEN]);
        // A random 256-bit string is a valid scalar with overwhelming probability.
        for _ in 0..8 {
            rng.fill(&mut scalar[..])
                .map_err(|_| LinaError::InvalidFormat("failed to generate key".into()))?;
            if let Ok(signing) = SigningKey::from_slice(&scalar[..]) {
                let public = PublicKey::from_verifying_key(signing.verifying_key().clone())?;
                return Ok(Self { signing, public });
            }
        }
        Err(LinaError::InvalidFormat("failed to generate key".into()))
    }

    pub fn to_x963(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(PRIVATE_KEY_LEN));
        out.extend_from_slice(self.public.as_bytes());
        out.extend_from_slice(&self.signing.to_bytes());
        out
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN]> {
        let signature: Signature = self
            .signing
            .try_sign(message)
            .map_err(|_| LinaError::SigningFailed)?;
        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(&signature.to_bytes());
        Ok(out)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct PublicKey {
    bytes: [u8; PUBLIC_KEY_LEN],
    verifying: VerifyingKey,
}

impl PublicKey {
    pub fn from_sec1(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_LEN || bytes[0] != SEC1_UNCOMPRESSED {
            return Err(LinaError::InvalidKeyFormat(format!(
                "public key must be a {PUBLIC_KEY_LEN}-byte uncompressed point"
            )));
        }
        let verifying = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|_| LinaError::InvalidKeyFormat("point is not on P-256".into()))?;
        let mut raw = [0u8; PUBLIC_KEY_LEN];
        raw.copy_from_slice(bytes);
        Ok(Self {
            bytes: raw,
            verifying,
        })
    }

    fn from_verifying_key(verifying: VerifyingKey) -> Result<Self> {
        let encoded = verifying.to_encoded_point(false);
        let mut bytes = [0u8; PUBLIC_KEY_LEN];
        if encoded.as_bytes().len() != PUBLIC_KEY_LEN {
            return Err(LinaError::InvalidKeyFormat("unexpected point encoding".into()));
        }
        bytes.copy_from_slice(encoded.as_bytes());
        Ok(Self { bytes, verifying })
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.bytes
    }

    pub fn verify(&self, message: &[u8], signature: &[u8; SIGNATURE_LEN]) -> Result<()> {
        let signature =
            Signature::from_slice(signature).map_err(|_| LinaError::AuthenticationFailed)?;
        self.verifying
            .verify(message, &signature)
            .map_err(|_| LinaError::AuthenticationFailed)
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PublicKey {}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey(")?;
        for b in &self.bytes[1..9] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "..)")
    }
}

pub struct SymmetricKey(Zeroizing<[u8; SYMMETRIC_KEY_LEN]>);

impl SymmetricKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SYMMETRIC_KEY_LEN {
            return Err(LinaError::InvalidKeyFormat(format!(
                "symmetric key must be {SYMMETRIC_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn generate() -> Result<Self> {
        let mut key = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
        SystemRandom::new()
            .fill(&mut key[..])
            .map_err(|_| LinaError::InvalidFormat("failed to generate key".into()))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

pub fn verification_key(bytes: &[u8]) -> Result<PublicKey> {
    match bytes.len() {
        PRIVATE_KEY_LEN => Ok(PrivateKey::from_x963(bytes)?.public_key().clone()),
        PUBLIC_KEY_LEN => PublicKey::from_sec1(bytes),
        actual => Err(LinaError::InvalidKeySize { actual }),
    }
}

pub fn read_key_file(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    std::fs::read(path)
        .map(Zeroizing::new)
        .map_err(|e| LinaError::read_failed(path, e))
}
