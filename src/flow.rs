use crate::error::{LinaError, Result};
use crate::extract::read_entries;
use crate::format::{Profile, MAX_AUTH_DATA_LEN};
use crate::keys::{self, PrivateKey, SymmetricKey};
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationType {
    Aar,
    Aea,
    Key,
    Auth,
}

impl fmt::Display for CreationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CreationType::Aar => "directory to archive",
            CreationType::Aea => "directory or plain archive to encrypt",
            CreationType::Key => "private key (97-byte X9.63)",
            CreationType::Auth => "authentication data",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Directory,
    PlainArchive,
}

#[derive(Debug)]
pub enum CreateJob {
    Plain {
        input: PathBuf,
    },
    Encrypted {
        input: PathBuf,
        kind: InputKind,
        profile: Profile,
        signing: Option<PrivateKey>,
        symmetric: Option<SymmetricKey>,
        auth_data: Vec<u8>,
    },
}

#[derive(Debug)]
pub enum Step {
    Pick(CreationType),
    Ready(CreateJob),
}

#[derive(Debug)]
pub struct CreateSession {
    profile: Option<Profile>,
    awaiting: CreationType,
    input: Option<(PathBuf, InputKind)>,
    signing: Option<PrivateKey>,
    symmetric: Option<SymmetricKey>,
}

impl CreateSession {
    pub fn plain() -> Self {
        Self {
            profile: None,
            awaiting: CreationType::Aar,
            input: None,
            signing: None,
            symmetric: None,
        }
    }

    pub fn encrypted(profile: Profile) -> Self {
        Self {
            profile: Some(profile),
            awaiting: CreationType::Aea,
            input: None,
            signing: None,
            symmetric: None,
        }
    }

    pub fn with_symmetric_key(mut self, key: SymmetricKey) -> Self {
        self.symmetric = Some(key);
        self
    }

    pub fn awaiting(&self) -> CreationType {
        self.awaiting
    }

    pub fn pick(&mut self, path: &Path) -> Result<Step> {
        debug!(awaiting = ?self.awaiting, path = %path.display(), "selection");
        match self.awaiting {
            CreationType::Aar => {
                require_directory(path)?;
                Ok(Step::Ready(CreateJob::Plain {
                    input: path.to_path_buf(),
                }))
            }
            CreationType::Aea => {
                let kind = encryption_input(path)?;
                self.input = Some((path.to_path_buf(), kind));
                self.awaiting = if self.profile().is_signed() {
                    CreationType::Key
                } else {
                    CreationType::Auth
                };
                Ok(Step::Pick(self.awaiting))
            }
            CreationType::Key => {
                self.signing = Some(load_private_key(path)?);
                self.awaiting = CreationType::Auth;
                Ok(Step::Pick(self.awaiting))
            }
            CreationType::Auth => {
                let auth_data = load_auth_data(path)?;
                let profile = self.profile();
                if profile.is_encrypted() && self.symmetric.is_none() {
                    return Err(LinaError::InvalidFormat(format!(
                        "profile {} requires a symmetric key",
                        profile.id()
                    )));
                }
                let (input, kind) = self.input.take().ok_or_else(|| {
                    LinaError::InvalidFormat("no input selected".into())
                })?;
                self.awaiting = CreationType::Aea;
                Ok(Step::Ready(CreateJob::Encrypted {
                    input,
                    kind,
                    profile,
                    signing: self.signing.take(),
                    symmetric: self.symmetric.take(),
                    auth_data,
                }))
            }
        }
    }

    fn profile(&self) -> Profile {
        self.profile.unwrap_or(Profile::Signed)
    }
}

fn require_directory(path: &Path) -> Result<()> {
    let meta = fs::metadata(path).map_err(|e| LinaError::read_failed(path, e))?;
    if !meta.is_dir() {
        return Err(LinaError::InvalidFormat(format!(
            "not a directory: {}",
            path.display()
        )));
    }
    Ok(())
}

fn encryption_input(path: &Path) -> Result<InputKind> {
    let meta = fs::metadata(path).map_err(|e| LinaError::read_failed(path, e))?;
    if meta.is_dir() {
        return Ok(InputKind::Directory);
    }
    let file = File::open(path).map_err(|e| LinaError::read_failed(path, e))?;
    match read_entries(BufReader::new(file)) {
        Ok(_) => Ok(InputKind::PlainArchive),
        Err(LinaError::InvalidArchive(msg)) => Err(LinaError::InvalidArchive(msg)),
        Err(LinaError::Io(err)) => Err(LinaError::read_failed(path, err)),
        Err(other) => Err(LinaError::InvalidArchive(other.to_string())),
    }
}

pub fn load_private_key(path: &Path) -> Result<PrivateKey> {
    let bytes = keys::read_key_file(path)?;
    if bytes.len() != keys::PRIVATE_KEY_LEN {
        return Err(LinaError::InvalidKeySize {
            actual: bytes.len(),
        });
    }
    PrivateKey::from_x963(&bytes)
}

pub fn load_auth_data(path: &Path) -> Result<Vec<u8>> {
    let data = fs::read(path).map_err(|e| LinaError::read_failed(path, e))?;
    if data.len() > MAX_AUTH_DATA_LEN {
        return Err(LinaError::InvalidFormat(format!(
            "auth data too large: {} bytes (max {MAX_AUTH_DATA_LEN})",
            data.len()
        )));
    }
    Ok(data)
}
