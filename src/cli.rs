use crate::format::{CipherAlgo, Profile};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "lina",
    version,
    about = "Build plain and signed/encrypted archives from directories"
)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE", env = "LINA_CONFIG")]
    pub config: Option<PathBuf>,
    /// Log filter, e.g. "lina=debug"
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,
    /// Shorthand for --log-level lina=debug
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a plain .aar archive from a directory
    Create(CreateArgs),
    /// Build a signed and/or encrypted .aea archive
    CreateAea(CreateAeaArgs),
    /// Extract a .aar or .aea archive
    Extract(ExtractArgs),
    /// List archive contents
    List(ListArgs),
    /// Verify archive integrity and signature
    Verify(VerifyArgs),
    /// Show the cleartext prologue of a .aea archive
    Inspect(InspectArgs),
    /// Generate a signing key or a symmetric key
    Keygen(KeygenArgs),
}

#[derive(Args, Clone, Default)]
pub struct OutputArgs {
    /// Output file (must not exist)
    #[arg(short, long, value_name = "FILE", conflicts_with = "output_dir")]
    pub output: Option<PathBuf>,
    /// Directory for the generated Archive_<millis> file
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub struct CreateArgs {
    /// Directory to archive
    #[arg(value_name = "DIR")]
    pub input: PathBuf,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Clone)]
pub struct CreateAeaArgs {
    /// Directory or existing .aar archive
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
    /// Private signing key (97-byte raw X9.63), required by profiles 0 and 2
    #[arg(short, long, value_name = "FILE")]
    pub key: Option<PathBuf>,
    /// Authentication data file stored in the archive prologue
    #[arg(short, long, value_name = "FILE")]
    pub auth: PathBuf,
    /// Symmetric key (32 bytes), required by profiles 1 and 2
    #[arg(long, value_name = "FILE")]
    pub symmetric_key: Option<PathBuf>,
    /// Container profile
    #[arg(long, value_enum)]
    pub profile: Option<ProfileChoice>,
    /// AEAD for the encrypted profiles
    #[arg(long, value_enum)]
    pub cipher: Option<CipherChoice>,
    /// Compression level (-22 to 22, 0 disables compression)
    #[arg(short = 'l', long, allow_hyphen_values = true)]
    pub level: Option<i32>,
    /// Segment size in bytes
    #[arg(long, value_name = "BYTES")]
    pub segment_size: Option<u32>,
    #[command(flatten)]
    pub output: OutputArgs,
}

/// Keys used to read a .aea archive. Ignored for .aar archives.
#[derive(Args, Clone, Default)]
pub struct KeyArgs {
    /// Signer's public key (65 bytes) or private key (97 bytes)
    #[arg(short, long, value_name = "FILE")]
    pub key: Option<PathBuf>,
    /// Symmetric key (32 bytes)
    #[arg(long, value_name = "FILE")]
    pub symmetric_key: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub struct ExtractArgs {
    /// .aar or .aea archive
    #[arg(value_name = "FILE")]
    pub archive: PathBuf,
    /// Output directory
    #[arg(short = 'C', long, value_name = "DIR")]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub keys: KeyArgs,
}

#[derive(Args, Clone)]
pub struct ListArgs {
    /// .aar or .aea archive
    #[arg(value_name = "FILE")]
    pub archive: PathBuf,
    /// Show extended per-entry details
    #[arg(short, long)]
    pub long: bool,
    #[command(flatten)]
    pub keys: KeyArgs,
}

#[derive(Args, Clone)]
pub struct VerifyArgs {
    /// .aar or .aea archive
    #[arg(value_name = "FILE")]
    pub archive: PathBuf,
    #[command(flatten)]
    pub keys: KeyArgs,
}

#[derive(Args, Clone)]
pub struct InspectArgs {
    /// .aea archive
    #[arg(value_name = "FILE")]
    pub archive: PathBuf,
}

#[derive(Args, Clone)]
pub struct KeygenArgs {
    /// Output key file (must not exist)
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,
    /// Also write the 65-byte public key here
    #[arg(long, value_name = "FILE", conflicts_with = "symmetric")]
    pub public: Option<PathBuf>,
    /// Generate a 32-byte symmetric key instead of a signing key
    #[arg(long)]
    pub symmetric: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherChoice {
    #[value(name = "chacha")]
    #[serde(rename = "chacha")]
    ChaCha20Poly1305,
    #[value(name = "aes")]
    #[serde(rename = "aes")]
    Aes256Gcm,
}

impl From<CipherChoice> for CipherAlgo {
    fn from(choice: CipherChoice) -> Self {
        match choice {
            CipherChoice::ChaCha20Poly1305 => CipherAlgo::ChaCha20Poly1305,
            CipherChoice::Aes256Gcm => CipherAlgo::Aes256Gcm,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ProfileChoice {
    /// Signed, payload in clear
    #[value(name = "0")]
    Signed,
    /// Encrypted with a symmetric key
    #[value(name = "1")]
    Symmetric,
    /// Encrypted and signed
    #[value(name = "2")]
    SymmetricSigned,
}

impl From<ProfileChoice> for Profile {
    fn from(choice: ProfileChoice) -> Self {
        match choice {
            ProfileChoice::Signed => Profile::Signed,
            ProfileChoice::Symmetric => Profile::Symmetric,
            ProfileChoice::SymmetricSigned => Profile::SymmetricSigned,
        }
    }
}
