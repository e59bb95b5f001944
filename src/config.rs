// Config file handling

use crate::cli::{CipherChoice, CreateAeaArgs, OutputArgs, ProfileChoice};
use crate::compression::{MAX_LEVEL, MIN_LEVEL};
use crate::error::{LinaError, Result};
use crate::format::{MAX_SEGMENT_SIZE, MIN_SEGMENT_SIZE};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub output_dir: Option<PathBuf>,
    pub level: Option<i32>,
    pub segment_size: Option<u32>,
    pub profile: Option<u32>,
    pub cipher: Option<CipherChoice>,
    pub log_level: Option<String>,
}

impl Config {
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        let contents =
            std::fs::read_to_string(&path).map_err(|e| LinaError::read_failed(&path, e))?;
        let config = Self::parse(&contents)
            .map_err(|err| LinaError::Config(format!("{}: {err}", path.display())))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse(contents: &str) -> std::result::Result<Self, String> {
        let config: Config = toml::from_str(contents).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(level) = self.level {
            if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
                return Err(format!("level must be between {MIN_LEVEL} and {MAX_LEVEL}"));
            }
        }
        if let Some(size) = self.segment_size {
            if !(MIN_SEGMENT_SIZE..=MAX_SEGMENT_SIZE).contains(&size) {
                return Err(format!(
                    "segment_size must be between {MIN_SEGMENT_SIZE} and {MAX_SEGMENT_SIZE}"
                ));
            }
        }
        if let Some(profile) = self.profile {
            if profile > 2 {
                return Err(format!("unsupported profile {profile}"));
            }
        }
        Ok(())
    }

    fn config_path() -> Option<PathBuf> {
        // Linux: ~/.config/lina/config.toml
        let dirs = ProjectDirs::from("dev", "lina", "lina")?;
        Some(dirs.config_dir().join("config.toml"))
    }

    pub fn profile_choice(&self) -> Option<ProfileChoice> {
        match self.profile? {
            0 => Some(ProfileChoice::Signed),
            1 => Some(ProfileChoice::Symmetric),
            2 => Some(ProfileChoice::SymmetricSigned),
            _ => None,
        }
    }

    pub fn fill_output(&self, output: &mut OutputArgs) {
        if output.output.is_none() && output.output_dir.is_none() {
            output.output_dir = self.output_dir.clone();
        }
    }

    pub fn fill_create_aea(&self, args: &mut CreateAeaArgs) {
        self.fill_output(&mut args.output);
        args.profile = args.profile.or_else(|| self.profile_choice());
        args.cipher = args.cipher.or(self.cipher);
        args.level = args.level.or(self.level);
        args.segment_size = args.segment_size.or(self.segment_size);
    }
}
