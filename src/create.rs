use crate::archive::{self, PlainArchive};
use crate::cli::{CipherChoice, CreateAeaArgs, CreateArgs, OutputArgs};
use crate::error::{LinaError, Result};
use crate::flow::{CreateJob, CreateSession, CreationType, InputKind, Step};
use crate::format::{Profile, DEFAULT_SEGMENT_SIZE};
use crate::keys::{self, SymmetricKey};
use crate::seal::{self, SealKeys, SealOptions, SealSummary, DEFAULT_LEVEL};
use crate::utils;
use indicatif::ProgressBar;
use std::fs;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedArchive {
    pub path: PathBuf,
    pub size: u64,
}

pub fn create(args: CreateArgs) -> Result<CreatedArchive> {
    let mut session = CreateSession::plain();
    let job = match session.pick(&args.input)? {
        Step::Ready(job) => job,
        Step::Pick(next) => {
            return Err(LinaError::InvalidFormat(format!("missing selection: {next}")))
        }
    };
    let output = output_path(&args.output, "aar")?;
    let created = run_job(job, output, SealOptions::default())?;
    println!(
        "Created {} ({})",
        created.path.display(),
        utils::human_bytes(created.size)
    );
    Ok(created)
}

pub fn create_aea(args: CreateAeaArgs) -> Result<CreatedArchive> {
    let options = SealOptions {
        profile: args.profile.map(Profile::from).unwrap_or(Profile::Signed),
        cipher: args
            .cipher
            .unwrap_or(CipherChoice::ChaCha20Poly1305)
            .into(),
        level: args.level.unwrap_or(DEFAULT_LEVEL),
        segment_size: args.segment_size.unwrap_or(DEFAULT_SEGMENT_SIZE),
    };

    let mut session = CreateSession::encrypted(options.profile);
    if let Some(path) = &args.symmetric_key {
        let bytes = keys::read_key_file(path)?;
        session = session.with_symmetric_key(SymmetricKey::from_bytes(&bytes)?);
    }

    let mut step = session.pick(&args.input)?;
    let job = loop {
        step = match step {
            Step::Ready(job) => break job,
            Step::Pick(CreationType::Key) => {
                let key = args.key.as_deref().ok_or_else(|| {
                    LinaError::InvalidFormat(format!(
                        "profile {} requires --key",
                        options.profile.id()
                    ))
                })?;
                session.pick(key)?
            }
            Step::Pick(CreationType::Auth) => session.pick(&args.auth)?,
            Step::Pick(other) => {
                return Err(LinaError::InvalidFormat(format!(
                    "unexpected selection: {other}"
                )))
            }
        };
    };

    let output = output_path(&args.output, "aea")?;
    let created = run_job(job, output, options)?;
    println!(
        "Created {} ({}, profile {})",
        created.path.display(),
        utils::human_bytes(created.size),
        options.profile.name()
    );
    Ok(created)
}

// Generated names within the same millisecond get a numeric suffix.
pub fn output_path(output: &OutputArgs, extension: &str) -> Result<PathBuf> {
    if let Some(path) = &output.output {
        return Ok(path.clone());
    }
    let dir = output.output_dir.clone().unwrap_or_else(std::env::temp_dir);
    fs::create_dir_all(&dir)?;
    let stamp = utils::unix_millis();
    let mut candidate = dir.join(format!("Archive_{stamp}.{extension}"));
    let mut suffix = 1u32;
    while fs::symlink_metadata(&candidate).is_ok() {
        candidate = dir.join(format!("Archive_{stamp}_{suffix}.{extension}"));
        suffix += 1;
    }
    Ok(candidate)
}

pub fn run_job(job: CreateJob, output: PathBuf, options: SealOptions) -> Result<CreatedArchive> {
    let pb = utils::progress_bar(0, "archiving");
    let worker_pb = pb.clone();
    let path = output.clone();
    let size = utils::run_in_background("lina-create", &pb, move || match job {
        CreateJob::Plain { input } => {
            let archive = PlainArchive::from_directory(&input)?;
            worker_pb.set_length(archive.payload_size());
            archive.write_path(&path, Some(&worker_pb))
        }
        CreateJob::Encrypted {
            input,
            kind,
            profile,
            signing,
            symmetric,
            auth_data,
        } => {
            let keys = SealKeys {
                signing: signing.as_ref(),
                symmetric: symmetric.as_ref(),
            };
            let options = SealOptions { profile, ..options };
            let summary =
                write_container(&input, kind, &path, &auth_data, &keys, &options, &worker_pb)?;
            Ok(summary.container_size)
        }
    })?;
    debug!(path = %output.display(), size, "archive created");
    Ok(CreatedArchive { path: output, size })
}

fn write_container(
    input: &Path,
    kind: InputKind,
    output: &Path,
    auth_data: &[u8],
    keys: &SealKeys<'_>,
    options: &SealOptions,
    pb: &ProgressBar,
) -> Result<SealSummary> {
    // Stage the plain archive before the output exists, so a failing walk
    // leaves nothing behind.
    let staged = match kind {
        InputKind::Directory => Some(stage_directory(input)?),
        InputKind::PlainArchive => None,
    };

    let file = archive::create_new_file(output)?;
    let mut writer = BufWriter::new(file);
    let result = match staged {
        Some((tmp, len)) => {
            pb.set_length(len);
            seal::seal(
                BufReader::new(tmp),
                &mut writer,
                auth_data,
                keys,
                options,
                Some(pb),
            )
        }
        None => {
            pb.set_length(fs::metadata(input).map(|m| m.len()).unwrap_or(0));
            seal::seal_aar_file(input, &mut writer, auth_data, keys, options, Some(pb))
        }
    }
    .and_then(|summary| {
        writer.flush()?;
        Ok(summary)
    });

    if result.is_err() {
        drop(writer);
        let _ = fs::remove_file(output);
    }
    result
}

fn stage_directory(input: &Path) -> Result<(fs::File, u64)> {
    let archive = PlainArchive::from_directory(input)?;
    let mut writer = BufWriter::new(tempfile::tempfile()?);
    let len = archive.write_to(&mut writer, None)?;
    let mut tmp = writer.into_inner().map_err(|e| LinaError::Io(e.into_error()))?;
    tmp.seek(SeekFrom::Start(0))?;
    debug!(entries = archive.len(), bytes = len, "staged plain archive");
    Ok((tmp, len))
}
