use crate::entry::{EntryHeader, EntryType, FieldKey, FieldValue};
use crate::error::{LinaError, Result};
use crate::utils::{self, RelPathSet};
use indicatif::ProgressBar;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

#[derive(Debug)]
pub struct PlainArchive {
    entries: Vec<SourceEntry>,
}

#[derive(Debug, Clone)]
struct SourceEntry {
    abs_path: PathBuf,
    rel_path: String,
    kind: EntryType,
    size: u64,
    header: EntryHeader,
}

impl PlainArchive {
    pub fn from_directory(dir: &Path) -> Result<Self> {
        let root = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()?.join(dir)
        };
        let meta = fs::metadata(&root).map_err(|e| LinaError::read_failed(&root, e))?;
        if !meta.is_dir() {
            return Err(LinaError::InvalidFormat(format!(
                "not a directory: {}",
                root.display()
            )));
        }

        let mut seen = RelPathSet::default();
        let mut entries = vec![SourceEntry {
            abs_path: root.clone(),
            rel_path: String::new(),
            kind: EntryType::Directory,
            size: 0,
            header: entry_header(EntryType::Directory, "", None, &meta, 0),
        }];

        for item in WalkDir::new(&root).min_depth(1).follow_links(false) {
            let item = item.map_err(walk_error)?;
            let rel_inside = item
                .path()
                .strip_prefix(&root)
                .map_err(|_| LinaError::InvalidFormat("invalid relative path".into()))?;
            let rel = normalized_rel_string(rel_inside)?;
            let file_type = item.file_type();
            let meta = item.metadata().map_err(walk_error)?;

            let (kind, link) = if file_type.is_dir() {
                (EntryType::Directory, None)
            } else if file_type.is_file() {
                (EntryType::File, None)
            } else if file_type.is_symlink() {
                let target = fs::read_link(item.path())
                    .map_err(|e| LinaError::read_failed(item.path(), e))?;
                let target = target.to_str().map(str::to_string).ok_or_else(|| {
                    LinaError::InvalidFormat(format!(
                        "symlink target is not valid UTF-8: {}",
                        item.path().display()
                    ))
                })?;
                (EntryType::Symlink, Some(target))
            } else {
                warn!(path = %item.path().display(), "skipping special file");
                continue;
            };

            seen.insert(&rel, kind == EntryType::Directory)?;
            let size = if kind == EntryType::File { meta.len() } else { 0 };
            trace!(path = %rel, ?kind, size, "staged entry");
            entries.push(SourceEntry {
                abs_path: item.path().to_path_buf(),
                header: entry_header(kind, &rel, link.as_deref(), &meta, size),
                rel_path: rel,
                kind,
                size,
            });
        }

        entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        debug!(
            root = %root.display(),
            entries = entries.len(),
            "collected directory tree"
        );
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.rel_path.as_str())
    }

    pub fn payload_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W, pb: Option<&ProgressBar>) -> Result<u64> {
        let mut written = 0u64;
        for entry in &self.entries {
            let header = entry.header.encode()?;
            writer.write_all(&header)?;
            written += header.len() as u64;

            if entry.kind == EntryType::File {
                let file = File::open(&entry.abs_path)
                    .map_err(|e| LinaError::read_failed(&entry.abs_path, e))?;
                let mut reader = BufReader::with_capacity(256 * 1024, file);
                utils::copy_exact(&mut reader, writer, entry.size, pb).map_err(|err| {
                    if err.kind() == io::ErrorKind::UnexpectedEof {
                        LinaError::InvalidFormat(format!(
                            "file shrank while archiving: {}",
                            entry.abs_path.display()
                        ))
                    } else {
                        LinaError::Io(err)
                    }
                })?;
                written += entry.size;
            }
        }
        writer.flush()?;
        Ok(written)
    }

    pub fn write_path(&self, path: &Path, pb: Option<&ProgressBar>) -> Result<u64> {
        let file = create_new_file(path)?;
        let mut writer = BufWriter::new(file);
        match self.write_to(&mut writer, pb) {
            Ok(written) => {
                debug!(path = %path.display(), bytes = written, "wrote plain archive");
                Ok(written)
            }
            Err(err) => {
                drop(writer);
                let _ = fs::remove_file(path);
                Err(err)
            }
        }
    }
}

pub(crate) fn create_new_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| {
            if err.kind() == io::ErrorKind::AlreadyExists {
                LinaError::InvalidFormat(format!("output already exists: {}", path.display()))
            } else {
                LinaError::Io(err)
            }
        })
}

fn entry_header(
    kind: EntryType,
    rel_path: &str,
    link: Option<&str>,
    meta: &fs::Metadata,
    size: u64,
) -> EntryHeader {
    let (uid, gid) = owner_ids(meta);
    let mut header = EntryHeader::new();
    header
        .push(FieldKey::TYP, FieldValue::Uint(kind.code() as u64))
        .push(FieldKey::PAT, FieldValue::String(rel_path.to_string()));
    if let Some(target) = link {
        header.push(FieldKey::LNK, FieldValue::String(target.to_string()));
    }
    header
        .push(FieldKey::UID, FieldValue::Uint(uid))
        .push(FieldKey::GID, FieldValue::Uint(gid))
        .push(FieldKey::MOD, FieldValue::Uint(file_mode(meta, kind) as u64));
    if let Some(mtime) = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
    {
        header.push(
            FieldKey::MTM,
            FieldValue::Timespec {
                secs: mtime.as_secs(),
                nanos: Some(mtime.subsec_nanos()),
            },
        );
    }
    if kind == EntryType::File {
        header.push(FieldKey::DAT, FieldValue::Blob(size));
    }
    header
}

fn normalized_rel_string(path: &Path) -> Result<String> {
    let as_str = path.to_str().ok_or_else(|| {
        LinaError::InvalidFormat(format!("path is not valid UTF-8: {}", path.display()))
    })?;
    let sanitized = utils::sanitize_rel_path(as_str)?;
    Ok(sanitized.to_string_lossy().replace('\\', "/"))
}

fn walk_error(err: walkdir::Error) -> LinaError {
    let path = err.path().map(Path::to_path_buf);
    match (path, err.into_io_error()) {
        (Some(path), Some(io_err)) => LinaError::read_failed(path, io_err),
        (_, Some(io_err)) => LinaError::Io(io_err),
        (_, None) => LinaError::InvalidFormat("filesystem loop while walking directory".into()),
    }
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata, _kind: EntryType) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(meta: &fs::Metadata, kind: EntryType) -> u32 {
    match kind {
        EntryType::Directory => 0o755,
        _ if meta.permissions().readonly() => 0o444,
        _ => 0o644,
    }
}

#[cfg(unix)]
fn owner_ids(meta: &fs::Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.uid() as u64, meta.gid() as u64)
}

#[cfg(not(unix))]
fn owner_ids(_meta: &fs::Metadata) -> (u64, u64) {
    (0, 0)
}
