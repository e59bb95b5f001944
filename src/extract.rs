use crate::entry::{EntryHeader, EntryType, FieldKey};
use crate::error::{LinaError, Result};
use crate::utils::{self, RelPathSet};
use indicatif::ProgressBar;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, warn};

pub struct ArchiveReader<R: Read> {
    inner: R,
    pending: Vec<(FieldKey, u64)>,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
        }
    }

    // Unread payloads of the previous entry are skipped first.
    pub fn next_header(&mut self) -> Result<Option<EntryHeader>> {
        self.skip_data()?;
        let header = match EntryHeader::read_from(&mut self.inner)? {
            Some(header) => header,
            None => return Ok(None),
        };
        let kind = header.entry_type()?;
        let path = header.path()?;
        if path.is_empty() && kind != EntryType::Directory {
            return Err(LinaError::InvalidArchive(
                "only the root directory may have an empty path".into(),
            ));
        }
        if kind == EntryType::Symlink && header.link_target().is_none() {
            return Err(LinaError::InvalidArchive(format!(
                "symlink without target: {path}"
            )));
        }
        header.blob_total()?;
        self.pending = header.blobs().collect();
        Ok(Some(header))
    }

    pub fn copy_data<W: Write>(&mut self, out: &mut W, pb: Option<&ProgressBar>) -> Result<u64> {
        let pending = std::mem::take(&mut self.pending);
        let mut copied = 0u64;
        for (key, size) in pending {
            if key == FieldKey::DAT {
                copy_blob(&mut self.inner, out, size, pb)?;
                copied += size;
            } else {
                copy_blob(&mut self.inner, &mut io::sink(), size, None)?;
            }
        }
        Ok(copied)
    }

    pub fn skip_data(&mut self) -> Result<()> {
        self.copy_data(&mut io::sink(), None).map(|_| ())
    }
}

fn copy_blob<R: Read, W: Write>(
    reader: &mut R,
    out: &mut W,
    size: u64,
    pb: Option<&ProgressBar>,
) -> Result<()> {
    utils::copy_exact(reader, out, size, pb).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            LinaError::InvalidArchive("truncated entry data".into())
        } else {
            LinaError::Io(err)
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub path: String,
    pub kind: EntryType,
    pub size: u64,
    pub mode: Option<u32>,
    pub modified: Option<u64>,
    pub link_target: Option<String>,
}

impl EntryInfo {
    fn from_header(header: &EntryHeader) -> Result<Self> {
        Ok(Self {
            path: header.path()?.to_string(),
            kind: header.entry_type()?,
            size: header.data_size(),
            mode: header.mode(),
            modified: header.modified().map(|(secs, _)| secs),
            link_target: header.link_target().map(str::to_string),
        })
    }
}

pub fn read_entries<R: Read>(reader: R) -> Result<Vec<EntryInfo>> {
    let mut archive = ArchiveReader::new(reader);
    let mut seen = RelPathSet::default();
    let mut entries = Vec::new();
    while let Some(header) = archive.next_header()? {
        let info = EntryInfo::from_header(&header)?;
        if !info.path.is_empty() {
            seen.insert(&info.path, info.kind == EntryType::Directory)?;
        }
        entries.push(info);
    }
    if entries.is_empty() {
        return Err(LinaError::InvalidArchive("archive contains no entries".into()));
    }
    Ok(entries)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
    pub bytes: u64,
}

// Two passes: every path is validated before anything is written.
pub fn extract_archive<R: Read + Seek>(
    mut reader: R,
    out_dir: &Path,
    pb: Option<&ProgressBar>,
) -> Result<ExtractSummary> {
    let start = reader.stream_position()?;
    let entries = read_entries(&mut reader)?;
    reader.seek(SeekFrom::Start(start))?;
    debug!(entries = entries.len(), out = %out_dir.display(), "extracting archive");

    let created_root = !out_dir.exists();
    on_disk(out_dir, fs::create_dir_all(out_dir))?;
    let mut summary = ExtractSummary::default();
    let mut dir_modes: Vec<(PathBuf, u32)> = Vec::new();
    let mut archive = ArchiveReader::new(reader);

    while let Some(header) = archive.next_header()? {
        let kind = header.entry_type()?;
        let rel = header.path()?;
        let out_path = if rel.is_empty() {
            out_dir.to_path_buf()
        } else {
            out_dir.join(utils::sanitize_rel_path(rel)?)
        };

        match kind {
            EntryType::Directory => {
                if !rel.is_empty() {
                    ensure_directory_path(&out_path)?;
                }
                on_disk(&out_path, fs::create_dir_all(&out_path))?;
                // The root entry only sets the mode of a directory created here.
                if let Some(mode) = header.mode().filter(|_| !rel.is_empty() || created_root) {
                    dir_modes.push((out_path, mode));
                }
                summary.directories += 1;
            }
            EntryType::File => {
                prepare_parent(&out_path)?;
                remove_existing_path(&out_path)?;
                let file = on_disk(&out_path, File::create(&out_path))?;
                let mut writer = BufWriter::new(file);
                let copied = archive.copy_data(&mut writer, pb).map_err(|err| match err {
                    LinaError::Io(io_err) => {
                        LinaError::ExtractionFailed(format!("{}: {io_err}", out_path.display()))
                    }
                    other => other,
                })?;
                let file = writer
                    .into_inner()
                    .map_err(|e| extraction_error(&out_path, e.into_error()))?;
                if let Some((secs, nanos)) = header.modified() {
                    if let Some(time) = UNIX_EPOCH.checked_add(Duration::new(secs, nanos)) {
                        if let Err(err) = file.set_modified(time) {
                            warn!(path = %out_path.display(), %err, "could not restore mtime");
                        }
                    }
                }
                drop(file);
                if let Some(mode) = header.mode() {
                    apply_mode(&out_path, mode);
                }
                summary.files += 1;
                summary.bytes += copied;
            }
            EntryType::Symlink => {
                let target = header.link_target().unwrap_or_default();
                prepare_parent(&out_path)?;
                remove_existing_path(&out_path)?;
                if create_symlink(target, &out_path)? {
                    summary.symlinks += 1;
                }
            }
        }
    }

    // Children first, so read-only directories do not block their contents.
    for (path, mode) in dir_modes.iter().rev() {
        apply_mode(path, *mode);
    }
    Ok(summary)
}

fn prepare_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory_path(parent)?;
        on_disk(parent, fs::create_dir_all(parent))?;
    }
    Ok(())
}

fn on_disk<T>(path: &Path, result: io::Result<T>) -> Result<T> {
    result.map_err(|err| extraction_error(path, err))
}

fn extraction_error(path: &Path, err: io::Error) -> LinaError {
    LinaError::ExtractionFailed(format!("{}: {err}", path.display()))
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777)) {
        warn!(path = %path.display(), %err, "could not restore permissions");
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) {}

#[cfg(unix)]
fn create_symlink(target: &str, path: &Path) -> Result<bool> {
    on_disk(path, std::os::unix::fs::symlink(target, path))?;
    Ok(true)
}

#[cfg(not(unix))]
fn create_symlink(target: &str, path: &Path) -> Result<bool> {
    warn!(path = %path.display(), target, "symlinks are not restored on this platform");
    Ok(false)
}

fn remove_existing_path(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(extraction_error(path, err)),
    };

    if meta.is_dir() {
        on_disk(path, fs::remove_dir_all(path))
    } else {
        on_disk(path, fs::remove_file(path))
    }
}

fn ensure_directory_path(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(extraction_error(path, err)),
    };

    if !meta.is_dir() {
        remove_existing_path(path)?;
    }
    Ok(())
}
