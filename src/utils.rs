use crate::error::{LinaError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) =
        ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_message(message.to_string());
    pb
}

pub fn run_in_background<T, F>(name: &str, pb: &ProgressBar, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    pb.enable_steady_tick(Duration::from_millis(120));
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(job)?;
    let outcome = handle
        .join()
        .map_err(|_| LinaError::InvalidFormat(format!("{name} worker panicked")));
    pb.finish_and_clear();
    outcome?
}

pub fn sanitize_rel_path(path: &str) -> Result<PathBuf> {
    if path.trim().is_empty() {
        return Err(LinaError::InvalidArchive("empty path in archive".into()));
    }
    let p = Path::new(path);
    if p.is_absolute() {
        return Err(LinaError::InvalidArchive(format!(
            "absolute path in archive: {path}"
        )));
    }

    let mut normalized = PathBuf::new();
    for comp in p.components() {
        match comp {
            Component::Normal(part) => normalized.push(part),
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => {
                return Err(LinaError::InvalidArchive(format!(
                    "path contains '..' or invalid prefix: {path}"
                )));
            }
            Component::CurDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(LinaError::InvalidArchive("empty path in archive".into()));
    }
    Ok(normalized)
}

pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut v = bytes as f64;
    let mut idx = 0;
    while v >= 1024.0 && idx < UNITS.len() - 1 {
        v /= 1024.0;
        idx += 1;
    }
    format!("{:.2} {}", v, UNITS[idx])
}

pub fn copy_exact<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    mut remaining: u64,
    pb: Option<&ProgressBar>,
) -> io::Result<()> {
    let mut buf = [0u8; 64 * 1024];
    while remaining > 0 {
        let to_read = (buf.len() as u64).min(remaining) as usize;
        let n = reader.read(&mut buf[..to_read])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "insufficient data",
            ));
        }
        writer.write_all(&buf[..n])?;
        remaining -= n as u64;
        if let Some(pb) = pb {
            pb.inc(n as u64);
        }
    }
    Ok(())
}

pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[derive(Default)]
pub struct RelPathSet {
    files: HashSet<String>,
    dirs: HashSet<String>,
}

impl RelPathSet {
    pub fn insert(&mut self, path: &str, is_dir: bool) -> Result<()> {
        let normalized = normalize_rel(path)?;
        if is_dir {
            self.insert_dir(&normalized)
        } else {
            self.insert_file(&normalized)
        }
    }

    fn insert_dir(&mut self, path: &str) -> Result<()> {
        if self.files.contains(path) {
            return Err(LinaError::InvalidArchive(format!(
                "path conflict (file vs directory): {path}"
            )));
        }
        if has_file_ancestor(path, &self.files) {
            return Err(LinaError::InvalidArchive(format!(
                "path conflict (file parent): {path}"
            )));
        }
        if !self.dirs.insert(path.to_string()) {
            return Err(LinaError::InvalidArchive(format!("duplicate path: {path}")));
        }
        Ok(())
    }

    fn insert_file(&mut self, path: &str) -> Result<()> {
        if self.files.contains(path) || self.dirs.contains(path) {
            return Err(LinaError::InvalidArchive(format!("duplicate path: {path}")));
        }
        if has_file_ancestor(path, &self.files) {
            return Err(LinaError::InvalidArchive(format!(
                "path conflict (file parent): {path}"
            )));
        }
        if has_dir_descendant(path, &self.dirs) {
            return Err(LinaError::InvalidArchive(format!(
                "path conflict (directory child): {path}"
            )));
        }
        self.files.insert(path.to_string());
        Ok(())
    }
}

fn normalize_rel(path: &str) -> Result<String> {
    let normalized = sanitize_rel_path(path)?;
    Ok(normalized.to_string_lossy().replace('\\', "/"))
}

fn has_file_ancestor(path: &str, files: &HashSet<String>) -> bool {
    let mut rest = path;
    while let Some((parent, _)) = rest.rsplit_once('/') {
        if files.contains(parent) {
            return true;
        }
        rest = parent;
    }
    false
}

fn has_dir_descendant(path: &str, dirs: &HashSet<String>) -> bool {
    let prefix = format!("{path}/");
    dirs.iter().any(|entry| entry.starts_with(&prefix))
}
