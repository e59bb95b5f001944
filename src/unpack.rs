use crate::cli::{ExtractArgs, InspectArgs, KeyArgs, ListArgs, VerifyArgs};
use crate::entry::{self, EntryType};
use crate::error::{LinaError, Result};
use crate::extract::{self, EntryInfo, ExtractSummary};
use crate::format;
use crate::keys::{self, PublicKey, SymmetricKey};
use crate::open::{self, ContainerInfo, OpenKeys, OpenedArchive};
use crate::utils;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Plain,
    Container,
}

pub fn detect(path: &Path) -> Result<ArchiveKind> {
    let mut file = File::open(path).map_err(|e| LinaError::read_failed(path, e))?;
    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
        let n = file
            .read(&mut magic[filled..])
            .map_err(|e| LinaError::read_failed(path, e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled == magic.len() && &magic == format::MAGIC {
        Ok(ArchiveKind::Container)
    } else if entry::looks_like_archive(&magic[..filled]) {
        Ok(ArchiveKind::Plain)
    } else {
        Err(LinaError::InvalidArchive(format!(
            "{} is neither a plain archive nor a container",
            path.display()
        )))
    }
}

struct LoadedKeys {
    verify: Option<PublicKey>,
    symmetric: Option<SymmetricKey>,
}

impl LoadedKeys {
    fn load(args: &KeyArgs) -> Result<Self> {
        let verify = match &args.key {
            Some(path) => Some(keys::verification_key(&keys::read_key_file(path)?)?),
            None => None,
        };
        let symmetric = match &args.symmetric_key {
            Some(path) => Some(SymmetricKey::from_bytes(&keys::read_key_file(path)?)?),
            None => None,
        };
        Ok(Self { verify, symmetric })
    }

    fn as_open_keys(&self) -> OpenKeys<'_> {
        OpenKeys {
            verify: self.verify.as_ref(),
            symmetric: self.symmetric.as_ref(),
        }
    }
}

fn open_container(path: &Path, key_args: &KeyArgs) -> Result<OpenedArchive> {
    let loaded = LoadedKeys::load(key_args)?;
    let file = File::open(path).map_err(|e| LinaError::read_failed(path, e))?;
    let total = file.metadata().map(|m| m.len()).unwrap_or(0);
    let pb = utils::progress_bar(total, "verifying");
    let opened = open::open(BufReader::new(file), &loaded.as_open_keys(), Some(&pb));
    pb.finish_and_clear();
    opened
}

pub fn extract(args: ExtractArgs) -> Result<ExtractSummary> {
    let out_dir = match args.output {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let summary = match detect(&args.archive)? {
        ArchiveKind::Plain => {
            let file =
                File::open(&args.archive).map_err(|e| LinaError::read_failed(&args.archive, e))?;
            let total = file.metadata().map(|m| m.len()).unwrap_or(0);
            let pb = utils::progress_bar(total, "extracting");
            let summary = extract::extract_archive(BufReader::new(file), &out_dir, Some(&pb));
            pb.finish_and_clear();
            summary?
        }
        ArchiveKind::Container => {
            let opened = open_container(&args.archive, &args.keys)?;
            let pb = utils::progress_bar(opened.payload.len() as u64, "extracting");
            let summary =
                extract::extract_archive(Cursor::new(opened.payload), &out_dir, Some(&pb));
            pb.finish_and_clear();
            summary?
        }
    };

    debug!(?summary, "extraction finished");
    println!(
        "Extracted {} files, {} directories, {} symlinks ({}) into {}",
        summary.files,
        summary.directories,
        summary.symlinks,
        utils::human_bytes(summary.bytes),
        out_dir.display()
    );
    Ok(summary)
}

fn read_listing(archive: &Path, key_args: &KeyArgs) -> Result<(Option<ContainerInfo>, Vec<EntryInfo>)> {
    match detect(archive)? {
        ArchiveKind::Plain => {
            let file = File::open(archive).map_err(|e| LinaError::read_failed(archive, e))?;
            Ok((None, extract::read_entries(BufReader::new(file))?))
        }
        ArchiveKind::Container => {
            let opened = open_container(archive, key_args)?;
            let entries = extract::read_entries(Cursor::new(&opened.payload))?;
            Ok((Some(opened.info), entries))
        }
    }
}

pub fn list(args: ListArgs) -> Result<Vec<EntryInfo>> {
    let (info, entries) = read_listing(&args.archive, &args.keys)?;

    println!("Archive: {}", args.archive.display());
    if let Some(info) = &info {
        print_container_info(info);
    }
    let files = entries.iter().filter(|e| e.kind == EntryType::File).count();
    let dirs = entries.iter().filter(|e| e.kind == EntryType::Directory).count();
    let links = entries.len() - files - dirs;
    let total: u64 = entries.iter().map(|e| e.size).sum();
    println!(
        "Entries: {} ({files} files, {dirs} directories, {links} symlinks)",
        entries.len()
    );
    println!("Payload size: {}", utils::human_bytes(total));
    println!();

    if args.long {
        println!("TYPE  SIZE         MODIFIED    MODE   PATH");
        for entry in &entries {
            let kind = match entry.kind {
                EntryType::Directory => "dir ",
                EntryType::File => "file",
                EntryType::Symlink => "link",
            };
            let size = if entry.kind == EntryType::File {
                utils::human_bytes(entry.size)
            } else {
                "-".to_string()
            };
            let path = display_path(entry);
            match &entry.link_target {
                Some(target) => println!(
                    "{kind:<4}  {size:<11}  {:<10}  {:>04o}  {path} -> {target}",
                    entry.modified.unwrap_or(0),
                    entry.mode.unwrap_or(0)
                ),
                None => println!(
                    "{kind:<4}  {size:<11}  {:<10}  {:>04o}  {path}",
                    entry.modified.unwrap_or(0),
                    entry.mode.unwrap_or(0)
                ),
            }
        }
    } else {
        for entry in &entries {
            let path = display_path(entry);
            match entry.kind {
                EntryType::Directory => println!("[DIR]  {path}"),
                EntryType::File => {
                    println!("[FILE] {path} ({})", utils::human_bytes(entry.size))
                }
                EntryType::Symlink => println!("[LINK] {path}"),
            }
        }
    }

    Ok(entries)
}

fn display_path(entry: &EntryInfo) -> &str {
    if entry.path.is_empty() {
        "."
    } else {
        &entry.path
    }
}

pub fn verify(args: VerifyArgs) -> Result<()> {
    let (info, entries) = read_listing(&args.archive, &args.keys)?;
    if let Some(info) = info {
        if info.profile.is_signed() {
            println!("Signature OK ({})", info.profile.name());
        } else {
            println!("Authentication OK ({})", info.profile.name());
        }
    }
    println!("Verification complete: {} entries, integrity OK", entries.len());
    Ok(())
}

pub fn inspect(args: InspectArgs) -> Result<ContainerInfo> {
    let file = File::open(&args.archive).map_err(|e| LinaError::read_failed(&args.archive, e))?;
    let info = open::inspect(BufReader::new(file))?;
    println!("Archive: {}", args.archive.display());
    print_container_info(&info);
    Ok(info)
}

fn print_container_info(info: &ContainerInfo) {
    println!("Profile: {} ({})", info.profile.id(), info.profile.name());
    println!("Cipher: {}", info.root.cipher.name());
    println!(
        "Compression: {}",
        match info.root.compression {
            format::CompressionAlgo::Zstd => "zstd",
            format::CompressionAlgo::None => "none",
        }
    );
    println!(
        "Segments: {} x {}",
        info.root.segment_count,
        utils::human_bytes(info.root.segment_size as u64)
    );
    println!("Auth data: {} bytes", info.auth_data.len());
}
