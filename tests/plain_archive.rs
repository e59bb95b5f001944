use lina::archive::PlainArchive;
use lina::cli::{CreateArgs, ExtractArgs, KeyArgs, ListArgs, OutputArgs};
use lina::entry::{EntryHeader, EntryType, FieldKey, FieldValue};
use lina::error::LinaError;
use lina::extract::{self, ArchiveReader};
use lina::{create, unpack};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

fn sample_tree(root: &Path) -> PathBuf {
    let data = root.join("data");
    fs::create_dir_all(data.join("sub")).unwrap();
    fs::create_dir_all(data.join("empty")).unwrap();
    fs::write(data.join("hello.txt"), b"hello world").unwrap();
    fs::write(data.join("sub/nums.bin"), b"1234567890").unwrap();
    data
}

fn create_args(input: PathBuf, out_dir: &Path) -> CreateArgs {
    CreateArgs {
        input,
        output: OutputArgs {
            output: None,
            output_dir: Some(out_dir.to_path_buf()),
        },
    }
}

fn header(kind: EntryType, path: &str, data: Option<u64>) -> EntryHeader {
    let mut header = EntryHeader::new();
    header
        .push(FieldKey::TYP, FieldValue::Uint(kind.code() as u64))
        .push(FieldKey::PAT, FieldValue::String(path.to_string()));
    if let Some(size) = data {
        header.push(FieldKey::DAT, FieldValue::Blob(size));
    }
    header
}

fn raw_archive(entries: &[(EntryHeader, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (header, payload) in entries {
        out.extend_from_slice(&header.encode().unwrap());
        out.extend_from_slice(payload);
    }
    out
}

#[test]
fn roundtrip_create_extract() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let data = sample_tree(root);

    let created = create::create(create_args(data, &root.join("archives"))).unwrap();
    assert_eq!(created.path.extension().unwrap(), "aar");
    assert!(created
        .path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("Archive_"));

    let summary = unpack::extract(ExtractArgs {
        archive: created.path.clone(),
        output: Some(root.join("out")),
        keys: KeyArgs::default(),
    })
    .unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(summary.bytes, 21);
    assert_eq!(fs::read(root.join("out/hello.txt")).unwrap(), b"hello world");
    assert_eq!(fs::read(root.join("out/sub/nums.bin")).unwrap(), b"1234567890");
    assert!(root.join("out/empty").is_dir());
}

#[test]
fn root_entry_comes_first_and_paths_are_sorted() {
    let tmp = tempfile::tempdir().unwrap();
    let data = sample_tree(tmp.path());
    let archive = PlainArchive::from_directory(&data).unwrap();
    let paths: Vec<&str> = archive.paths().collect();
    assert_eq!(paths, vec!["", "empty", "hello.txt", "sub", "sub/nums.bin"]);
    assert_eq!(archive.payload_size(), 21);

    let mut bytes = Vec::new();
    let written = archive.write_to(&mut bytes, None).unwrap();
    assert_eq!(written, bytes.len() as u64);

    let entries = extract::read_entries(Cursor::new(&bytes)).unwrap();
    assert_eq!(entries[0].path, "");
    assert_eq!(entries[0].kind, EntryType::Directory);
    let hello = entries.iter().find(|e| e.path == "hello.txt").unwrap();
    assert_eq!(hello.kind, EntryType::File);
    assert_eq!(hello.size, 11);
    assert!(hello.modified.is_some());
}

#[test]
fn list_reports_every_entry() {
    let tmp = tempfile::tempdir().unwrap();
    let data = sample_tree(tmp.path());
    let output = tmp.path().join("data.aar");
    PlainArchive::from_directory(&data)
        .unwrap()
        .write_path(&output, None)
        .unwrap();

    let entries = unpack::list(ListArgs {
        archive: output,
        long: true,
        keys: KeyArgs::default(),
    })
    .unwrap();
    assert_eq!(entries.len(), 5);
}

#[test]
fn write_path_refuses_to_overwrite() {
    let tmp = tempfile::tempdir().unwrap();
    let data = sample_tree(tmp.path());
    let output = tmp.path().join("exists.aar");
    fs::write(&output, b"keep me").unwrap();

    let err = PlainArchive::from_directory(&data)
        .unwrap()
        .write_path(&output, None)
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));
    assert_eq!(fs::read(&output).unwrap(), b"keep me");
}

#[cfg(unix)]
#[test]
fn symlinks_and_modes_survive() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let data = sample_tree(root);
    std::os::unix::fs::symlink("hello.txt", data.join("link")).unwrap();
    fs::set_permissions(data.join("hello.txt"), fs::Permissions::from_mode(0o640)).unwrap();

    let created = create::create(CreateArgs {
        input: data,
        output: OutputArgs {
            output: Some(root.join("tree.aar")),
            output_dir: None,
        },
    })
    .unwrap();
    let summary = unpack::extract(ExtractArgs {
        archive: created.path,
        output: Some(root.join("out")),
        keys: KeyArgs::default(),
    })
    .unwrap();

    assert_eq!(summary.symlinks, 1);
    assert_eq!(
        fs::read_link(root.join("out/link")).unwrap(),
        PathBuf::from("hello.txt")
    );
    let mode = fs::metadata(root.join("out/hello.txt"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o640);
}

#[test]
fn traversal_paths_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let bytes = raw_archive(&[
        (header(EntryType::Directory, "", None), b""),
        (header(EntryType::File, "../evil.txt", Some(4)), b"evil"),
    ]);

    let err = extract::extract_archive(Cursor::new(bytes), &tmp.path().join("out"), None)
        .unwrap_err();
    assert!(matches!(err, LinaError::InvalidArchive(_)));
    assert!(!tmp.path().join("evil.txt").exists());
    assert!(!tmp.path().join("out").exists());
}

#[test]
fn file_directory_conflicts_are_rejected() {
    let bytes = raw_archive(&[
        (header(EntryType::File, "a", Some(1)), b"x"),
        (header(EntryType::File, "a/b", Some(1)), b"y"),
    ]);
    let err = extract::read_entries(Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, LinaError::InvalidArchive(_)));
}

#[test]
fn empty_and_truncated_archives_are_invalid() {
    let err = extract::read_entries(Cursor::new(Vec::new())).unwrap_err();
    assert!(matches!(err, LinaError::InvalidArchive(_)));

    let mut bytes = raw_archive(&[(header(EntryType::File, "a.txt", Some(10)), b"0123456789")]);
    bytes.truncate(bytes.len() - 3);
    let err = extract::read_entries(Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, LinaError::InvalidArchive(_)));
}

#[test]
fn unknown_fields_are_skipped() {
    let mut entry = header(EntryType::File, "a.txt", Some(2));
    entry
        .push(
            FieldKey::parse(*b"XAT").unwrap(),
            FieldValue::Blob(3),
        )
        .push(FieldKey::parse(*b"FLG").unwrap(), FieldValue::Flag);
    let bytes = raw_archive(&[(entry, b"hiabc")]);

    let mut reader = ArchiveReader::new(Cursor::new(bytes));
    let header = reader.next_header().unwrap().unwrap();
    assert_eq!(header.path().unwrap(), "a.txt");
    let mut data = Vec::new();
    assert_eq!(reader.copy_data(&mut data, None).unwrap(), 2);
    assert_eq!(data, b"hi");
    assert!(reader.next_header().unwrap().is_none());
}

#[test]
fn extraction_failures_are_reported_as_such() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("blocker");
    fs::write(&blocker, b"file").unwrap();
    let bytes = raw_archive(&[(header(EntryType::Directory, "", None), b"")]);

    let err = extract::extract_archive(Cursor::new(bytes), &blocker, None).unwrap_err();
    assert!(matches!(err, LinaError::ExtractionFailed(_)));
}

#[test]
fn plain_create_rejects_files() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("single.txt");
    fs::write(&file, b"x").unwrap();
    let err = create::create(create_args(file, tmp.path())).unwrap_err();
    assert!(matches!(err, LinaError::InvalidFormat(_)));
}

#[cfg(unix)]
#[test]
fn existing_output_directory_keeps_its_mode() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::tempdir().unwrap();
    let mut root = header(EntryType::Directory, "", None);
    root.push(FieldKey::MOD, FieldValue::Uint(0o777));
    let mut sub = header(EntryType::Directory, "sub", None);
    sub.push(FieldKey::MOD, FieldValue::Uint(0o700));
    let bytes = raw_archive(&[(root, b""), (sub, b"")]);

    let existing = tmp.path().join("existing");
    fs::create_dir(&existing).unwrap();
    fs::set_permissions(&existing, fs::Permissions::from_mode(0o755)).unwrap();
    extract::extract_archive(Cursor::new(bytes.clone()), &existing, None).unwrap();
    let mode_of = |path: &Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode_of(&existing), 0o755);
    assert_eq!(mode_of(&existing.join("sub")), 0o700);

    let fresh = tmp.path().join("fresh");
    extract::extract_archive(Cursor::new(bytes), &fresh, None).unwrap();
    assert_eq!(mode_of(&fresh), 0o777);
}

#[test]
fn existing_files_in_the_way_are_replaced() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    fs::create_dir_all(out.join("data.txt")).unwrap();
    fs::write(out.join("sub"), b"not a directory").unwrap();

    let bytes = raw_archive(&[
        (header(EntryType::Directory, "", None), b""),
        (header(EntryType::File, "data.txt", Some(4)), b"data"),
        (header(EntryType::Directory, "sub", None), b""),
        (header(EntryType::File, "sub/x.txt", Some(1)), b"x"),
    ]);
    let summary = extract::extract_archive(Cursor::new(bytes), &out, None).unwrap();

    assert_eq!(summary.files, 2);
    assert!(out.join("sub").is_dir());
    assert_eq!(fs::read(out.join("sub/x.txt")).unwrap(), b"x");
    assert_eq!(fs::read(out.join("data.txt")).unwrap(), b"data");
}

#[test]
fn modification_times_are_restored() {
    let tmp = tempfile::tempdir().unwrap();
    let mut file = header(EntryType::File, "old.txt", Some(3));
    file.push(
        FieldKey::MTM,
        FieldValue::Timespec {
            secs: 1_500_000_000,
            nanos: Some(250),
        },
    );
    let bytes = raw_archive(&[(header(EntryType::Directory, "", None), b""), (file, b"old")]);
    let out = tmp.path().join("out");
    extract::extract_archive(Cursor::new(bytes), &out, None).unwrap();

    let modified = fs::metadata(out.join("old.txt")).unwrap().modified().unwrap();
    let secs = modified.duration_since(UNIX_EPOCH).unwrap().as_secs();
    assert_eq!(secs, 1_500_000_000);

    // Through the commands, from a source file with a known mtime.
    let data = sample_tree(tmp.path());
    let stamp = UNIX_EPOCH + Duration::from_secs(1_400_000_000);
    fs::File::options()
        .write(true)
        .open(data.join("hello.txt"))
        .unwrap()
        .set_modified(stamp)
        .unwrap();
    let created = create::create(create_args(data, &tmp.path().join("archives"))).unwrap();
    unpack::extract(ExtractArgs {
        archive: created.path,
        output: Some(tmp.path().join("restored")),
        keys: KeyArgs::default(),
    })
    .unwrap();
    let restored = fs::metadata(tmp.path().join("restored/hello.txt"))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(
        restored.duration_since(UNIX_EPOCH).unwrap().as_secs(),
        1_400_000_000
    );
}

#[test]
fn back_to_back_creates_get_distinct_names() {
    let tmp = tempfile::tempdir().unwrap();
    let data = sample_tree(tmp.path());
    let out_dir = tmp.path().join("archives");

    let first = create::create(create_args(data.clone(), &out_dir)).unwrap();
    let second = create::create(create_args(data.clone(), &out_dir)).unwrap();
    let third = create::create(create_args(data, &out_dir)).unwrap();

    assert_ne!(first.path, second.path);
    assert_ne!(second.path, third.path);
    assert_ne!(first.path, third.path);
    assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 3);
}
