use lina::archive::PlainArchive;
use lina::create;
use lina::error::LinaError;
use lina::flow::{CreateJob, CreateSession, CreationType, InputKind, Step};
use lina::format::Profile;
use lina::keys::{PrivateKey, SymmetricKey};
use lina::seal::SealOptions;
use std::fs;
use std::path::Path;

fn data_dir(root: &Path) -> std::path::PathBuf {
    let data = root.join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("a.txt"), b"alpha").unwrap();
    data
}

fn write_key(root: &Path) -> std::path::PathBuf {
    let path = root.join("signing.key");
    fs::write(&path, PrivateKey::generate().unwrap().to_x963()).unwrap();
    path
}

#[test]
fn short_key_never_reaches_the_builder() {
    let tmp = tempfile::tempdir().unwrap();
    let data = data_dir(tmp.path());
    let short = tmp.path().join("short.key");
    fs::write(&short, [0x04u8; 96]).unwrap();
    let long = tmp.path().join("long.key");
    fs::write(&long, [0x04u8; 98]).unwrap();

    let mut session = CreateSession::encrypted(Profile::Signed);
    session.pick(&data).unwrap();
    assert!(matches!(
        session.pick(&short),
        Err(LinaError::InvalidKeySize { actual: 96 })
    ));
    assert!(matches!(
        session.pick(&long),
        Err(LinaError::InvalidKeySize { actual: 98 })
    ));
    assert_eq!(session.awaiting(), CreationType::Key);
}

#[test]
fn malformed_and_unreadable_keys() {
    let tmp = tempfile::tempdir().unwrap();
    let data = data_dir(tmp.path());
    let garbage = tmp.path().join("garbage.key");
    fs::write(&garbage, [0x11u8; 97]).unwrap();

    let mut session = CreateSession::encrypted(Profile::Signed);
    session.pick(&data).unwrap();
    assert!(matches!(
        session.pick(&garbage),
        Err(LinaError::InvalidKeyFormat(_))
    ));
    assert!(matches!(
        session.pick(&tmp.path().join("nope.key")),
        Err(LinaError::ReadFailed { .. })
    ));
}

#[test]
fn plain_flow_only_accepts_directories() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("file.txt");
    fs::write(&file, b"x").unwrap();

    let mut session = CreateSession::plain();
    assert_eq!(session.awaiting(), CreationType::Aar);
    assert!(matches!(session.pick(&file), Err(LinaError::InvalidFormat(_))));
    assert_eq!(session.awaiting(), CreationType::Aar);

    let data = data_dir(tmp.path());
    match session.pick(&data).unwrap() {
        Step::Ready(CreateJob::Plain { input }) => assert_eq!(input, data),
        other => panic!("unexpected step: {other:?}"),
    }
}

#[test]
fn encrypted_flow_accepts_plain_archives() {
    let tmp = tempfile::tempdir().unwrap();
    let data = data_dir(tmp.path());
    let aar = tmp.path().join("in.aar");
    PlainArchive::from_directory(&data)
        .unwrap()
        .write_path(&aar, None)
        .unwrap();
    let key = write_key(tmp.path());
    let auth = tmp.path().join("auth.bin");
    fs::write(&auth, b"auth").unwrap();

    let mut session = CreateSession::encrypted(Profile::Signed);
    assert!(matches!(session.pick(&aar).unwrap(), Step::Pick(CreationType::Key)));
    assert!(matches!(session.pick(&key).unwrap(), Step::Pick(CreationType::Auth)));
    match session.pick(&auth).unwrap() {
        Step::Ready(CreateJob::Encrypted {
            kind,
            signing,
            auth_data,
            ..
        }) => {
            assert_eq!(kind, InputKind::PlainArchive);
            assert!(signing.is_some());
            assert_eq!(auth_data, b"auth");
        }
        other => panic!("unexpected step: {other:?}"),
    }
    assert_eq!(session.awaiting(), CreationType::Aea);
}

#[test]
fn encrypted_flow_rejects_non_archives() {
    let tmp = tempfile::tempdir().unwrap();
    let junk = tmp.path().join("junk.bin");
    fs::write(&junk, b"definitely not an archive").unwrap();

    let mut session = CreateSession::encrypted(Profile::Signed);
    assert!(matches!(
        session.pick(&junk),
        Err(LinaError::InvalidArchive(_))
    ));
    assert_eq!(session.awaiting(), CreationType::Aea);
}

#[test]
fn oversized_auth_data_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let data = data_dir(tmp.path());
    let auth = tmp.path().join("auth.bin");
    fs::write(&auth, vec![0u8; 1024 * 1024 + 1]).unwrap();

    let mut session = CreateSession::encrypted(Profile::Symmetric)
        .with_symmetric_key(SymmetricKey::generate().unwrap());
    session.pick(&data).unwrap();
    assert!(matches!(session.pick(&auth), Err(LinaError::InvalidFormat(_))));
    assert_eq!(session.awaiting(), CreationType::Auth);
}

#[test]
fn symmetric_profiles_need_a_symmetric_key() {
    let tmp = tempfile::tempdir().unwrap();
    let data = data_dir(tmp.path());
    let auth = tmp.path().join("auth.bin");
    fs::write(&auth, b"auth").unwrap();

    let mut session = CreateSession::encrypted(Profile::Symmetric);
    session.pick(&data).unwrap();
    let err = session.pick(&auth).unwrap_err();
    assert!(err.to_string().contains("symmetric key"));
}

#[test]
fn finished_job_leaves_exactly_one_file() {
    let tmp = tempfile::tempdir().unwrap();
    let data = data_dir(tmp.path());
    let key = write_key(tmp.path());
    let auth = tmp.path().join("auth.bin");
    fs::write(&auth, b"auth").unwrap();
    let out_dir = tmp.path().join("out");
    fs::create_dir_all(&out_dir).unwrap();

    let mut session = CreateSession::encrypted(Profile::Signed);
    session.pick(&data).unwrap();
    session.pick(&key).unwrap();
    let job = match session.pick(&auth).unwrap() {
        Step::Ready(job) => job,
        other => panic!("unexpected step: {other:?}"),
    };
    let output = out_dir.join("Archive_test.aea");
    let created = create::run_job(job, output.clone(), SealOptions::default()).unwrap();

    assert_eq!(created.path, output);
    let files: Vec<_> = fs::read_dir(&out_dir).unwrap().collect();
    assert_eq!(files.len(), 1);
    assert_eq!(fs::metadata(&output).unwrap().len(), created.size);
}

#[test]
fn failed_job_leaves_no_file() {
    let tmp = tempfile::tempdir().unwrap();
    let out_dir = tmp.path().join("out");
    fs::create_dir_all(&out_dir).unwrap();
    let output = out_dir.join("Archive_fail.aea");

    // Profile 1 without a symmetric key fails inside the worker.
    let job = CreateJob::Encrypted {
        input: data_dir(tmp.path()),
        kind: InputKind::Directory,
        profile: Profile::Symmetric,
        signing: None,
        symmetric: None,
        auth_data: Vec::new(),
    };
    assert!(create::run_job(job, output, SealOptions::default()).is_err());
    assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 0);
}

#[test]
fn signed_profiles_ask_for_a_key() {
    let tmp = tempfile::tempdir().unwrap();
    let mut session = CreateSession::encrypted(Profile::Signed);
    assert_eq!(session.awaiting(), CreationType::Aea);
    let step = session.pick(tmp.path()).unwrap();
    assert!(matches!(step, Step::Pick(CreationType::Key)));
}

#[test]
fn symmetric_profile_skips_the_key() {
    let tmp = tempfile::tempdir().unwrap();
    let key = SymmetricKey::generate().unwrap();
    let mut session = CreateSession::encrypted(Profile::Symmetric).with_symmetric_key(key);
    let step = session.pick(tmp.path()).unwrap();
    assert!(matches!(step, Step::Pick(CreationType::Auth)));
}

#[test]
fn rejected_selection_keeps_state() {
    let tmp = tempfile::tempdir().unwrap();
    let mut session = CreateSession::encrypted(Profile::Signed);
    session.pick(tmp.path()).unwrap();
    assert!(session.pick(&tmp.path().join("missing.key")).is_err());
    assert_eq!(session.awaiting(), CreationType::Key);
}
