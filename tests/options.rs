use s_archive::{
    compress, extract, ArchiveDescriptor, ArchiveError, ArchiveFormat, CollisionPolicy,
    EngineOptions, EntryFilter, Progress,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

fn project(parent: &Path) -> PathBuf {
    let root = parent.join("project");
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::write(root.join("main.rs"), b"fn main() {}".repeat(500)).unwrap();
    fs::write(root.join("lib.rs"), b"pub mod x;".repeat(500)).unwrap();
    fs::write(root.join("docs/guide.md"), b"# Guide\n".repeat(500)).unwrap();
    root
}

fn descriptor(format: ArchiveFormat, input: &Path, out: &Path, name: &str) -> ArchiveDescriptor {
    ArchiveDescriptor::builder(format)
        .input(input)
        .output_dir(out)
        .archive_name(name)
        .build()
        .unwrap()
}

#[test]
fn test_collision_rename() {
    let dir = tempdir().unwrap();
    let root = project(dir.path());
    let out = dir.path().join("out");

    let mut options = EngineOptions::new();
    options.set_collision_policy(CollisionPolicy::Rename);

    let d = descriptor(ArchiveFormat::TarGz, &root, &out, "bundle");
    let first = compress(&d, &options).unwrap();
    let second = compress(&d, &options).unwrap();
    let third = compress(&d, &options).unwrap();

    assert_eq!(first.archive_path, out.join("bundle.tar.gz"));
    assert_eq!(second.archive_path, out.join("bundle1.tar.gz"));
    assert_eq!(third.archive_path, out.join("bundle2.tar.gz"));
}

#[test]
fn test_collision_fail_and_overwrite() {
    let dir = tempdir().unwrap();
    let root = project(dir.path());
    let out = dir.path().join("out");
    let d = descriptor(ArchiveFormat::Zip, &root, &out, "bundle");

    compress(&d, &EngineOptions::default()).unwrap();
    let before = fs::metadata(out.join("bundle.zip")).unwrap().len();

    let mut fail = EngineOptions::new();
    fail.set_collision_policy(CollisionPolicy::Fail);
    match compress(&d, &fail) {
        Err(ArchiveError::SinkUnwritable { source, .. }) => {
            assert_eq!(source.kind(), io::ErrorKind::AlreadyExists)
        }
        other => panic!("unexpected result: {:?}", other.map(|r| r.archive_path)),
    }

    // Default policy replaces the archive in place
    let report = compress(&d, &EngineOptions::default()).unwrap();
    assert_eq!(report.archive_path, out.join("bundle.zip"));
    assert_eq!(fs::metadata(out.join("bundle.zip")).unwrap().len(), before);
    assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
}

#[test]
fn test_gzip_extract_collision() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    fs::write(&file, b"fresh").unwrap();
    let out = dir.path().join("out");
    let archive = compress(
        &descriptor(ArchiveFormat::Gzip, &file, &out, "notes.txt"),
        &EngineOptions::default(),
    )
    .unwrap()
    .archive_path;

    let dest = dir.path().join("dest");
    fs::create_dir(&dest).unwrap();
    fs::write(dest.join("notes.txt"), b"old").unwrap();

    let mut rename = EngineOptions::new();
    rename.set_collision_policy(CollisionPolicy::Rename);
    let report = extract(&archive, &dest, &rename).unwrap();
    assert_eq!(report.output_path, dest.join("notes1.txt"));
    assert_eq!(fs::read(dest.join("notes.txt")).unwrap(), b"old");
    assert_eq!(fs::read(dest.join("notes1.txt")).unwrap(), b"fresh");

    let mut fail = EngineOptions::new();
    fail.set_collision_policy(CollisionPolicy::Fail);
    assert!(matches!(
        extract(&archive, &dest, &fail),
        Err(ArchiveError::SinkUnwritable { .. })
    ));
}

#[test]
fn test_filter_on_compress() {
    let dir = tempdir().unwrap();
    let root = project(dir.path());
    let out = dir.path().join("out");

    let mut options = EngineOptions::new();
    options.set_filter(EntryFilter::new(r"\.rs$").unwrap());
    let report = compress(&descriptor(ArchiveFormat::TarXz, &root, &out, "src"), &options).unwrap();
    assert_eq!(report.files, 2);

    let dest = dir.path().join("dest");
    let extracted = extract(&report.archive_path, &dest, &EngineOptions::default()).unwrap();
    assert_eq!(extracted.files, 2);
    assert!(extracted.output_path.join("project/main.rs").is_file());
    assert!(extracted.output_path.join("project/lib.rs").is_file());
    assert!(!extracted.output_path.join("project/docs").exists());
}

#[test]
fn test_filter_on_extract() {
    let dir = tempdir().unwrap();
    let root = project(dir.path());
    let out = dir.path().join("out");
    let report = compress(
        &descriptor(ArchiveFormat::Zip, &root, &out, "all"),
        &EngineOptions::default(),
    )
    .unwrap();

    let mut options = EngineOptions::new();
    options.set_filter(EntryFilter::new("docs/").unwrap());
    let dest = dir.path().join("dest");
    let extracted = extract(&report.archive_path, &dest, &options).unwrap();

    assert_eq!(extracted.files, 1);
    assert_eq!(
        fs::read(extracted.output_path.join("project/docs/guide.md")).unwrap(),
        b"# Guide\n".repeat(500)
    );
    assert!(!extracted.output_path.join("project/main.rs").exists());
}

#[test]
fn test_invalid_filter_pattern() {
    assert!(matches!(
        EntryFilter::new("("),
        Err(ArchiveError::InvalidOptions(_))
    ));
}

#[test]
fn test_progress_is_monotonic_and_completes() {
    let dir = tempdir().unwrap();
    let root = project(dir.path());
    let out = dir.path().join("out");

    let seen: Arc<Mutex<Vec<Progress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut options = EngineOptions::new();
    options.set_progress(move |p| sink.lock().unwrap().push(p));

    let report = compress(&descriptor(ArchiveFormat::TarBz2, &root, &out, "p"), &options).unwrap();
    {
        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0].percent < w[1].percent));
        let last = seen.last().unwrap();
        assert_eq!(last.percent, 100.0);
        assert_eq!(last.total_bytes, report.bytes_read);
    }

    seen.lock().unwrap().clear();
    let dest = dir.path().join("dest");
    extract(&report.archive_path, &dest, &options).unwrap();
    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0].percent < w[1].percent));
    let last = seen.last().unwrap();
    assert_eq!(last.percent, 100.0);
    assert_eq!(
        last.total_bytes,
        fs::metadata(&report.archive_path).unwrap().len()
    );
}
