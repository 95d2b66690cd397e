use s_archive::zip::StreamingZipWriter;
use s_archive::{
    compress, extract, ArchiveDescriptor, ArchiveError, ArchiveFormat, Codec, EngineOptions,
};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

fn archive_of_project(format: ArchiveFormat) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let project = dir.path().join("project");
    fs::create_dir_all(project.join("sub")).unwrap();
    fs::write(project.join("a.txt"), b"alpha ".repeat(2000)).unwrap();
    fs::write(project.join("sub/b.txt"), b"bravo ".repeat(2000)).unwrap();

    let input = if format.triple().has_container() {
        project
    } else {
        project.join("a.txt")
    };
    let descriptor = ArchiveDescriptor::builder(format)
        .input(input)
        .output_dir(dir.path().join("out"))
        .archive_name("sample")
        .build()
        .unwrap();
    let archive = compress(&descriptor, &EngineOptions::default())
        .unwrap()
        .archive_path;
    (dir, archive)
}

fn assert_malformed(archive: &Path) {
    let dest = tempdir().unwrap();
    match extract(archive, dest.path(), &EngineOptions::default()) {
        Err(ArchiveError::MalformedArchive(_)) => {}
        Err(other) => panic!("{}: expected MalformedArchive, got {}", archive.display(), other),
        Ok(report) => panic!(
            "{}: extraction succeeded with {} files",
            archive.display(),
            report.files
        ),
    }
}

#[test]
fn test_non_archive_input() {
    let dir = tempdir().unwrap();
    let text = b"this is not an archive at all, just a few lines of text\n".repeat(20);

    for format in ArchiveFormat::ALL {
        let path = dir
            .path()
            .join(format!("fake{}", format.triple().canonical_extension()));
        fs::write(&path, &text).unwrap();
        assert_malformed(&path);
    }
}

#[test]
fn test_truncated_archives() {
    for format in ArchiveFormat::ALL {
        let (_dir, archive) = archive_of_project(format);
        let bytes = fs::read(&archive).unwrap();

        for cut in [bytes.len() / 2, bytes.len() - 1] {
            fs::write(&archive, &bytes[..cut]).unwrap();
            assert_malformed(&archive);
        }
    }
}

#[test]
fn test_tar_cut_at_header_boundary() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("project");
    fs::create_dir_all(&project).unwrap();
    // Payload whose last blocks are all zero, like a sparse or padded file
    let mut payload = vec![0u8; 2048];
    payload[..6].copy_from_slice(b"header");
    fs::write(project.join("a.bin"), &payload).unwrap();
    fs::write(project.join("b.txt"), b"b").unwrap();

    let descriptor = ArchiveDescriptor::builder(ArchiveFormat::Tar)
        .input(&project)
        .output_dir(dir.path().join("out"))
        .archive_name("cut")
        .build()
        .unwrap();
    let archive = compress(&descriptor, &EngineOptions::default())
        .unwrap()
        .archive_path;
    let bytes = fs::read(&archive).unwrap();
    assert_eq!(bytes.len(), 512 + 2048 + 512 + 512 + 1024);

    // Right before b.txt's header, then right before the end-of-archive blocks
    for cut in [512 + 2048, 512 + 2048 + 512 + 512] {
        fs::write(&archive, &bytes[..cut]).unwrap();
        assert_malformed(&archive);
    }
}

#[test]
fn test_empty_archive_files() {
    let dir = tempdir().unwrap();
    for format in ArchiveFormat::ALL {
        let path = dir
            .path()
            .join(format!("empty{}", format.triple().canonical_extension()));
        fs::write(&path, b"").unwrap();
        assert_malformed(&path);
    }
}

#[test]
fn test_zip_crc_mismatch() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("payload.txt");
    fs::write(&file, b"0123456789 payload that will be corrupted").unwrap();

    let descriptor = ArchiveDescriptor::builder(ArchiveFormat::Zip)
        .codec(Codec::Store)
        .input(&file)
        .output_dir(dir.path())
        .archive_name("stored")
        .build()
        .unwrap();
    let archive = compress(&descriptor, &EngineOptions::default())
        .unwrap()
        .archive_path;

    let mut bytes = fs::read(&archive).unwrap();
    let needle = b"payload that";
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap();
    bytes[at] ^= 0xff;
    fs::write(&archive, &bytes).unwrap();

    assert_malformed(&archive);
}

#[test]
fn test_unsupported_zip_method() {
    let dir = tempdir().unwrap();
    let mut writer = StreamingZipWriter::new(Cursor::new(Vec::new()));
    writer.start_entry("a.txt", None).unwrap();
    writer.write_data(b"hello").unwrap();
    let mut bytes = writer.finish().unwrap().into_inner();

    // Compression method lives 10 bytes into the central directory header
    let at = bytes
        .windows(4)
        .position(|w| w == [0x50, 0x4b, 0x01, 0x02])
        .unwrap();
    bytes[at + 10] = 99;
    bytes[at + 11] = 0;

    let path = dir.path().join("method.zip");
    fs::write(&path, &bytes).unwrap();

    let dest = tempdir().unwrap();
    assert!(matches!(
        extract(&path, dest.path(), &EngineOptions::default()),
        Err(ArchiveError::CodecUnavailable(_))
    ));
}

#[test]
fn test_tar_entry_escaping_root() {
    let dir = tempdir().unwrap();

    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    let name = b"../evil.txt";
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_size(4);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, &b"evil"[..]).unwrap();
    let bytes = builder.into_inner().unwrap();

    let path = dir.path().join("escape.tar");
    fs::write(&path, &bytes).unwrap();

    let dest = tempdir().unwrap();
    let nested = dest.path().join("inner");
    fs::create_dir(&nested).unwrap();
    assert!(matches!(
        extract(&path, &nested, &EngineOptions::default()),
        Err(ArchiveError::MalformedArchive(_))
    ));
    assert!(!nested.join("evil.txt").exists());
    assert!(!dest.path().join("evil.txt").exists());
}

#[test]
fn test_zip_absolute_entry_name() {
    let dir = tempdir().unwrap();
    let mut writer = StreamingZipWriter::new(Cursor::new(Vec::new()));
    writer.start_entry("/abs.txt", None).unwrap();
    writer.write_data(b"absolute").unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let path = dir.path().join("abs.zip");
    fs::write(&path, &bytes).unwrap();
    assert_malformed(&path);
}

#[test]
fn test_lookup_failures() {
    let dir = tempdir().unwrap();

    let unknown = dir.path().join("archive.rar");
    fs::write(&unknown, b"Rar!").unwrap();
    assert!(matches!(
        extract(&unknown, dir.path(), &EngineOptions::default()),
        Err(ArchiveError::UnrecognizedExtension(_))
    ));

    assert!(matches!(
        extract(dir.path().join("missing.zip"), dir.path(), &EngineOptions::default()),
        Err(ArchiveError::SourceUnreadable { .. })
    ));
}
