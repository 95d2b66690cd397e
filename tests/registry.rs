use s_archive::{
    formats, resolve, resolve_by_extension, ArchiveError, ArchiveFormat, Codec, Container,
    Layering,
};

#[test]
fn test_registered_table() {
    let table: Vec<(&str, Container, Codec, &str)> = formats()
        .iter()
        .map(|t| {
            (
                t.format.identifier(),
                t.container,
                t.codec,
                t.canonical_extension(),
            )
        })
        .collect();

    assert_eq!(
        table,
        vec![
            ("ZIP", Container::Zip, Codec::Deflate, ".zip"),
            ("TAR", Container::Tar, Codec::Store, ".tar"),
            ("TAR_GZ", Container::Tar, Codec::Gzip, ".tar.gz"),
            ("TAR_BZ2", Container::Tar, Codec::Bzip2, ".tar.bz2"),
            ("TAR_LZMA", Container::Tar, Codec::Lzma, ".tlz"),
            ("TAR_XZ", Container::Tar, Codec::Xz, ".txz"),
            ("GZIP", Container::None, Codec::Gzip, ".gz"),
        ]
    );
}

#[test]
fn test_every_identifier_resolves_to_itself() {
    for format in ArchiveFormat::ALL {
        let triple = resolve(format.identifier()).unwrap();
        assert_eq!(triple.format, format);
        assert_eq!(triple, format.triple());
        assert_eq!(format.to_string(), format.identifier());
    }
    assert!(matches!(resolve(""), Err(ArchiveError::UnknownFormat(_))));
}

#[test]
fn test_every_extension_resolves_back() {
    for triple in formats() {
        for ext in triple.extensions {
            let name = format!("archive{}", ext);
            assert_eq!(
                resolve_by_extension(&name).unwrap().format,
                triple.format,
                "{}",
                name
            );
            let upper = name.to_ascii_uppercase();
            assert_eq!(resolve_by_extension(&upper).unwrap().format, triple.format);
        }
    }
}

#[test]
fn test_aliases_and_short_forms() {
    let cases = [
        ("a.tgz", ArchiveFormat::TarGz),
        ("a.tar.gzip", ArchiveFormat::TarGz),
        ("a.tbz2", ArchiveFormat::TarBz2),
        ("a.tar.bzip2", ArchiveFormat::TarBz2),
        ("a.tar.lz", ArchiveFormat::TarLzma),
        ("a.tar.xz", ArchiveFormat::TarXz),
        ("a.gzip", ArchiveFormat::Gzip),
        ("a.b.c.zip", ArchiveFormat::Zip),
    ];
    for (name, format) in cases {
        assert_eq!(resolve_by_extension(name).unwrap().format, format, "{}", name);
    }
}

#[test]
fn test_unrecognized_names() {
    for name in ["archive", "archive.rar", "archive.tar.zst", "zip", ""] {
        assert!(
            matches!(
                resolve_by_extension(name),
                Err(ArchiveError::UnrecognizedExtension(_))
            ),
            "{}",
            name
        );
    }
}

#[test]
fn test_layering_is_explicit() {
    for triple in formats() {
        let expected = match triple.format {
            ArchiveFormat::TarGz
            | ArchiveFormat::TarBz2
            | ArchiveFormat::TarLzma
            | ArchiveFormat::TarXz => Layering::ContainerOverCodec,
            ArchiveFormat::Zip | ArchiveFormat::Tar | ArchiveFormat::Gzip => Layering::Single,
        };
        assert_eq!(triple.layering, expected, "{}", triple.format);
    }
}
