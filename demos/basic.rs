//! Basic usage example for s-archive

use s_archive::{compress, extract, ArchiveDescriptor, ArchiveFormat, EngineOptions};
use std::fs;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== s-archive Basic Example ===\n");

    let work = tempfile::tempdir()?;
    let project = work.path().join("project");
    fs::create_dir_all(project.join("folder"))?;
    fs::create_dir_all(project.join("empty"))?;
    fs::write(project.join("hello.txt"), b"Hello, s-archive!")?;
    fs::write(project.join("folder/nested.txt"), b"This is a nested file.")?;
    fs::write(project.join("data.txt"), b"Line 1\nLine 2\nLine 3\n")?;

    let mut options = EngineOptions::new();
    options.set_progress(|p| {
        println!(
            "  {:>6.2}% ({} / {} bytes)",
            p.percent, p.processed_bytes, p.total_bytes
        )
    });

    for format in ArchiveFormat::ALL {
        if format == ArchiveFormat::Gzip {
            continue;
        }
        let descriptor = ArchiveDescriptor::builder(format)
            .input(&project)
            .output_dir(work.path().join("archives"))
            .archive_name("project")
            .build()?;

        println!("Creating {}...", descriptor.archive_file_name());
        let report = compress(&descriptor, &options)?;
        println!(
            "✓ {} files, {} directories, {} bytes in, {} bytes out\n",
            report.files,
            report.directories,
            report.bytes_read,
            fs::metadata(&report.archive_path)?.len()
        );

        let dest = work.path().join("extracted").join(format.identifier());
        let extracted = extract(&report.archive_path, &dest, &EngineOptions::default())?;
        println!(
            "✓ Extracted {} files into {}",
            extracted.files,
            extracted.output_path.display()
        );
        let hello = fs::read_to_string(extracted.output_path.join("project/hello.txt"))?;
        println!("  hello.txt: {}\n", hello);
    }

    // GZIP carries exactly one file
    let descriptor = ArchiveDescriptor::builder(ArchiveFormat::Gzip)
        .input(project.join("data.txt"))
        .output_dir(work.path().join("archives"))
        .archive_name("data.txt")
        .build()?;
    let report = compress(&descriptor, &EngineOptions::default())?;
    let extracted = extract(
        &report.archive_path,
        work.path().join("single"),
        &EngineOptions::default(),
    )?;
    println!(
        "GZIP round trip:\n{}",
        fs::read_to_string(&extracted.output_path)?
    );

    println!("✓ All done!");
    Ok(())
}
