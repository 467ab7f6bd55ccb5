// src/project/export.rs
use super::GeneratedFile;
use std::io::{Cursor, Write};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const EXPORT_FILE_NAME: &str = "libelula-nextjs-project.zip";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Packs the file set into a zip archive, one entry per file at its path.
pub fn export_zip(files: &[GeneratedFile]) -> Result<Vec<u8>, ExportError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for file in files {
        writer.start_file(file.path.as_str(), options)?;
        writer.write_all(file.content.as_bytes())?;
    }

    let cursor = writer.finish()?;
    tracing::debug!("📦 Exported {} files into zip archive", files.len());
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::scaffold::default_scaffold;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn archive_holds_one_entry_per_file_with_exact_content() {
        let mut files = default_scaffold();
        files.push(GeneratedFile::new("app/components/Émoji.tsx", "export const x = '🐉';\n"));

        let bytes = export_zip(&files).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), files.len());

        for file in &files {
            let mut entry = archive.by_name(&file.path).unwrap();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            assert_eq!(content, file.content, "content mismatch for {}", file.path);
        }
    }

    #[test]
    fn empty_file_set_gives_empty_archive() {
        let bytes = export_zip(&[]).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
