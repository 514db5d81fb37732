//! TextAsset commands

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use uabe::export;

use crate::cli::{BundleArgs, OutputArgs};
use crate::file_io::{open_serialized, with_serialized, write_output};

/// Handle the export-text command
pub fn export_text(args: &BundleArgs, path_id: i64, output: Option<&Path>) -> Result<()> {
    let (_, _, file) = open_serialized(args)?;
    let script = export::export_text(&file, path_id)
        .with_context(|| format!("Failed to read script of object {}", path_id))?;
    write_output(output, &script)
}

/// Handle the import-text command
pub fn import_text(args: &BundleArgs, out: &OutputArgs, path_id: i64, input: &Path) -> Result<()> {
    let data = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    with_serialized(args, out, |file| {
        export::import_text(file, path_id, &data)
            .with_context(|| format!("Failed to replace script of object {}", path_id))?;
        println!("Replaced script of object {} ({} bytes)", path_id, data.len());
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_io::tests::{bundle_args, output_args, sample_bundle_file};

    #[test]
    fn test_text_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let input = sample_bundle_file(dir.path());
        let exported = dir.path().join("readme.txt");

        export_text(&bundle_args(&input), 1, Some(&exported)).unwrap();
        assert_eq!(fs::read(&exported).unwrap(), b"hello");

        let replacement = dir.path().join("new.txt");
        fs::write(&replacement, "line one\nline two\n").unwrap();
        let output = dir.path().join("edited.bundle");
        import_text(&bundle_args(&input), &output_args(&output), 1, &replacement).unwrap();

        export_text(&bundle_args(&output), 1, Some(&exported)).unwrap();
        assert_eq!(fs::read(&exported).unwrap(), b"line one\nline two\n");
    }

    #[test]
    fn test_export_text_of_texture_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = sample_bundle_file(dir.path());
        assert!(export_text(&bundle_args(&input), 2, Some(&dir.path().join("x"))).is_err());
    }
}
