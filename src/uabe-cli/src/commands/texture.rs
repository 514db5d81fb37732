//! Texture2D commands

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use image::ImageFormat;
use uabe::codec::{self, CancelFlag};
use uabe::{classes, export, Bundle, ResourceResolver, SerializedFile, TextureFormat};

use crate::cli::{BundleArgs, OutputArgs};
use crate::config::Config;
use crate::file_io::{open_serialized, with_serialized};

/// Render one texture as PNG bytes, resolving streamed pixels from the bundle
fn render(bundle: &Bundle, file: &SerializedFile, path_id: i64, mip: u32) -> uabe::Result<Vec<u8>> {
    let resolver: &dyn ResourceResolver = bundle;
    export::export_png(file, path_id, Some(resolver), mip)
}

/// Handle the export-texture command
pub fn export_texture(args: &BundleArgs, path_id: i64, output: &Path, mip: u32) -> Result<()> {
    let (bundle, _, file) = open_serialized(args)?;
    let png = render(&bundle, &file, path_id, mip)
        .with_context(|| format!("Failed to decode texture {}", path_id))?;
    fs::write(output, &png).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {}", output.display());
    Ok(())
}

/// Resolve the import format from the flag or the config
fn import_format(flag: Option<&str>) -> Result<TextureFormat> {
    match flag {
        Some(name) => TextureFormat::from_name(name)
            .with_context(|| format!("Unknown texture format '{}'", name)),
        None => Config::load()?.texture_format(),
    }
}

/// Handle the import-texture command
pub fn import_texture(
    args: &BundleArgs,
    out: &OutputArgs,
    path_id: i64,
    image_path: &Path,
    format: Option<&str>,
    mipmaps: bool,
) -> Result<()> {
    let format = import_format(format)?;
    let image = image::open(image_path)
        .with_context(|| format!("Failed to read image {}", image_path.display()))?
        .to_rgba8();

    with_serialized(args, out, |file| {
        uabe::replace_image(file, path_id, &image, format, mipmaps)
            .with_context(|| format!("Failed to import texture {}", path_id))?;
        println!(
            "Imported {}x{} {} into texture {}",
            image.width(),
            image.height(),
            format,
            path_id
        );
        Ok(())
    })
}

/// File name for an exported texture
fn png_name(name: Option<&str>, path_id: i64) -> String {
    let stem: String = name
        .unwrap_or("texture")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}_{}.png", stem, path_id)
}

/// Textures decoded per batch; the progress bar advances between batches
const BATCH: usize = 32;

/// Handle the export-textures command
///
/// Decoding runs through the library's parallel batch API. Raising `cancel`
/// stops before the next texture starts; the command then fails after
/// reporting what was written.
pub fn export_textures(args: &BundleArgs, output: &Path, cancel: &CancelFlag) -> Result<()> {
    let (bundle, entry, file) = open_serialized(args)?;
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let textures: Vec<(i64, PathBuf)> = export::object_summaries(&file)
        .into_iter()
        .filter(|s| s.class_id == classes::TEXTURE_2D)
        .map(|s| (s.path_id, output.join(png_name(s.name.as_deref(), s.path_id))))
        .collect();

    let pb = ProgressBar::new(textures.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let resolver: &dyn ResourceResolver = &bundle;
    let (mut written, mut failed, mut cancelled) = (0usize, 0usize, 0usize);

    for batch in textures.chunks(BATCH) {
        let ids: Vec<i64> = batch.iter().map(|(path_id, _)| *path_id).collect();
        let images = uabe::decode_textures(&file, &ids, Some(resolver), cancel);

        let results: Vec<Result<()>> = batch
            .par_iter()
            .zip(images)
            .map(|((path_id, path), image)| {
                let image = image.with_context(|| format!("Texture {}", path_id))?;
                image
                    .save_with_format(path, ImageFormat::Png)
                    .with_context(|| format!("Failed to write {}", path.display()))
            })
            .collect();

        for result in results {
            match result {
                Ok(()) => written += 1,
                Err(err) if is_cancelled(&err) => cancelled += 1,
                Err(err) => {
                    tracing::warn!("{:#}", err);
                    failed += 1;
                }
            }
        }
        pb.inc(batch.len() as u64);
    }

    if cancelled > 0 {
        pb.abandon_with_message("cancelled");
    } else {
        pb.finish_and_clear();
    }

    println!(
        "Exported {} of {} textures from {} to {}",
        written,
        textures.len(),
        entry,
        output.display()
    );
    if failed > 0 {
        tracing::warn!(failed, "some textures could not be exported");
    }
    if cancelled > 0 {
        anyhow::bail!("Cancelled with {} textures not exported", cancelled);
    }
    Ok(())
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    err.downcast_ref::<uabe::Error>().is_some_and(|e| {
        matches!(e.innermost(), uabe::Error::Texture(codec::Error::Cancelled))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_io::tests::{bundle_args, output_args, sample_bundle_file, PIXELS};
    use image::{Rgba, RgbaImage};
    use uabe::Value;

    #[test]
    fn test_png_name() {
        assert_eq!(png_name(Some("ui/icon 01"), 5), "ui_icon_01_5.png");
        assert_eq!(png_name(None, -3), "texture_-3.png");
    }

    #[test]
    fn test_export_texture_flips_rows() {
        let dir = tempfile::tempdir().unwrap();
        let input = sample_bundle_file(dir.path());
        let output = dir.path().join("swatch.png");

        export_texture(&bundle_args(&input), 2, &output, 0).unwrap();

        let image = image::open(&output).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (2, 2));
        // Blob rows are bottom-up
        assert_eq!(image.get_pixel(0, 1).0, PIXELS[0..4]);
        assert_eq!(image.get_pixel(1, 0).0, PIXELS[12..16]);
    }

    #[test]
    fn test_import_texture() {
        let dir = tempfile::tempdir().unwrap();
        let input = sample_bundle_file(dir.path());
        let png = dir.path().join("new.png");
        let source = RgbaImage::from_fn(8, 8, |x, y| Rgba([x as u8 * 32, y as u8 * 32, 0, 255]));
        source.save(&png).unwrap();

        let output = dir.path().join("edited.bundle");
        import_texture(
            &bundle_args(&input),
            &output_args(&output),
            2,
            &png,
            Some("RGBA32"),
            true,
        )
        .unwrap();

        let (_, _, file) = open_serialized(&bundle_args(&output)).unwrap();
        assert_eq!(file.get_field(2, "m_Width").unwrap(), Value::Int(8));
        assert_eq!(file.get_field(2, "m_MipCount").unwrap(), Value::Int(4));

        let exported = dir.path().join("check.png");
        export_texture(&bundle_args(&output), 2, &exported, 0).unwrap();
        assert_eq!(image::open(&exported).unwrap().to_rgba8(), source);
    }

    #[test]
    fn test_unknown_import_format() {
        assert!(import_format(Some("NotAFormat")).is_err());
        assert_eq!(import_format(Some("dxt1")).unwrap(), TextureFormat::DXT1);
    }

    #[test]
    fn test_export_textures() {
        let dir = tempfile::tempdir().unwrap();
        let input = sample_bundle_file(dir.path());
        let out_dir = dir.path().join("textures");

        export_textures(&bundle_args(&input), &out_dir, &CancelFlag::new()).unwrap();

        let written: Vec<_> = fs::read_dir(&out_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(written, ["swatch_2.png"]);

        let image = image::open(out_dir.join("swatch_2.png")).unwrap().to_rgba8();
        assert_eq!(image.get_pixel(0, 1).0, PIXELS[0..4]);
    }

    #[test]
    fn test_export_textures_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let input = sample_bundle_file(dir.path());
        let out_dir = dir.path().join("textures");

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = export_textures(&bundle_args(&input), &out_dir, &cancel).unwrap_err();
        assert!(err.to_string().contains("Cancelled"));
        assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 0);
    }
}
