//! Reading bundles from disk and writing results back

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use uabe::{Bundle, ParseOptions, SerializedFile};

use crate::cli::{BundleArgs, OutputArgs};
use crate::config::Config;

/// Read and parse a bundle file
pub fn read_bundle(path: &Path) -> Result<Bundle> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    uabe::open_bundle(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

/// The serialized entry named `entry`, or the bundle's first one
pub fn pick_entry(bundle: &Bundle, entry: Option<&str>) -> Result<String> {
    let names = bundle.serialized_names();
    match entry {
        Some(name) if names.iter().any(|n| n == name) => Ok(name.to_string()),
        Some(name) => bail!(
            "No serialized entry named '{}' (available: {})",
            name,
            names.join(", ")
        ),
        None => names
            .into_iter()
            .next()
            .context("Bundle has no serialized entries"),
    }
}

/// Open the bundle and the serialized entry selected by `args`
pub fn open_serialized(args: &BundleArgs) -> Result<(Bundle, String, SerializedFile)> {
    let bundle = read_bundle(&args.input)?;
    let entry = pick_entry(&bundle, args.entry.as_deref())?;
    let file = bundle
        .serialized(&entry, &ParseOptions::default())
        .with_context(|| format!("Failed to parse entry {}", entry))?;
    Ok((bundle, entry, file))
}

/// Write the bundle to `out.output`
///
/// The bundle keeps its block layout unless compression or block size were
/// given, in which case the config fills in whatever was not.
pub fn save_bundle(bundle: &Bundle, out: &OutputArgs) -> Result<()> {
    let bytes = if out.overrides_layout() {
        let options = Config::load()?.write_options(out.compression, out.block_size)?;
        bundle.write_with(&options)
    } else {
        bundle.write()
    }
    .context("Failed to write bundle")?;

    fs::write(&out.output, &bytes)
        .with_context(|| format!("Failed to write {}", out.output.display()))?;
    tracing::info!(path = %out.output.display(), size = bytes.len(), "wrote bundle");
    Ok(())
}

/// Common pattern for edits: open -> modify the entry -> store -> write
pub fn with_serialized(
    args: &BundleArgs,
    out: &OutputArgs,
    modify: impl FnOnce(&mut SerializedFile) -> Result<()>,
) -> Result<()> {
    let (mut bundle, entry, mut file) = open_serialized(args)?;

    modify(&mut file)?;

    if file.is_modified() {
        bundle
            .store_serialized(&entry, &file)
            .with_context(|| format!("Failed to store entry {}", entry))?;
    } else {
        tracing::info!(entry = %entry, "no changes");
    }
    save_bundle(&bundle, out)
}

/// Write bytes to a file, or stdout when no path is given
pub fn write_output(path: Option<&Path>, data: &[u8]) -> Result<()> {
    match path {
        Some(p) => fs::write(p, data).with_context(|| format!("Failed to write {}", p.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;
    use uabe::bundle::flags;
    use uabe::serialized::SerializedType;
    use uabe::{classes, Endian, TypeNode, TypeTree, Value};

    fn string_nodes(level: u8, name: &str) -> Vec<TypeNode> {
        vec![
            TypeNode::new(level, "string", name, -1),
            TypeNode::new(level + 1, "Array", "Array", -1).aligned(),
            TypeNode::new(level + 2, "int", "size", 4),
            TypeNode::new(level + 2, "char", "data", 1),
        ]
    }

    fn text_asset_tree() -> TypeTree {
        let mut nodes = vec![TypeNode::new(0, "TextAsset", "Base", -1)];
        nodes.extend(string_nodes(1, "m_Name"));
        nodes.extend(string_nodes(1, "m_Script"));
        TypeTree::new(nodes)
    }

    fn texture_tree() -> TypeTree {
        let mut nodes = vec![TypeNode::new(0, "Texture2D", "Base", -1)];
        nodes.extend(string_nodes(1, "m_Name"));
        nodes.extend([
            TypeNode::new(1, "int", "m_Width", 4),
            TypeNode::new(1, "int", "m_Height", 4),
            TypeNode::new(1, "unsigned int", "m_CompleteImageSize", 4),
            TypeNode::new(1, "int", "m_TextureFormat", 4),
            TypeNode::new(1, "int", "m_MipCount", 4),
            TypeNode::new(1, "TypelessData", "image data", -1).aligned(),
            TypeNode::new(2, "int", "size", 4),
            TypeNode::new(2, "UInt8", "data", 1),
        ]);
        TypeTree::new(nodes)
    }

    /// 2x2 RGBA32 pixels, bottom row first
    pub(crate) const PIXELS: [u8; 16] = [
        0, 0, 255, 255, 0, 255, 0, 255, //
        255, 0, 0, 255, 255, 255, 255, 255,
    ];

    /// A bundle with one serialized entry `CAB-test` holding a TextAsset
    /// (path id 1, script "hello") and a 2x2 Texture2D (path id 2)
    pub(crate) fn sample_bundle() -> Bundle {
        let mut file = SerializedFile::new(19, "2021.3.16f1", 13, Endian::Little).unwrap();

        let text = file.add_type(SerializedType::new(classes::TEXT_ASSET, Some(text_asset_tree())));
        file.add_object(1, text, Vec::new()).unwrap();
        file.write_object(
            1,
            &Value::Struct(vec![
                ("m_Name".into(), Value::String("readme".into())),
                ("m_Script".into(), Value::String("hello".into())),
            ]),
        )
        .unwrap();

        let texture = file.add_type(SerializedType::new(classes::TEXTURE_2D, Some(texture_tree())));
        file.add_object(2, texture, Vec::new()).unwrap();
        file.write_object(
            2,
            &Value::Struct(vec![
                ("m_Name".into(), Value::String("swatch".into())),
                ("m_Width".into(), Value::Int(2)),
                ("m_Height".into(), Value::Int(2)),
                ("m_CompleteImageSize".into(), Value::UInt(16)),
                ("m_TextureFormat".into(), Value::Int(4)),
                ("m_MipCount".into(), Value::Int(1)),
                ("image data".into(), Value::Bytes(PIXELS.to_vec())),
            ]),
        )
        .unwrap();

        let mut bundle = Bundle::new("5.x.x", "2021.3.16f1");
        bundle
            .add_entry("CAB-test", flags::ENTRY_SERIALIZED, file.write().unwrap())
            .unwrap();
        bundle
    }

    /// Write [`sample_bundle`] into `dir`
    pub(crate) fn sample_bundle_file(dir: &Path) -> PathBuf {
        let path = dir.join("sample.bundle");
        fs::write(&path, sample_bundle().write().unwrap()).unwrap();
        path
    }

    pub(crate) fn bundle_args(input: &Path) -> BundleArgs {
        BundleArgs {
            input: input.to_path_buf(),
            entry: None,
        }
    }

    pub(crate) fn output_args(output: &Path) -> OutputArgs {
        OutputArgs {
            output: output.to_path_buf(),
            compression: None,
            block_size: None,
        }
    }

    #[test]
    fn test_open_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let input = sample_bundle_file(dir.path());
        let (_, entry, file) = open_serialized(&bundle_args(&input)).unwrap();
        assert_eq!(entry, "CAB-test");
        assert_eq!(file.objects().len(), 2);
    }

    #[test]
    fn test_pick_entry() {
        let bundle = sample_bundle();
        assert_eq!(pick_entry(&bundle, Some("CAB-test")).unwrap(), "CAB-test");
        let err = pick_entry(&bundle, Some("CAB-other")).unwrap_err();
        assert!(err.to_string().contains("available: CAB-test"));
    }

    #[test]
    fn test_unchanged_edit_keeps_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let input = sample_bundle_file(dir.path());
        let output = dir.path().join("out.bundle");

        with_serialized(&bundle_args(&input), &output_args(&output), |_| Ok(())).unwrap();
        assert_eq!(fs::read(&output).unwrap(), fs::read(&input).unwrap());
    }

    #[test]
    fn test_read_bundle_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bundle");
        fs::write(&path, b"not a bundle").unwrap();
        let err = read_bundle(&path).unwrap_err();
        assert!(err.to_string().contains("junk.bundle"));
    }
}
