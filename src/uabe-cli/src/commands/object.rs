//! Object commands: listing, JSON dumps and field edits

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use uabe::export::{self, ObjectSummary};
use uabe::{classes, Edit, SerializedFile};

use crate::cli::{BundleArgs, OutputArgs};
use crate::file_io::{open_serialized, with_serialized, write_output};

/// Match a summary against a class filter (name or numeric id)
fn class_matches(summary: &ObjectSummary, filter: &str) -> bool {
    match filter.parse::<i32>() {
        Ok(id) => summary.class_id == id,
        Err(_) => {
            summary.class_name.eq_ignore_ascii_case(filter)
                || classes::id(filter).is_some_and(|id| id == summary.class_id)
        }
    }
}

fn filtered_summaries(file: &SerializedFile, class: Option<&str>) -> Vec<ObjectSummary> {
    export::object_summaries(file)
        .into_iter()
        .filter(|s| class.map_or(true, |c| class_matches(s, c)))
        .collect()
}

/// Handle the objects command
pub fn objects(args: &BundleArgs, class: Option<&str>, json: bool) -> Result<()> {
    let (_, entry, file) = open_serialized(args)?;
    let summaries = filtered_summaries(&file, class);

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!(
        "{} (serialized v{}, {}, {} objects)",
        entry,
        file.version(),
        file.unity_version,
        file.objects().len()
    );
    println!("{:>20}  {:<24} {:>10}  Name", "PathID", "Class", "Size");
    for s in &summaries {
        let class = if s.has_schema {
            s.class_name.clone()
        } else {
            format!("{} (no schema)", s.class_name)
        };
        println!(
            "{:>20}  {:<24} {:>10}  {}",
            s.path_id,
            class,
            s.byte_size,
            s.name.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

/// Handle the dump command
pub fn dump(args: &BundleArgs, path_id: i64, field: Option<&str>, output: Option<&Path>) -> Result<()> {
    let (_, _, file) = open_serialized(args)?;
    let json = match field {
        Some(path) => file
            .get_field(path_id, path)
            .with_context(|| format!("Failed to read {} of object {}", path, path_id))?
            .to_json(),
        None => export::export_json(&file, path_id)
            .with_context(|| format!("Failed to read object {}", path_id))?,
    };

    let mut text = serde_json::to_string_pretty(&json)?;
    text.push('\n');
    write_output(output, text.as_bytes())
}

/// Split `FIELD=VALUE`
fn parse_assignment(assignment: &str) -> Result<(&str, &str)> {
    match assignment.split_once('=') {
        Some((field, value)) if !field.is_empty() => Ok((field.trim(), value)),
        _ => bail!("Expected FIELD=VALUE, got '{}'", assignment),
    }
}

/// Turn command-line assignments into edits of object `path_id`
fn build_edits(file: &SerializedFile, path_id: i64, assignments: &[String]) -> Result<Vec<Edit>> {
    let view = file.object(path_id)?;
    assignments
        .iter()
        .map(|a| {
            let (field, text) = parse_assignment(a)?;
            let value = view
                .parse_field(field, text)
                .with_context(|| format!("Invalid value for {}", field))?;
            Ok(Edit::new(path_id, field, value))
        })
        .collect()
}

/// Apply assignments, failing if any edit was rejected
fn apply(file: &mut SerializedFile, path_id: i64, assignments: &[String]) -> Result<()> {
    let edits = build_edits(file, path_id, assignments)?;
    let results = file.apply_edits(&edits);

    let mut failed = 0;
    for (edit, result) in edits.iter().zip(&results) {
        match result {
            Ok(()) => println!("  {} = {}", edit.path, edit.value.to_json()),
            Err(e) => {
                eprintln!("  {}: {}", edit.path, e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} edits failed; nothing written", failed, edits.len());
    }
    Ok(())
}

/// Handle the set command
pub fn set(args: &BundleArgs, out: &OutputArgs, path_id: i64, assignments: &[String]) -> Result<()> {
    with_serialized(args, out, |file| apply(file, path_id, assignments))
}

/// Handle the import-json command
pub fn import_json(args: &BundleArgs, out: &OutputArgs, path_id: i64, json_path: &Path) -> Result<()> {
    let text = fs::read_to_string(json_path)
        .with_context(|| format!("Failed to read {}", json_path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", json_path.display()))?;

    with_serialized(args, out, |file| {
        export::import_json(file, path_id, &json)
            .with_context(|| format!("Failed to import object {}", path_id))
    })
}
