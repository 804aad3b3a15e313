//! Key and classifier utilities.

use kiln_core::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Classifier prefix of attached directory bundles.
pub const GENERATED_SOURCES_PREFIX: &str = "generatedsources_";

/// Joins path segments inside a classifier.
const SEGMENT_SEPARATOR: char = '_';

/// Sanitize a key for use in filenames.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

/// Encode a path relative to the target dir as a bundle classifier.
///
/// Segments are joined with `_`; `%` and `_` inside a segment are
/// percent-escaped so that [`classifier_to_path`] can reverse the encoding.
pub fn path_to_classifier(relative: &Path) -> String {
    let segments: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(escape_segment(&name.to_string_lossy())),
            _ => None,
        })
        .collect();
    format!(
        "{}{}",
        GENERATED_SOURCES_PREFIX,
        segments.join(&SEGMENT_SEPARATOR.to_string())
    )
}

/// Directory under `target_dir` a bundle classifier was produced from.
pub fn classifier_to_path(target_dir: &Path, classifier: &str) -> Result<PathBuf> {
    let encoded = classifier
        .strip_prefix(GENERATED_SOURCES_PREFIX)
        .ok_or_else(|| Error::Archive(format!("not a directory bundle classifier: {}", classifier)))?;
    let mut path = target_dir.to_path_buf();
    for segment in encoded.split(SEGMENT_SEPARATOR) {
        let segment = unescape_segment(segment)?;
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(Error::Archive(format!(
                "invalid path segment in classifier: {}",
                classifier
            )));
        }
        path.push(segment);
    }
    Ok(path)
}

pub fn is_directory_bundle(classifier: Option<&str>) -> bool {
    classifier.is_some_and(|c| c.starts_with(GENERATED_SOURCES_PREFIX))
}

fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace('_', "%5F")
}

fn unescape_segment(segment: &str) -> Result<String> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3);
        match code {
            Some("25") => out.push('%'),
            Some("5F") => out.push('_'),
            _ => return Err(Error::Archive(format!("invalid escape in segment: {}", segment))),
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Ok(out)
}

/// File extension an artifact of `artifact_type` is stored with.
pub fn extension_for_type(artifact_type: &str) -> &str {
    match artifact_type {
        "test-jar" | "maven-plugin" | "ejb" | "ejb-client" | "java-source" | "javadoc" => "jar",
        other => other,
    }
}

/// Name an artifact file is stored under inside a cache entry.
pub fn stored_file_name(
    artifact_id: &str,
    version: &str,
    artifact_type: &str,
    classifier: Option<&str>,
) -> String {
    let extension = extension_for_type(artifact_type);
    match classifier.filter(|c| !c.is_empty()) {
        Some(classifier) => format!("{}-{}-{}.{}", artifact_id, version, classifier, extension),
        None => format!("{}-{}.{}", artifact_id, version, extension),
    }
}
