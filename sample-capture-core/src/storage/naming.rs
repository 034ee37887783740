//! Filename grammar shared by sample generation and catalog parsing.
//!
//! ```text
//! <title>--<tag1>_<tag2>_..._<tagN>.<ext>
//! ```
//!
//! The stem is split at the first `--`. Titles never contain `--` and tags
//! never contain `_` once generated, so every generated name parses back to
//! the same title and tag set.

use std::path::Path;

use crate::models::sample::{SampleMetadata, TargetFormat};

pub const TITLE_SEPARATOR: &str = "--";
pub const TAG_SEPARATOR: char = '_';

const UNTITLED: &str = "untitled";

/// Canonical filename for `metadata` encoded as `format`.
pub fn canonical_filename(metadata: &SampleMetadata, format: TargetFormat) -> String {
    let title = sanitize_title(&metadata.title);
    let mut tags: Vec<String> = Vec::with_capacity(metadata.tags().len());
    for tag in metadata.tags() {
        let tag = sanitize_tag(tag);
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    let sep = TAG_SEPARATOR.to_string();
    format!("{}{}{}.{}", title, TITLE_SEPARATOR, tags.join(&sep), format.extension())
}

/// Metadata as it will read back from the canonical filename.
pub fn canonical_metadata(metadata: &SampleMetadata, format: TargetFormat) -> SampleMetadata {
    let mut canonical = SampleMetadata::new(sanitize_title(&metadata.title), format)
        .with_tags(metadata.tags().iter().map(|t| sanitize_tag(t)));
    canonical.description = metadata.description.clone();
    canonical
}

/// Parse a filename. `None` means the file is not a catalog sample.
pub fn parse_filename(name: &str) -> Option<SampleMetadata> {
    if name.starts_with('.') {
        return None;
    }
    let (stem, ext) = name.rsplit_once('.')?;
    let format = TargetFormat::from_extension(ext)?;
    let (title, tag_blob) = stem.split_once(TITLE_SEPARATOR)?;
    if title.trim().is_empty() {
        return None;
    }

    let tags = tag_blob.split(TAG_SEPARATOR).filter(|t| !t.is_empty());
    Some(SampleMetadata::new(title, format).with_tags(tags))
}

pub fn parse_path(path: &Path) -> Option<SampleMetadata> {
    let name = path.file_name()?.to_str()?;
    parse_filename(name)
}

fn strip_unsafe(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

fn collapse_dashes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out
}

fn sanitize_title(title: &str) -> String {
    let title = collapse_dashes(strip_unsafe(title).trim());
    // A trailing '-' would merge into the separator and shift the split point.
    let title = title.trim_start_matches('.').trim_end_matches('-').trim().to_string();
    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

fn sanitize_tag(tag: &str) -> String {
    let replaced: String = strip_unsafe(tag)
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == TAG_SEPARATOR || c == '.' || c.is_whitespace() { '-' } else { c })
        .collect();
    collapse_dashes(&replaced).trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kick() -> SampleMetadata {
        SampleMetadata::new("kick", TargetFormat::Wav).with_tags(["drum", "808"])
    }

    #[test]
    fn generates_canonical_name() {
        assert_eq!(canonical_filename(&kick(), TargetFormat::Wav), "kick--drum_808.wav");
        assert_eq!(canonical_filename(&kick(), TargetFormat::Aac), "kick--drum_808.m4a");
    }

    #[test]
    fn parses_canonical_name() {
        let parsed = parse_filename("kick--drum_808.wav").unwrap();
        assert_eq!(parsed.title, "kick");
        assert_eq!(parsed.tag_set(), kick().tag_set());
        assert_eq!(parsed.format, TargetFormat::Wav);
    }

    #[test]
    fn generated_names_parse_back() {
        let metadata = SampleMetadata::new("Big -- Room/Snare", TargetFormat::Flac)
            .with_tags(["Lo Fi", "vinyl_crackle", "lo fi", "  "]);
        let name = canonical_filename(&metadata, TargetFormat::Flac);
        assert_eq!(name, "Big - RoomSnare--lo-fi_vinyl-crackle.flac");

        let parsed = parse_filename(&name).unwrap();
        let expected = canonical_metadata(&metadata, TargetFormat::Flac);
        assert_eq!(parsed.title, expected.title);
        assert_eq!(parsed.tag_set(), expected.tag_set());
    }

    #[test]
    fn untagged_samples_keep_separator() {
        let metadata = SampleMetadata::new("pad", TargetFormat::Mp3);
        let name = canonical_filename(&metadata, TargetFormat::Mp3);
        assert_eq!(name, "pad--.mp3");
        let parsed = parse_filename(&name).unwrap();
        assert_eq!(parsed.title, "pad");
        assert!(parsed.tags().is_empty());
    }

    #[test]
    fn trailing_dash_in_title_does_not_shift_separator() {
        let metadata = SampleMetadata::new("riser-", TargetFormat::Wav).with_tags(["fx"]);
        let name = canonical_filename(&metadata, TargetFormat::Wav);
        assert_eq!(name, "riser--fx.wav");
        assert_eq!(parse_filename(&name).unwrap().title, "riser");
    }

    #[test]
    fn empty_title_becomes_untitled() {
        let metadata = SampleMetadata::new("  ", TargetFormat::Wav).with_tags(["x"]);
        assert_eq!(canonical_filename(&metadata, TargetFormat::Wav), "untitled--x.wav");
    }

    #[test]
    fn rejects_non_conforming_names() {
        assert!(parse_filename("kick.wav").is_none());
        assert!(parse_filename("kick--drum.txt").is_none());
        assert!(parse_filename("--drum.wav").is_none());
        assert!(parse_filename(".kick--drum.wav").is_none());
        assert!(parse_filename("kick--drum").is_none());
        assert!(parse_filename("kick--drum.wav.metadata.json").is_none());
    }

    #[test]
    fn duplicate_tags_collapse_when_parsing() {
        let parsed = parse_filename("hat--open_open__closed.wav").unwrap();
        assert_eq!(parsed.tags(), &["open".to_string(), "closed".to_string()]);
    }
}
