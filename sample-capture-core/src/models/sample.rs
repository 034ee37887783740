use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Container/codec a sample is encoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Aac,
    Mp3,
    Flac,
    Wav,
}

impl TargetFormat {
    /// File extension written for this format. AAC is stored in an MPEG-4 container.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Aac => "m4a",
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Wav => "wav",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "m4a" | "aac" => Some(Self::Aac),
            "mp3" => Some(Self::Mp3),
            "flac" => Some(Self::Flac),
            "wav" => Some(Self::Wav),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Wav => "wav",
        }
    }
}

/// Descriptive metadata of a sample.
///
/// Tags are deduplicated on insert and keep their insertion order, which is
/// the order used in the generated filename. Matching compares them as a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub title: String,
    tags: Vec<String>,
    pub description: Option<String>,
    pub format: TargetFormat,
}

impl SampleMetadata {
    pub fn new(title: impl Into<String>, format: TargetFormat) -> Self {
        Self {
            title: title.into(),
            tags: Vec::new(),
            description: None,
            format,
        }
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        for tag in tags {
            self.add_tag(tag);
        }
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a tag unless it is empty or already present. Returns whether it was added.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if tag.is_empty() || self.tags.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn tag_set(&self) -> BTreeSet<&str> {
        self.tags.iter().map(String::as_str).collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A `[start, end)` region in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimWindow {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl TrimWindow {
    pub fn new(start_secs: f64, end_secs: f64) -> Self {
        Self { start_secs, end_secs }
    }
}

/// Choices the editing layer makes for one processing call.
#[derive(Debug, Clone, PartialEq)]
pub struct EditConfiguration {
    /// Remove the source file after the sample has been promoted.
    pub delete_after_complete: bool,

    /// Overrides the metadata's target format when set.
    pub format: Option<TargetFormat>,

    pub trim: Option<TrimWindow>,

    /// Directory the finished sample is promoted into.
    pub destination: PathBuf,
}

impl EditConfiguration {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            delete_after_complete: false,
            format: None,
            trim: None,
            destination: destination.into(),
        }
    }

    pub fn delete_after_complete(mut self, delete: bool) -> Self {
        self.delete_after_complete = delete;
        self
    }

    pub fn with_trim(mut self, trim: TrimWindow) -> Self {
        self.trim = Some(trim);
        self
    }

    pub fn with_format(mut self, format: TargetFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// A catalogued sample on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub id: String,
    pub path: PathBuf,
    pub metadata: SampleMetadata,
}

impl Sample {
    /// Build a sample from a file path, or `None` if the filename does not
    /// follow the naming grammar.
    ///
    /// The id comes from the sidecar when there is one; otherwise a new id
    /// is minted.
    pub fn from_path(path: &Path) -> Option<Self> {
        let metadata = crate::storage::naming::parse_path(path)?;
        Some(Self {
            id: sidecar_id(path).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            path: path.to_path_buf(),
            metadata,
        })
    }

    /// Read the description from the sample's sidecar, if one was written.
    pub fn load_description(&self) -> Option<String> {
        match crate::storage::sidecar::read_sidecar(&self.path) {
            Ok(sidecar) => sidecar.description,
            Err(e) => {
                log::debug!("No sidecar for {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

fn sidecar_id(path: &Path) -> Option<String> {
    if !crate::storage::sidecar::sidecar_path(path).is_file() {
        return None;
    }
    match crate::storage::sidecar::read_sidecar(path) {
        Ok(sidecar) if !sidecar.id.is_empty() => Some(sidecar.id),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Ignoring unreadable sidecar for {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_deduplicated_in_insertion_order() {
        let metadata = SampleMetadata::new("kick", TargetFormat::Wav).with_tags(["drum", "808", "drum", ""]);
        assert_eq!(metadata.tags(), &["drum".to_string(), "808".to_string()]);
        assert!(metadata.has_tag("808"));
    }

    #[test]
    fn tag_sets_ignore_order() {
        let a = SampleMetadata::new("kick", TargetFormat::Wav).with_tags(["drum", "808"]);
        let b = SampleMetadata::new("kick", TargetFormat::Wav).with_tags(["808", "drum"]);
        assert_ne!(a.tags(), b.tags());
        assert_eq!(a.tag_set(), b.tag_set());
    }

    #[test]
    fn extensions_round_trip() {
        for format in [TargetFormat::Aac, TargetFormat::Mp3, TargetFormat::Flac, TargetFormat::Wav] {
            assert_eq!(TargetFormat::from_extension(format.extension()), Some(format));
        }
        assert_eq!(TargetFormat::from_extension("AAC"), Some(TargetFormat::Aac));
        assert_eq!(TargetFormat::from_extension("ogg"), None);
    }

    #[test]
    fn from_path_rejects_unparseable_names() {
        assert!(Sample::from_path(Path::new("/lib/notes.txt")).is_none());
        let sample = Sample::from_path(Path::new("/lib/kick--drum_808.wav")).unwrap();
        assert_eq!(sample.metadata.title, "kick");
    }
}
