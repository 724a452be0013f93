// Persisted annotation timeline
//
// One JSON object per captured video: a key per logical frame index ("0",
// "1", ...) holding that frame's annotation entry, plus a reserved "metadata"
// key describing the source and the audio format.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Result, SessionError};
use crate::timeline::AnnotationEntry;

const METADATA_KEY: &str = "metadata";

/// Description of a captured session, stored under the reserved key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub video_name: String,
    pub frame_rate: f64,
    /// Frame high-water mark at save time
    pub frame_count: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

/// A key of the persisted object. Frame keys and the metadata key cannot
/// collide: a frame key is always a decimal integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimelineKey {
    Frame(u64),
    Metadata,
}

impl fmt::Display for TimelineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineKey::Frame(index) => write!(f, "{}", index),
            TimelineKey::Metadata => f.write_str(METADATA_KEY),
        }
    }
}

impl FromStr for TimelineKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == METADATA_KEY {
            return Ok(TimelineKey::Metadata);
        }
        s.parse::<u64>()
            .map(TimelineKey::Frame)
            .map_err(|_| format!("invalid timeline key '{}'", s))
    }
}

/// The annotation timeline of one session, as saved next to the video
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationTimeline {
    pub metadata: Option<SessionMetadata>,
    pub frames: BTreeMap<u64, AnnotationEntry>,
}

impl AnnotationTimeline {
    /// Key annotation entries by their position in the sequence
    pub fn from_entries(entries: Vec<AnnotationEntry>, metadata: SessionMetadata) -> Self {
        Self {
            metadata: Some(metadata),
            frames: entries
                .into_iter()
                .enumerate()
                .map(|(i, entry)| (i as u64, entry))
                .collect(),
        }
    }

    pub fn get(&self, frame_number: u64) -> Option<&AnnotationEntry> {
        self.frames.get(&frame_number)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| SessionError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| SessionError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let io_err = |e| SessionError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(|e| SessionError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        writer.flush().map_err(io_err)
    }
}

impl Serialize for AnnotationTimeline {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = self.frames.len() + usize::from(self.metadata.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        for (index, entry) in &self.frames {
            map.serialize_entry(&TimelineKey::Frame(*index).to_string(), entry)?;
        }
        if let Some(metadata) = &self.metadata {
            map.serialize_entry(&TimelineKey::Metadata.to_string(), metadata)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AnnotationTimeline {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TimelineVisitor;

        impl<'de> Visitor<'de> for TimelineVisitor {
            type Value = AnnotationTimeline;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object keyed by frame index with a \"metadata\" entry")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut timeline = AnnotationTimeline::default();
                while let Some(key) = access.next_key::<String>()? {
                    match key.parse::<TimelineKey>().map_err(de::Error::custom)? {
                        TimelineKey::Metadata => {
                            if timeline.metadata.is_some() {
                                return Err(de::Error::duplicate_field(METADATA_KEY));
                            }
                            timeline.metadata = Some(access.next_value()?);
                        }
                        TimelineKey::Frame(index) => {
                            let entry = access.next_value()?;
                            if timeline.frames.insert(index, entry).is_some() {
                                return Err(de::Error::custom(format!(
                                    "duplicate frame key {}",
                                    index
                                )));
                            }
                        }
                    }
                }
                Ok(timeline)
            }
        }

        deserializer.deserialize_map(TimelineVisitor)
    }
}
