//! Core types for the knowledge corpus.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

/// Stable document identity, unique within one corpus build.
pub type DocId = String;

/// Unique identifier for an indexed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(NonZeroU32);

impl ChunkId {
    /// Create a new ChunkId from a non-zero value.
    pub fn new(value: NonZeroU32) -> Self {
        Self(value)
    }

    /// Create a ChunkId from a u32, returning None if zero.
    pub fn from_u32(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    /// Get the inner value as u32.
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Convert to bytes for storage (little-endian).
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.get().to_le_bytes()
    }

    /// Create from bytes (little-endian).
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::from_u32(u32::from_le_bytes(bytes))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

/// The three fixed corpus partitions used for retrieval filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceCategory {
    /// Occupation data (duties, requirements, outlook).
    Occupation,
    /// Employability and academic standards text.
    Standard,
    /// Example transition goals.
    Example,
}

impl SourceCategory {
    /// All categories in their fixed presentation order.
    pub const ALL: [SourceCategory; 3] = [
        SourceCategory::Occupation,
        SourceCategory::Standard,
        SourceCategory::Example,
    ];

    /// Stable string form used in persisted metadata rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::Occupation => "occupation",
            SourceCategory::Standard => "standard",
            SourceCategory::Example => "example",
        }
    }

    /// Inverse of [`SourceCategory::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "occupation" => Some(SourceCategory::Occupation),
            "standard" => Some(SourceCategory::Standard),
            "example" => Some(SourceCategory::Example),
            _ => None,
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-category document metadata.
///
/// The category set is closed (three partitions), so metadata is a fixed
/// struct per variant rather than an open string map. The serde tag doubles
/// as the source category in corpus files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocumentMeta {
    /// Occupation record: page title plus the section it came from
    /// (e.g. "What They Do", "How to Become One").
    Occupation {
        title: String,
        #[serde(default)]
        section: String,
    },
    /// Standards record: the framework name and the standard's code.
    Standard {
        framework: String,
        #[serde(default)]
        code: String,
    },
    /// Example goal record: the goal area it illustrates
    /// (e.g. "employment", "education-training").
    Example {
        #[serde(default)]
        goal_area: String,
    },
}

impl DocumentMeta {
    /// Source category implied by the metadata variant.
    pub fn source(&self) -> SourceCategory {
        match self {
            DocumentMeta::Occupation { .. } => SourceCategory::Occupation,
            DocumentMeta::Standard { .. } => SourceCategory::Standard,
            DocumentMeta::Example { .. } => SourceCategory::Example,
        }
    }

    /// Human-readable one-line label for display.
    pub fn label(&self) -> String {
        match self {
            DocumentMeta::Occupation { title, section } => {
                if section.is_empty() {
                    title.clone()
                } else {
                    format!("{title} / {section}")
                }
            }
            DocumentMeta::Standard { framework, code } => {
                if code.is_empty() {
                    framework.clone()
                } else {
                    format!("{framework} {code}")
                }
            }
            DocumentMeta::Example { goal_area } => {
                if goal_area.is_empty() {
                    "example goal".to_string()
                } else {
                    format!("example goal ({goal_area})")
                }
            }
        }
    }
}

/// A corpus record. Immutable once loaded; the knowledge base is rebuilt
/// wholesale, never mutated incrementally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identity, e.g. "ooh-retail-sales-workers".
    pub id: DocId,

    /// Full record text. Never empty; the loader rejects empty records.
    pub text: String,

    /// Per-category metadata; also carries the source tag.
    #[serde(flatten)]
    pub meta: DocumentMeta,
}

impl Document {
    /// Source category inherited by every chunk of this document.
    pub fn source(&self) -> SourceCategory {
        self.meta.source()
    }
}

/// A bounded-length window of a source document, the unit indexed for
/// search. Source and metadata are inherited from the parent document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier, allocated at index build time.
    pub id: ChunkId,

    /// Parent document.
    pub doc_id: DocId,

    /// Source category inherited from the parent.
    pub source: SourceCategory,

    /// Metadata inherited from the parent.
    pub meta: DocumentMeta,

    /// Position among the parent document's chunks.
    pub seq: usize,

    /// Char offsets of this window within the parent text (start, end).
    pub char_range: (usize, usize),

    /// The window's text.
    pub text: String,
}

impl Chunk {
    /// Window length in characters.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_byte_roundtrip() {
        let id = ChunkId::from_u32(42).unwrap();
        let recovered = ChunkId::from_bytes(id.to_bytes()).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn chunk_id_zero_is_rejected() {
        assert!(ChunkId::from_u32(0).is_none());
        assert!(ChunkId::from_bytes([0, 0, 0, 0]).is_none());
    }

    #[test]
    fn source_category_string_roundtrip() {
        for category in SourceCategory::ALL {
            assert_eq!(SourceCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(SourceCategory::parse("careers"), None);
    }

    #[test]
    fn document_meta_implies_source() {
        let meta = DocumentMeta::Standard {
            framework: "Employability Skills".to_string(),
            code: "21.9-12.ES.1".to_string(),
        };
        assert_eq!(meta.source(), SourceCategory::Standard);
        assert_eq!(meta.label(), "Employability Skills 21.9-12.ES.1");
    }

    #[test]
    fn document_json_roundtrip() {
        let doc = Document {
            id: "ooh-retail-sales-workers".to_string(),
            text: "Retail sales workers help customers find products.".to_string(),
            meta: DocumentMeta::Occupation {
                title: "Retail Sales Workers".to_string(),
                section: "What They Do".to_string(),
            },
        };

        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"kind\":\"occupation\""));

        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.source(), SourceCategory::Occupation);
    }
}
