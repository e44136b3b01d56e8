//! Tantivy schema for the chunk metadata table.
//!
//! The metadata table is the searchable side-car of the vector index:
//! one row per chunk, keyed by chunk id, carrying everything prompt
//! construction needs (source category, text, parent metadata, offsets).

use tantivy::schema::{FAST, Field, NumericOptions, STORED, STRING, Schema, SchemaBuilder};

/// Schema fields for persisted chunk metadata.
#[derive(Debug, Clone)]
pub struct ChunkSchema {
    /// Unique chunk identifier (indexed for id lookup).
    pub chunk_id: Field,

    /// Parent document id.
    pub doc_id: Field,

    /// Source category string ("occupation" | "standard" | "example").
    pub source: Field,

    /// Chunk text.
    pub text: Field,

    /// Parent document metadata as JSON.
    pub meta: Field,

    /// Position among the parent document's chunks.
    pub seq: Field,

    /// Start char offset in the parent text.
    pub char_start: Field,

    /// End char offset in the parent text.
    pub char_end: Field,
}

impl ChunkSchema {
    /// Build the tantivy schema and the field handle set.
    pub fn build() -> (Schema, Self) {
        let mut builder = SchemaBuilder::default();

        let indexed_u64 = NumericOptions::default()
            .set_indexed()
            .set_stored()
            .set_fast();

        let chunk_id = builder.add_u64_field("chunk_id", indexed_u64);

        // STRING fields for exact filtering, never tokenized.
        let doc_id = builder.add_text_field("doc_id", STRING | STORED);
        let source = builder.add_text_field("source", STRING | STORED | FAST);

        // Stored only: search happens on the vector side.
        let text = builder.add_text_field("text", STORED);
        let meta = builder.add_text_field("meta", STORED);

        let seq = builder.add_u64_field("seq", STORED);
        let char_start = builder.add_u64_field("char_start", STORED);
        let char_end = builder.add_u64_field("char_end", STORED);

        let schema = builder.build();
        let fields = Self {
            chunk_id,
            doc_id,
            source,
            text,
            meta,
            seq,
            char_start,
            char_end,
        };

        (schema, fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_declares_every_field() {
        let (schema, _fields) = ChunkSchema::build();

        for name in [
            "chunk_id",
            "doc_id",
            "source",
            "text",
            "meta",
            "seq",
            "char_start",
            "char_end",
        ] {
            assert!(schema.get_field(name).is_ok(), "missing field {name}");
        }
        assert_eq!(schema.fields().count(), 8);
    }
}
