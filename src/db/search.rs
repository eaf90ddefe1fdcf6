use super::{Db, serialize_vector};
use rusqlite::Result;
use rusqlite::params;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_id: i64,
    pub file_name: String,
    pub content: String,
    pub position: usize,
    pub metadata: BTreeMap<String, String>,
    /// `1 - cosine_distance / 2`, so 1.0 is identical and 0.0 opposite.
    pub similarity: f64,
}

fn map_search_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchResult> {
    let raw_metadata: String = row.get(4)?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&raw_metadata).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let distance: f64 = row.get(5)?;
    let similarity = 1.0 - (distance / 2.0);

    Ok(SearchResult {
        chunk_id: row.get(0)?,
        file_name: row.get(1)?,
        content: row.get(2)?,
        position: row.get::<_, i64>(3)? as usize,
        metadata,
        similarity,
    })
}

impl Db {
    /// Vector similarity search using cosine distance, best match first.
    ///
    /// Ties keep insertion order.
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                c.id,
                c.file_name,
                c.content,
                c.position,
                c.metadata,
                vec_distance_cosine(v.embedding, ?) AS distance
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            ORDER BY distance ASC, c.id ASC
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map(
            params![serialize_vector(query_vector), top_k as i64],
            map_search_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunk;
    use crate::db::IndexMeta;
    use crate::parser::Document;
    use chrono::Utc;

    fn chunk(file_name: &str, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: Document::new(file_name, String::new()).metadata,
            position: 0,
        }
    }

    fn padded(values: &[f32]) -> Vec<f32> {
        let mut v = vec![0.0f32; 16];
        v[..values.len()].copy_from_slice(values);
        v
    }

    fn seeded_db() -> Db {
        let mut db = Db::open_in_memory().unwrap();
        let meta = IndexMeta {
            model: "test".to_string(),
            dimensions: 16,
            built_at: Utc::now(),
        };
        db.replace_all(
            &meta,
            &[
                chunk("rust.pdf", "Rust programming language"),
                chunk("people.csv", "name | age"),
                chunk("far.pdf", "Something unrelated"),
            ],
            &[
                padded(&[0.1, 0.2, 0.3]),
                padded(&[0.9, 0.8, 0.7]),
                padded(&[-0.5, 0.0, 0.0, 1.0]),
            ],
        )
        .unwrap();
        db
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let db = seeded_db();

        let results = db.search(&padded(&[0.1, 0.2, 0.3]), 5).unwrap();
        assert_eq!(results.len(), 3);

        // Nearest should be rust.pdf
        assert_eq!(results[0].file_name, "rust.pdf");
        assert!(results[0].similarity > 0.99); // completely similar
        assert_eq!(results[0].metadata.get("file_name").unwrap(), "rust.pdf");
        assert_eq!(results[1].file_name, "people.csv");
        assert_eq!(results[2].file_name, "far.pdf");

        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[test]
    fn test_search_respects_top_k() {
        let db = seeded_db();
        let results = db.search(&padded(&[0.9, 0.8, 0.7]), 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "name | age");
    }
}
