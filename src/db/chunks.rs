use super::{Db, IndexMeta, chunk_schema_sql, serialize_vector};
use crate::chunker::Chunk;
use rusqlite::{Result, Transaction, params};

impl Db {
    /// Replace the whole store with `chunks`, in one transaction.
    ///
    /// Tables are recreated so the vector width can change between builds.
    /// On any error the transaction rolls back and the previous contents
    /// remain.
    pub fn replace_all(
        &mut self,
        meta: &IndexMeta,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        assert_eq!(
            chunks.len(),
            embeddings.len(),
            "chunks and embeddings length mismatch"
        );

        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "DROP TABLE IF EXISTS vec_chunks;
             DROP TABLE IF EXISTS chunks;
             DELETE FROM index_meta;",
        )?;
        tx.execute_batch(&chunk_schema_sql(meta.dimensions))?;

        for (key, value) in [
            ("model", meta.model.clone()),
            ("dimensions", meta.dimensions.to_string()),
            ("built_at", meta.built_at.to_rfc3339()),
        ] {
            tx.execute(
                "INSERT INTO index_meta (key, value) VALUES (?, ?)",
                params![key, value],
            )?;
        }

        insert_chunks(&tx, chunks, embeddings)?;
        tx.commit()?;
        Ok(chunks.len())
    }

    /// Append `chunks` to an existing store, in one transaction.
    pub fn append(&mut self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<usize> {
        assert_eq!(
            chunks.len(),
            embeddings.len(),
            "chunks and embeddings length mismatch"
        );

        let tx = self.conn.transaction()?;
        insert_chunks(&tx, chunks, embeddings)?;
        tx.commit()?;
        Ok(chunks.len())
    }

    /// Number of stored chunks.
    pub fn count_chunks(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn insert_chunks(tx: &Transaction<'_>, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
    let mut insert_chunk = tx.prepare(
        "INSERT INTO chunks (file_name, position, content, metadata) VALUES (?, ?, ?, ?)",
    )?;
    let mut insert_vector = tx.prepare("INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)")?;

    for (chunk, embedding) in chunks.iter().zip(embeddings) {
        let metadata = serde_json::to_string(&chunk.metadata)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        insert_chunk.execute(params![
            chunk.file_name(),
            chunk.position as i64,
            chunk.text,
            metadata
        ])?;
        let chunk_id = tx.last_insert_rowid();

        insert_vector.execute(params![chunk_id, serialize_vector(embedding)])?;
    }
    Ok(())
}
