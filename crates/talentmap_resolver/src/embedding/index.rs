//! Pre-computed target-field embedding index.
//!
//! Each target field contributes one "context document" built from its
//! display name, description, example and aliases. The resulting matrix
//! is persisted to disk keyed by `(entity, schema hash, model id)` and
//! reloaded on later runs; a schema or model change produces a new key
//! and the stale file is simply never read again.
//!
//! The index is immutable after build, so concurrent reads need no lock.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use talentmap_schema::{EntityAliases, EntitySchema};

use super::{EmbedError, TextEmbedder};

const MAGIC: &[u8; 4] = b"TMEI";
const FORMAT_VERSION: u16 = 1;

/// Dense target-field embedding matrix for one entity.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    entity: String,
    model_id: String,
    dim: usize,
    fields: Vec<String>,
    /// Row-major `fields.len() x dim`, rows unit-norm.
    matrix: Vec<f32>,
}

impl EmbeddingIndex {
    /// Embed every field's context document.
    pub fn build(
        schema: &EntitySchema,
        aliases: &EntityAliases,
        embedder: &dyn TextEmbedder,
    ) -> Result<Self, EmbedError> {
        let documents: Vec<String> = schema
            .fields
            .iter()
            .map(|field| {
                let mut doc = format!("{} {}", field.name.replace('_', " "), field.display_name);
                if !field.description.is_empty() {
                    doc.push(' ');
                    doc.push_str(&field.description);
                }
                if !field.example.is_empty() {
                    doc.push_str(" example ");
                    doc.push_str(&field.example);
                }
                for alias in aliases.aliases_for(&field.name) {
                    doc.push(' ');
                    doc.push_str(alias);
                }
                doc
            })
            .collect();

        let vectors = embedder.embed(&documents)?;
        let dim = embedder.dim();
        let mut matrix = Vec::with_capacity(vectors.len() * dim);
        for (i, v) in vectors.iter().enumerate() {
            if v.len() != dim {
                return Err(EmbedError::Backend(format!(
                    "embedder returned {} dims for document {} (expected {})",
                    v.len(),
                    i,
                    dim
                )));
            }
            matrix.extend_from_slice(v);
        }

        Ok(Self {
            entity: schema.name.clone(),
            model_id: embedder.model_id().to_string(),
            dim,
            fields: schema.field_names().map(String::from).collect(),
            matrix,
        })
    }

    /// Cache file name for an entity/schema/model combination.
    pub fn cache_file_name(entity: &str, schema_hash: &str, model_id: &str) -> String {
        let hash_prefix = &schema_hash[..schema_hash.len().min(16)];
        format!("{}-{}-{}.bin", entity.to_lowercase(), hash_prefix, model_id)
    }

    /// Load the cached index if a matching file exists, otherwise build
    /// and persist. A failed persist is logged and otherwise ignored:
    /// the in-memory index is still good.
    pub fn load_or_build(
        cache_dir: &Path,
        schema_hash: &str,
        schema: &EntitySchema,
        aliases: &EntityAliases,
        embedder: &dyn TextEmbedder,
    ) -> Result<Self, EmbedError> {
        let path = cache_dir.join(Self::cache_file_name(
            &schema.name,
            schema_hash,
            embedder.model_id(),
        ));
        if path.exists() {
            match Self::read_from(&path) {
                Ok(index) if index.fields.len() == schema.fields.len() => {
                    tracing::debug!(entity = %schema.name, path = %path.display(), "loaded embedding index from cache");
                    return Ok(index);
                }
                Ok(_) => {
                    tracing::warn!(path = %path.display(), "cached embedding index is stale; rebuilding");
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "failed to read embedding cache; rebuilding");
                }
            }
        }

        let index = Self::build(schema, aliases, embedder)?;
        if let Err(err) = std::fs::create_dir_all(cache_dir)
            .map_err(EmbedError::from)
            .and_then(|_| index.write_to(&path))
        {
            tracing::warn!(path = %path.display(), %err, "failed to persist embedding index");
        }
        Ok(index)
    }

    /// Cosine similarity of a query string against every target field,
    /// clipped to [0, 1], sorted descending.
    pub fn query(
        &self,
        embedder: &dyn TextEmbedder,
        text: &str,
    ) -> Result<Vec<(String, f32)>, EmbedError> {
        Ok(self
            .query_batch(embedder, &[text.to_string()])?
            .pop()
            .unwrap_or_default())
    }

    /// Batch variant: one embed call, one pass over the matrix per query.
    pub fn query_batch(
        &self,
        embedder: &dyn TextEmbedder,
        texts: &[String],
    ) -> Result<Vec<Vec<(String, f32)>>, EmbedError> {
        if embedder.dim() != self.dim {
            return Err(EmbedError::Backend(format!(
                "embedder dim {} does not match index dim {}",
                embedder.dim(),
                self.dim
            )));
        }
        let queries = embedder.embed(texts)?;
        let mut results = Vec::with_capacity(queries.len());
        for q in &queries {
            let mut scored: Vec<(String, f32)> = self
                .fields
                .iter()
                .enumerate()
                .map(|(row, field)| {
                    let start = row * self.dim;
                    let dot: f32 = self.matrix[start..start + self.dim]
                        .iter()
                        .zip(q)
                        .map(|(a, b)| a * b)
                        .sum();
                    (field.clone(), dot.clamp(0.0, 1.0))
                })
                .collect();
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
            results.push(scored);
        }
        Ok(results)
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn write_to(&self, path: &Path) -> Result<(), EmbedError> {
        let staging: PathBuf = path.with_extension("bin.tmp");
        {
            let file = std::fs::File::create(&staging)?;
            let mut w = BufWriter::new(file);
            w.write_all(MAGIC)?;
            w.write_u16::<LittleEndian>(FORMAT_VERSION)?;
            write_str(&mut w, &self.entity)?;
            write_str(&mut w, &self.model_id)?;
            w.write_u32::<LittleEndian>(self.dim as u32)?;
            w.write_u32::<LittleEndian>(self.fields.len() as u32)?;
            for field in &self.fields {
                write_str(&mut w, field)?;
            }
            for value in &self.matrix {
                w.write_f32::<LittleEndian>(*value)?;
            }
            w.flush()?;
        }
        std::fs::rename(&staging, path)?;
        Ok(())
    }

    fn read_from(path: &Path) -> Result<Self, EmbedError> {
        let file = std::fs::File::open(path)?;
        let mut r = BufReader::new(file);
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(EmbedError::CorruptCache("bad magic".into()));
        }
        let version = r.read_u16::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(EmbedError::CorruptCache(format!(
                "unsupported format version {version}"
            )));
        }
        let entity = read_str(&mut r)?;
        let model_id = read_str(&mut r)?;
        let dim = r.read_u32::<LittleEndian>()? as usize;
        let n_fields = r.read_u32::<LittleEndian>()? as usize;
        let mut fields = Vec::with_capacity(n_fields);
        for _ in 0..n_fields {
            fields.push(read_str(&mut r)?);
        }
        let mut matrix = vec![0.0f32; n_fields * dim];
        for value in &mut matrix {
            *value = r.read_f32::<LittleEndian>()?;
        }
        Ok(Self {
            entity,
            model_id,
            dim,
            fields,
            matrix,
        })
    }
}

fn write_str<W: Write>(w: &mut W, s: &str) -> Result<(), EmbedError> {
    let bytes = s.as_bytes();
    w.write_u16::<LittleEndian>(bytes.len() as u16)?;
    w.write_all(bytes)?;
    Ok(())
}

fn read_str<R: Read>(r: &mut R) -> Result<String, EmbedError> {
    let len = r.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| EmbedError::CorruptCache(e.to_string()))
}
