use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use unionx_core::{ColumnKey, Error, MinHashSignature, Result};
use crate::codec;

/// Read access to per-column sketches, keyed by column and sketch kind
pub trait SketchSource: Send + Sync {
    fn minhash(&self, key: &ColumnKey, ext: &str) -> Result<MinHashSignature>;
    fn vector(&self, key: &ColumnKey, ext: &str) -> Result<Vec<f64>>;
    fn cardinality(&self, key: &ColumnKey) -> Result<usize>;
}

/// Disk-backed sketches laid out as `{domain_dir}/{table_id}/{column}.{ext}`
#[derive(Debug, Clone)]
pub struct SketchStore {
    domain_dir: PathBuf,
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::MissingSketch(path.to_path_buf()),
        _ => Error::Io(e),
    })
}

fn malformed(path: &Path, reason: impl Into<String>) -> Error {
    Error::MalformedSketch {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

impl SketchStore {
    pub fn new<P: AsRef<Path>>(domain_dir: P) -> Self {
        Self {
            domain_dir: domain_dir.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn domain_dir(&self) -> &Path {
        &self.domain_dir
    }

    /// File holding sketch `ext` of `key`
    pub fn path(&self, key: &ColumnKey, ext: &str) -> PathBuf {
        self.domain_dir
            .join(&key.table_id)
            .join(format!("{}.{}", key.column_index, ext))
    }

    /// Recover the column key from a sketch path. The table id is the
    /// parent directory relative to the domain directory and may span
    /// several path components.
    pub fn parse_path(&self, path: &Path) -> Result<ColumnKey> {
        let bad = || Error::MalformedColumnKey(path.display().to_string());
        let relative = path.strip_prefix(&self.domain_dir).map_err(|_| bad())?;
        let table = relative.parent().ok_or_else(bad)?;
        let table_id = table
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(bad)?
            .join("/");
        if table_id.is_empty() {
            return Err(bad());
        }
        let column = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(bad)?;
        ColumnKey::new(table_id, column)
    }

    pub fn read_minhash(&self, path: &Path) -> Result<MinHashSignature> {
        let data = read_file(path)?;
        let values = codec::decode_u64s(&data)
            .ok_or_else(|| malformed(path, format!("{} bytes is not a whole number of u64 values", data.len())))?;
        if values.is_empty() {
            return Err(malformed(path, "empty signature"));
        }
        Ok(MinHashSignature::new(values))
    }

    pub fn read_vector(&self, path: &Path) -> Result<Vec<f64>> {
        let data = read_file(path)?;
        let values = codec::decode_f64s(&data)
            .ok_or_else(|| malformed(path, format!("{} bytes is not a whole number of f64 values", data.len())))?;
        if values.is_empty() {
            return Err(malformed(path, "empty vector"));
        }
        Ok(values)
    }

    /// Cardinality is the integer on the first line of the file
    pub fn read_cardinality(&self, path: &Path) -> Result<usize> {
        let file = fs::File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::MissingSketch(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        let mut line = String::new();
        BufReader::new(file).read_line(&mut line)?;
        line.trim()
            .parse::<usize>()
            .map_err(|_| malformed(path, format!("invalid cardinality {:?}", line.trim())))
    }

    pub fn write_minhash(&self, key: &ColumnKey, ext: &str, sig: &MinHashSignature) -> Result<PathBuf> {
        self.write(key, ext, &codec::encode_u64s(sig.values()))
    }

    pub fn write_vector(&self, key: &ColumnKey, ext: &str, vector: &[f64]) -> Result<PathBuf> {
        self.write(key, ext, &codec::encode_f64s(vector))
    }

    pub fn write_cardinality(&self, key: &ColumnKey, cardinality: usize) -> Result<PathBuf> {
        self.write(key, crate::ext::CARDINALITY, format!("{}\n", cardinality).as_bytes())
    }

    fn write(&self, key: &ColumnKey, ext: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.path(key, ext);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        Ok(path)
    }

    /// Every sketch file with extension `ext` under the domain directory,
    /// sorted by key. Files whose path does not parse as a column key are
    /// skipped with a warning.
    pub fn scan(&self, ext: &str) -> Result<Vec<(ColumnKey, PathBuf)>> {
        let mut found = Vec::new();
        let mut pending = vec![self.domain_dir.clone()];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                    continue;
                }
                match self.parse_path(&path) {
                    Ok(key) => found.push((key, path)),
                    Err(e) => warn!("skipping {}: {}", path.display(), e),
                }
            }
        }
        found.sort();
        debug!("found {} {} sketches under {}", found.len(), ext, self.domain_dir.display());
        Ok(found)
    }

    /// Sketches with extension `ext` of one table, ordered by column index
    pub fn table_columns(&self, table_id: &str, ext: &str) -> Result<Vec<(ColumnKey, PathBuf)>> {
        let dir = self.domain_dir.join(table_id);
        let mut found = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ext) {
                match self.parse_path(&path) {
                    Ok(key) => found.push((key, path)),
                    Err(e) => warn!("skipping {}: {}", path.display(), e),
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

impl SketchSource for SketchStore {
    fn minhash(&self, key: &ColumnKey, ext: &str) -> Result<MinHashSignature> {
        self.read_minhash(&self.path(key, ext))
    }

    fn vector(&self, key: &ColumnKey, ext: &str) -> Result<Vec<f64>> {
        self.read_vector(&self.path(key, ext))
    }

    fn cardinality(&self, key: &ColumnKey) -> Result<usize> {
        self.read_cardinality(&self.path(key, crate::ext::CARDINALITY))
    }
}
