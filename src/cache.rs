use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::{CuttingSpec, Pattern};

/// The structural parameters that determine which patterns are
/// geometrically feasible. Demands, bundle factors and the time budget are
/// deliberately excluded: they change the allocation, never the geometry.
#[derive(Serialize)]
struct FingerprintPayload<'a> {
    stock_length: f64,
    piece_lengths: &'a [f64],
    blade_width: f64,
}

/// Deterministic cache key for a spec's pattern geometry.
pub fn fingerprint(spec: &CuttingSpec) -> String {
    let lengths: Vec<f64> = spec.pieces.iter().map(|p| p.length).collect();
    let payload = FingerprintPayload {
        stock_length: spec.stock_length,
        piece_lengths: &lengths,
        blade_width: spec.blade_width,
    };
    let json = serde_json::to_vec(&payload).expect("fingerprint payload serializes");
    let digest = Sha256::digest(&json);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// On-disk pattern store, one JSON file per fingerprint. Reads are best
/// effort: a missing or corrupt entry is a miss, never an error. Writes go
/// through a temp file and an atomic rename, so readers never observe a
/// half-written entry.
pub struct PatternCache {
    dir: PathBuf,
}

impl PatternCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("patterns_{key}.json"))
    }

    pub fn load(&self, key: &str) -> Option<Vec<Pattern>> {
        let bytes = fs::read(self.entry_path(key)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn store(&self, key: &str, patterns: &[Pattern]) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(key);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec(patterns).map_err(std::io::Error::other)?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)
    }
}
