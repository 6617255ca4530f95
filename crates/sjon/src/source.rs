//! Fetching model bytes.
//!
//! Decoders never open files themselves: they ask a [`ByteSource`] for the
//! bytes behind a URL, and it reports download progress as it goes. The
//! built-in [`FileSource`] understands plain paths, `file://` URLs and
//! base64 `data:` URIs. Hosts that fetch over a network install their own
//! source with [`ViewerBuilder::with_source`](crate::viewer::ViewerBuilder::with_source).

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::LoadError;

pub trait ByteSource: Send + Sync {
    /// Fetch the full payload at `url`, calling `progress` with fractions in
    /// \[0, 1\] as bytes arrive.
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(f32)) -> Result<Vec<u8>, LoadError>;
}

/// Reads local files in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct FileSource {
    chunk_size: usize,
}

impl FileSource {
    pub const DEFAULT_CHUNK: usize = 64 * 1024;

    pub fn new() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK,
        }
    }

    /// Smaller chunks mean more progress reports.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for FileSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves payloads registered up front, keyed by exact URL. Used for
/// embedded assets and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Arc<[u8]>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(url.into(), Arc::from(bytes.into()));
    }
}

impl ByteSource for MemorySource {
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(f32)) -> Result<Vec<u8>, LoadError> {
        let bytes = match decode_data_uri(url) {
            Some(decoded) => decoded?,
            None => self
                .files
                .get(url)
                .map(|bytes| bytes.to_vec())
                .ok_or_else(|| LoadError::network(url, "not found"))?,
        };
        progress(0.5);
        progress(1.0);
        Ok(bytes)
    }
}

/// Decode a base64 `data:` URI. Returns `None` if `url` is not one.
pub fn decode_data_uri(url: &str) -> Option<Result<Vec<u8>, LoadError>> {
    let rest = url.strip_prefix("data:")?;
    let Some((meta, payload)) = rest.split_once(',') else {
        return Some(Err(LoadError::decode(truncate(url), "data URI has no payload")));
    };
    if !meta.ends_with(";base64") {
        return Some(Ok(payload.as_bytes().to_vec()));
    }
    Some(
        BASE64
            .decode(payload.as_bytes())
            .map_err(|e| LoadError::decode(truncate(url), format!("base64: {e}"))),
    )
}

/// Keep error messages readable when the URL is a megabyte of base64.
fn truncate(url: &str) -> String {
    const MAX: usize = 64;
    match url.char_indices().nth(MAX) {
        Some((i, _)) => format!("{}…", &url[..i]),
        None => url.to_string(),
    }
}

/// Map `file://` URLs and bare paths to a filesystem path. Other schemes
/// return `None`.
pub fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    match url.split_once("://") {
        Some((scheme, _)) if scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') => {
            None
        }
        _ => Some(PathBuf::from(url)),
    }
}

/// Resolve `relative` against the directory of `base`. Absolute URLs, data
/// URIs and absolute paths pass through.
pub fn resolve_relative(base: &str, relative: &str) -> String {
    if relative.starts_with("data:") || relative.contains("://") || Path::new(relative).is_absolute()
    {
        return relative.to_string();
    }
    let base = base.split(['?', '#']).next().unwrap_or(base);
    match base.rfind('/') {
        Some(i) => format!("{}{}", &base[..=i], relative),
        None => relative.to_string(),
    }
}

impl ByteSource for FileSource {
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(f32)) -> Result<Vec<u8>, LoadError> {
        if let Some(decoded) = decode_data_uri(url) {
            let bytes = decoded?;
            progress(1.0);
            return Ok(bytes);
        }

        let path = local_path(url)
            .ok_or_else(|| LoadError::network(url, "no byte source installed for this scheme"))?;
        let mut file = File::open(&path).map_err(|e| LoadError::network(url, e.to_string()))?;
        let total = file.metadata().map(|m| m.len()).unwrap_or(0);

        let mut bytes = Vec::with_capacity(total as usize);
        let mut chunk = vec![0u8; self.chunk_size];
        loop {
            let n = file
                .read(&mut chunk)
                .map_err(|e| LoadError::network(url, e.to_string()))?;
            if n == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..n]);
            if total > 0 {
                progress((bytes.len() as f64 / total as f64).min(1.0) as f32);
            }
        }
        progress(1.0);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_round_trip() {
        let bytes = decode_data_uri("data:application/octet-stream;base64,AAEC")
            .unwrap()
            .unwrap();
        assert_eq!(bytes, vec![0, 1, 2]);
        assert!(decode_data_uri("model.glb").is_none());
        assert!(decode_data_uri("data:;base64,@@@").unwrap().is_err());
    }

    #[test]
    fn schemes_map_to_paths() {
        assert_eq!(local_path("file:///tmp/a.glb"), Some(PathBuf::from("/tmp/a.glb")));
        assert_eq!(local_path("models/a.glb"), Some(PathBuf::from("models/a.glb")));
        assert_eq!(local_path("https://cdn.example.com/a.glb"), None);
    }

    #[test]
    fn relative_resolution() {
        assert_eq!(resolve_relative("models/chair.gltf", "chair.bin"), "models/chair.bin");
        assert_eq!(
            resolve_relative("https://cdn.example.com/m/chair.gltf?v=2", "tex/wood.png"),
            "https://cdn.example.com/m/tex/wood.png"
        );
        assert_eq!(resolve_relative("chair.gltf", "chair.bin"), "chair.bin");
        assert_eq!(resolve_relative("a/b.gltf", "data:,x"), "data:,x");
    }

    #[test]
    fn file_fetch_reports_monotonic_progress() {
        let path = std::env::temp_dir().join(format!("sjon-source-{}.bin", std::process::id()));
        std::fs::write(&path, vec![7u8; 1000]).unwrap();

        let source = FileSource::with_chunk_size(300);
        let mut reports = Vec::new();
        let bytes = source
            .fetch(path.to_str().unwrap(), &mut |p| reports.push(p))
            .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(bytes.len(), 1000);
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(reports.last(), Some(&1.0));
    }

    #[test]
    fn network_urls_fail_without_a_source() {
        let err = FileSource::new()
            .fetch("https://cdn.example.com/a.glb", &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, LoadError::Network { .. }));

        let missing = FileSource::new()
            .fetch("/definitely/not/here.glb", &mut |_| {})
            .unwrap_err();
        assert!(matches!(missing, LoadError::Network { .. }));
    }

    #[test]
    fn memory_source_serves_registered_urls() {
        let source = MemorySource::new().with("cube.stl", b"solid".to_vec());
        let mut reports = Vec::new();
        assert_eq!(source.fetch("cube.stl", &mut |p| reports.push(p)).unwrap(), b"solid");
        assert_eq!(reports, [0.5, 1.0]);
        assert!(matches!(
            source.fetch("other.stl", &mut |_| {}),
            Err(LoadError::Network { .. })
        ));
    }
}
