//! # Loader — Format Detection and Decoder Dispatch
//!
//! Picking a decoder is a pure function of the URL:
//!
//! ```text
//!  "https://cdn/x/Chair.GLB?v=3#top"
//!        strip ?query / #fragment ─▶ "https://cdn/x/Chair.GLB"
//!        last path segment        ─▶ "Chair.GLB"
//!        lowercase final suffix   ─▶ ".glb"  ─▶ DecoderKind::Gltf
//! ```
//!
//! Only the fixed set in [`KNOWN_EXTENSIONS`] is recognized. A last segment
//! with no dot at all (`/assets/3f9a0c`) is treated as glTF, which is what
//! CDNs serving hashed names usually deliver. A dotted but unknown suffix
//! (`model.dwg`) is an unsupported format.
//!
//! The [`DecoderRegistry`] builds decoders on first use and keeps them for
//! its lifetime. [`DecoderRegistry::shared`] is the process-wide instance
//! viewers use unless given their own.
//!
//! ## Decoders
//!
//! | Kind    | Extensions       | Module |
//! |---------|------------------|--------|
//! | Gltf    | `.glb` `.gltf`   | [`gltf`] (feature `gltf`) |
//! | Obj     | `.obj` (+ MTL)   | [`obj`] |
//! | Stl     | `.stl`           | [`stl`] |
//! | ThreeDs | `.3ds`           | [`tds`] |
//! | Amf     | `.amf`           | [`amf`] (feature `amf`) |
//! | Fbx     | `.fbx`           | none built in; [`register`](DecoderRegistry::register) one |
//! | Ifc     | `.ifc`           | none built in; register one |

#[cfg(feature = "amf")]
pub mod amf;
#[cfg(feature = "gltf")]
pub mod gltf;
pub mod obj;
pub mod stl;
pub mod tds;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use log::debug;

use crate::animation::AnimationClip;
use crate::error::{LoadError, RegistryError};
use crate::math::Vec3;
use crate::scene::{Node, Texture};
use crate::source::ByteSource;

/// Extensions the dispatcher recognizes, lowercase with the leading dot.
pub const KNOWN_EXTENSIONS: [&str; 8] = [
    ".glb", ".gltf", ".obj", ".stl", ".fbx", ".3ds", ".amf", ".ifc",
];

/// Default decoder for extensionless URLs.
const FALLBACK_EXTENSION: &str = ".glb";

/// The final path segment of `url`, ignoring query and fragment.
fn last_segment(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// The recognized extension of `url`, if any.
pub fn detect_extension(url: &str) -> Option<&'static str> {
    let segment = last_segment(url);
    let dot = segment.rfind('.')?;
    let suffix = segment[dot..].to_ascii_lowercase();
    KNOWN_EXTENSIONS.iter().copied().find(|ext| *ext == suffix)
}

/// The decoder family for a recognized extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderKind {
    Gltf,
    Obj,
    Stl,
    Fbx,
    ThreeDs,
    Amf,
    Ifc,
}

impl DecoderKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            ".glb" | ".gltf" => Some(Self::Gltf),
            ".obj" => Some(Self::Obj),
            ".stl" => Some(Self::Stl),
            ".fbx" => Some(Self::Fbx),
            ".3ds" => Some(Self::ThreeDs),
            ".amf" => Some(Self::Amf),
            ".ifc" => Some(Self::Ifc),
            _ => None,
        }
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Gltf => &[".glb", ".gltf"],
            Self::Obj => &[".obj"],
            Self::Stl => &[".stl"],
            Self::Fbx => &[".fbx"],
            Self::ThreeDs => &[".3ds"],
            Self::Amf => &[".amf"],
            Self::Ifc => &[".ifc"],
        }
    }

    /// Construct the built-in decoder, if this build has one.
    fn builtin(self) -> Option<Arc<dyn FormatLoader>> {
        match self {
            #[cfg(feature = "gltf")]
            Self::Gltf => Some(Arc::new(gltf::GltfLoader)),
            Self::Obj => Some(Arc::new(obj::ObjLoader)),
            Self::Stl => Some(Arc::new(stl::StlLoader)),
            Self::ThreeDs => Some(Arc::new(tds::TdsLoader)),
            #[cfg(feature = "amf")]
            Self::Amf => Some(Arc::new(amf::AmfLoader)),
            _ => None,
        }
    }

    fn has_builtin(self) -> bool {
        match self {
            Self::Gltf => cfg!(feature = "gltf"),
            Self::Amf => cfg!(feature = "amf"),
            Self::Fbx | Self::Ifc => false,
            Self::Obj | Self::Stl | Self::ThreeDs => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder capability
// ---------------------------------------------------------------------------

/// Everything a decoder needs for one load.
#[derive(Clone)]
pub struct LoadRequest {
    pub url: String,
    /// Material library for OBJ.
    pub mtl_url: Option<String>,
    pub draco: bool,
    pub draco_decoder_path: Option<String>,
    pub source: Arc<dyn ByteSource>,
}

impl LoadRequest {
    pub fn new(url: impl Into<String>, source: Arc<dyn ByteSource>) -> Self {
        Self {
            url: url.into(),
            mtl_url: None,
            draco: true,
            draco_decoder_path: None,
            source,
        }
    }

    /// Fetch the main payload.
    pub fn fetch_main(&self, progress: &mut dyn FnMut(f32)) -> Result<Vec<u8>, LoadError> {
        self.source.fetch(&self.url, progress)
    }

    /// Fetch a resource referenced by the main payload, relative to it.
    pub fn fetch_related(&self, uri: &str) -> Result<Vec<u8>, LoadError> {
        let url = crate::source::resolve_relative(&self.url, uri);
        self.source.fetch(&url, &mut |_| {})
    }
}

impl std::fmt::Debug for LoadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadRequest")
            .field("url", &self.url)
            .field("mtl_url", &self.mtl_url)
            .field("draco", &self.draco)
            .finish_non_exhaustive()
    }
}

/// A decoded model: an attachable root and its animation clips.
#[derive(Debug)]
pub struct LoadedModel {
    pub root: Node,
    pub animations: Vec<AnimationClip>,
}

impl LoadedModel {
    pub fn new(root: Node) -> Self {
        Self {
            root,
            animations: Vec::new(),
        }
    }
}

/// Turns fetched bytes into a scene subtree.
///
/// Decoders run off the viewer thread, so they must be `Send + Sync`. They
/// have no way to be cancelled: a superseded load runs to completion and the
/// viewer discards the result.
pub trait FormatLoader: Send + Sync {
    /// Extensions this decoder handles, lowercase with the leading dot.
    fn extensions(&self) -> &[&'static str];

    fn load(
        &self,
        request: &LoadRequest,
        progress: &mut dyn FnMut(f32),
    ) -> Result<LoadedModel, LoadError>;
}

/// Area-weighted vertex normals for an indexed triangle list.
pub(crate) fn smooth_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a.max(b).max(c) >= positions.len() {
            continue;
        }
        let n = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += n;
        normals[b] += n;
        normals[c] += n;
    }
    normals
        .into_iter()
        .map(|n| n.normalize_or(Vec3::Y))
        .collect()
}

/// Decode an image payload into a texture.
pub(crate) fn decode_texture(url: &str, bytes: &[u8]) -> Result<Texture, LoadError> {
    image::load_from_memory(bytes)
        .map(|image| Texture::from_image(&image))
        .map_err(|e| LoadError::decode(url, e.to_string()))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

static SHARED: LazyLock<Arc<DecoderRegistry>> = LazyLock::new(|| Arc::new(DecoderRegistry::new()));

/// Resolves URLs to decoders, constructing built-ins lazily.
#[derive(Default)]
pub struct DecoderRegistry {
    /// Decoder per extension, filled on first resolve or by registration.
    cache: Mutex<HashMap<&'static str, Arc<dyn FormatLoader>>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn shared() -> Arc<DecoderRegistry> {
        SHARED.clone()
    }

    fn is_covered(&self, cache: &HashMap<&'static str, Arc<dyn FormatLoader>>, ext: &str) -> bool {
        cache.contains_key(ext) || DecoderKind::from_extension(ext).is_some_and(DecoderKind::has_builtin)
    }

    /// Add a decoder. Every extension it declares must be recognized and not
    /// yet covered by any decoder; nothing is inserted otherwise.
    pub fn register(&self, loader: Arc<dyn FormatLoader>) -> Result<(), RegistryError> {
        let extensions = loader.extensions();
        if extensions.is_empty() {
            return Err(RegistryError::NoExtensions);
        }
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let mut seen = Vec::new();
        for ext in extensions {
            let Some(known) = KNOWN_EXTENSIONS.iter().copied().find(|k| k == ext) else {
                return Err(RegistryError::UnknownExtension {
                    extension: ext.to_string(),
                });
            };
            if self.is_covered(&cache, known) || seen.contains(&known) {
                return Err(RegistryError::DuplicateExtension {
                    extension: known.to_string(),
                });
            }
            seen.push(known);
        }
        for ext in seen {
            debug!("registered decoder for {ext}");
            cache.insert(ext, loader.clone());
        }
        Ok(())
    }

    /// The decoder for `url`.
    pub fn resolve(&self, url: &str) -> Result<Arc<dyn FormatLoader>, LoadError> {
        let ext = match detect_extension(url) {
            Some(ext) => ext,
            None if !last_segment(url).contains('.') => FALLBACK_EXTENSION,
            None => return Err(unsupported(url)),
        };

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(loader) = cache.get(ext) {
            return Ok(loader.clone());
        }
        let kind = DecoderKind::from_extension(ext).ok_or_else(|| unsupported(url))?;
        let loader = kind.builtin().ok_or_else(|| unsupported(url))?;
        debug!("constructed {kind:?} decoder");
        for shared_ext in kind.extensions() {
            cache.entry(shared_ext).or_insert_with(|| loader.clone());
        }
        Ok(loader)
    }

    /// Whether a decoder for `ext` has been constructed or registered.
    pub fn is_cached(&self, ext: &str) -> bool {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(ext)
    }
}

fn unsupported(url: &str) -> LoadError {
    LoadError::UnsupportedFormat {
        url: url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeFbx;

    impl FormatLoader for FakeFbx {
        fn extensions(&self) -> &[&'static str] {
            &[".fbx"]
        }

        fn load(&self, _: &LoadRequest, _: &mut dyn FnMut(f32)) -> Result<LoadedModel, LoadError> {
            Ok(LoadedModel::new(Node::new("fbx")))
        }
    }

    struct Greedy;

    impl FormatLoader for Greedy {
        fn extensions(&self) -> &[&'static str] {
            &[".fbx", ".stl"]
        }

        fn load(&self, _: &LoadRequest, _: &mut dyn FnMut(f32)) -> Result<LoadedModel, LoadError> {
            Ok(LoadedModel::new(Node::new("greedy")))
        }
    }

    #[test]
    fn detect_ignores_query_and_fragment() {
        assert_eq!(detect_extension("a.glb?x=1#y"), Some(".glb"));
        assert_eq!(detect_extension("a.glb"), Some(".glb"));
        assert_eq!(detect_extension("a.glb#y"), Some(".glb"));
        assert_eq!(detect_extension("https://cdn.example.com/m/a.obj?sig=a.b"), Some(".obj"));
    }

    #[test]
    fn detect_is_case_insensitive() {
        assert_eq!(detect_extension("A.GLB"), detect_extension("a.glb"));
        assert_eq!(detect_extension("Ship.3DS"), Some(".3ds"));
    }

    #[test]
    fn detect_rejects_unknown_and_missing() {
        assert_eq!(detect_extension("model.dwg"), None);
        assert_eq!(detect_extension("https://cdn.example.com/assets/3f9a0c"), None);
        assert_eq!(detect_extension("dir.v2/model"), None);
    }

    #[test]
    fn extensionless_urls_fall_back_to_gltf() {
        let registry = DecoderRegistry::new();
        if cfg!(feature = "gltf") {
            assert!(registry.resolve("https://cdn.example.com/assets/3f9a0c").is_ok());
            assert!(registry.is_cached(".glb"));
            assert!(registry.is_cached(".gltf"));
        }
        let err = registry.resolve("model.dwg").err().unwrap();
        assert!(err.is_unsupported_format());
        assert_eq!(err.to_string(), "Unsupported model format: model.dwg");
    }

    #[test]
    fn decoders_are_cached() {
        let registry = DecoderRegistry::new();
        assert!(!registry.is_cached(".stl"));
        let a = registry.resolve("a.stl").unwrap();
        let b = registry.resolve("b.STL").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn fbx_needs_registration() {
        let registry = DecoderRegistry::new();
        assert!(registry.resolve("rig.fbx").err().unwrap().is_unsupported_format());
        registry.register(Arc::new(FakeFbx)).unwrap();
        assert!(registry.resolve("rig.fbx").is_ok());
        assert_eq!(
            registry.register(Arc::new(FakeFbx)),
            Err(RegistryError::DuplicateExtension {
                extension: ".fbx".into()
            })
        );
    }

    #[test]
    fn ifc_is_recognized_but_not_built_in() {
        assert_eq!(detect_extension("Tower.IFC"), Some(".ifc"));
        let registry = DecoderRegistry::new();
        assert!(registry.resolve("tower.ifc").err().unwrap().is_unsupported_format());
    }

    #[test]
    fn overlapping_registration_inserts_nothing() {
        let registry = DecoderRegistry::new();
        assert!(matches!(
            registry.register(Arc::new(Greedy)),
            Err(RegistryError::DuplicateExtension { .. })
        ));
        assert!(!registry.is_cached(".fbx"));
        assert!(registry.resolve("rig.fbx").is_err());
    }
}
