//! Font registry.
//!
//! [`FontRegistry`] deduplicates fonts by path and by name, resolves
//! family/style/alias lookups and parses each font fully at most once.
//!
//! Registration performs a light scan that only learns the name, family
//! and style of a font. The full parse happens in [`FontRegistry::initialize`],
//! normally on first real use:
//!
//! ```ignore
//! use pdf_font_engine::{FontRegistry, FontStyle, RegisterOptions};
//!
//! let registry = FontRegistry::new();
//! registry.register_font("fonts/DejaVuSans.ttf", RegisterOptions::default())?;
//! let font = registry.get_font("DejaVu Sans", FontStyle::REGULAR)?;
//! let data = registry.initialize(&font)?;
//! let width = data.string_width("Hello", true);
//! ```
//!
//! The registry is an ordinary value. Share it between documents and
//! threads by reference or through an `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use indexmap::IndexMap;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::fonts::encoding::Encoding;
use crate::fonts::font_data::{type1_style, FontData, FontStyle};
use crate::fonts::metrics_xml::{decode_referenced_file, parse_metrics_xml, MetricsDocument};
use crate::fonts::reordering::Reordering;
use crate::fonts::truetype_parser::{collection_count, TrueTypeFont};
use crate::fonts::type1::{parse_afm, parse_pfm, pfb, Type1Font, Type1Metrics};

/// Produces the raw bytes of font and metrics files.
///
/// The registry reads every file through its loader, so fonts held
/// somewhere other than the file system (an archive, the platform font
/// service) can be registered by path.
pub trait FontLoader: Send + Sync {
    /// Read the whole file at `path`.
    fn load(&self, path: &Path) -> Result<Vec<u8>>;

    /// Whether `path` names a readable file.
    fn exists(&self, path: &Path) -> bool;
}

/// Reads fonts from the file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemLoader;

impl FontLoader for FileSystemLoader {
    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FontNotFound(path.display().to_string()),
            _ => Error::Io(e),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Options of a registration.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Alternative family name resolving to the font's family.
    pub alias: Option<String>,
    /// Member of a font collection (`.ttc`).
    pub collection_index: u32,
    /// Encoding name. A `glyf` TrueType font given an encoding becomes a
    /// simple 8-bit font; a Type1 font is re-encoded.
    pub encoding: Option<String>,
    /// Visual reordering applied to the text of Unicode fonts.
    pub reordering: Option<Arc<Reordering>>,
}

impl RegisterOptions {
    /// Options with an alias.
    pub fn with_alias(alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            ..Self::default()
        }
    }

    /// Set the encoding.
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Set the collection member.
    pub fn collection_index(mut self, index: u32) -> Self {
        self.collection_index = index;
        self
    }

    /// Set the reordering rules.
    pub fn reordering(mut self, reordering: Arc<Reordering>) -> Self {
        self.reordering = Some(reordering);
        self
    }
}

/// What a registered font is parsed from.
enum FontSource {
    Sfnt {
        data: Arc<Vec<u8>>,
        index: u32,
    },
    Type1 {
        program: Option<Arc<Vec<u8>>>,
        metrics: Option<Type1Metrics>,
    },
    Metrics {
        doc: MetricsDocument,
        /// Directory that file references are relative to.
        base: Option<PathBuf>,
    },
}

impl FontSource {
    fn describe(&self) -> &'static str {
        match self {
            FontSource::Sfnt { .. } => "sfnt",
            FontSource::Type1 { .. } => "Type1",
            FontSource::Metrics { .. } => "metrics document",
        }
    }
}

/// A registered font. Created by the registry, shared through [`Font`].
pub struct FontEntry {
    index: usize,
    name: String,
    family: String,
    style: FontStyle,
    path: Option<PathBuf>,
    source: FontSource,
    encoding: Option<String>,
    reordering: Option<Arc<Reordering>>,
    data: OnceLock<Arc<FontData>>,
    init_lock: Mutex<()>,
}

impl fmt::Debug for FontEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontEntry")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("family", &self.family)
            .field("style", &self.style)
            .field("path", &self.path)
            .field("source", &self.source.describe())
            .field("initialized", &self.data.get().is_some())
            .finish()
    }
}

/// Shared handle to a registered font.
///
/// Handles are cheap to clone. Every clone counts as one reference.
#[derive(Debug, Clone)]
pub struct Font(Arc<FontEntry>);

impl Font {
    /// Registration order, starting at 1.
    pub fn index(&self) -> usize {
        self.0.index
    }

    /// Page resource name, `F1`, `F2`, ...
    pub fn resource_name(&self) -> String {
        format!("F{}", self.0.index)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn family(&self) -> &str {
        &self.0.family
    }

    pub fn style(&self) -> FontStyle {
        self.0.style
    }

    /// File the font was registered from.
    pub fn path(&self) -> Option<&Path> {
        self.0.path.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.0.data.get().is_some()
    }

    /// Parsed font data, once initialized.
    pub fn data(&self) -> Option<Arc<FontData>> {
        self.0.data.get().cloned()
    }

    /// Number of live references, the registry's own included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Whether two handles refer to the same registered font.
    pub fn ptr_eq(&self, other: &Font) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Default)]
struct RegistryState {
    /// Lowercased font name to font, in registration order.
    fonts: IndexMap<String, Font>,
    /// Lowercased family to lowercased font names.
    families: HashMap<String, Vec<String>>,
    /// Lowercased alias to lowercased family.
    aliases: HashMap<String, String>,
    /// Registered file and collection member to lowercased font name.
    paths: HashMap<(PathBuf, u32), String>,
}

impl RegistryState {
    fn bind_alias(&mut self, alias: &str, family: &str) -> Result<()> {
        let alias = alias.to_lowercase();
        let family = family.to_lowercase();
        match self.aliases.get(&alias) {
            Some(bound) if *bound != family => Err(Error::AmbiguousFontAlias {
                alias,
                family: bound.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                self.aliases.insert(alias, family);
                Ok(())
            },
        }
    }

    fn check_alias(&self, alias: &str, family: &str) -> Result<()> {
        let alias = alias.to_lowercase();
        match self.aliases.get(&alias) {
            Some(bound) if *bound != family.to_lowercase() => Err(Error::AmbiguousFontAlias {
                alias,
                family: bound.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn variant(&self, family: &str, style: FontStyle) -> Option<Font> {
        self.families
            .get(family)?
            .iter()
            .filter_map(|name| self.fonts.get(name))
            .find(|font| font.style() == style)
            .cloned()
    }
}

/// Light registration-time description of a font.
struct Scanned {
    name: String,
    family: String,
    style: FontStyle,
    source: FontSource,
}

/// Registry of fonts shared by the documents of a process.
pub struct FontRegistry {
    config: EngineConfig,
    loader: Arc<dyn FontLoader>,
    state: Mutex<RegistryState>,
    parse_count: AtomicUsize,
}

impl fmt::Debug for FontRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontRegistry")
            .field("config", &self.config)
            .field("fonts", &self.font_names())
            .field("parse_count", &self.parse_count())
            .finish()
    }
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry {
    /// Create an empty registry reading from the file system.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an empty registry with the given configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_loader(config, Arc::new(FileSystemLoader))
    }

    /// Create an empty registry reading files through `loader`.
    pub fn with_loader(config: EngineConfig, loader: Arc<dyn FontLoader>) -> Self {
        Self {
            config,
            loader,
            state: Mutex::new(RegistryState::default()),
            parse_count: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // A panic while holding the lock leaves the maps consistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a font file.
    ///
    /// The kind is chosen by extension: `.ttf`, `.otf` and `.ttc` are sfnt
    /// fonts, `.pfb` and `.pfa` Type1 programs (metrics are taken from a
    /// sibling `.afm` or `.pfm` file), `.afm` and `.pfm` Type1 metrics (the
    /// program is taken from a sibling `.pfb` or `.pfa` file, if present)
    /// and `.xml` metric documents. Other files are recognized by signature.
    ///
    /// Registering a file or a font name a second time returns the handle
    /// of the first registration.
    pub fn register_font(&self, path: impl AsRef<Path>, options: RegisterOptions) -> Result<Font> {
        let path = path.as_ref();
        let key = (path.to_path_buf(), options.collection_index);
        if let Some(font) = self.registered_path(&key, &options)? {
            return Ok(font);
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let scanned = match extension.as_str() {
            "ttf" | "otf" | "ttc" => {
                let data = Arc::new(self.loader.load(path)?);
                scan_sfnt(data, options.collection_index, Some(path))?
            },
            "pfb" | "pfa" => {
                let program = self.loader.load(path)?;
                let metrics = self.sibling_metrics(path)?;
                scan_type1(Some(program), metrics, Some(path))?
            },
            "afm" | "pfm" => {
                let data = self.loader.load(path)?;
                let metrics = if extension == "afm" {
                    parse_afm(&String::from_utf8_lossy(&data))?
                } else {
                    parse_pfm(&data)?
                };
                let program = self.sibling_program(path)?;
                scan_type1(program, Some(metrics), Some(path))?
            },
            "xml" => {
                let data = self.loader.load(path)?;
                scan_metrics(&data, path.parent().map(Path::to_path_buf))?
            },
            _ => {
                let data = self.loader.load(path)?;
                self.scan_bytes(data, options.collection_index, Some(path))?
            },
        };
        self.insert(scanned, Some(key), options)
    }

    /// Register a font held in memory. The kind is recognized by signature.
    pub fn register_font_bytes(&self, data: Vec<u8>, options: RegisterOptions) -> Result<Font> {
        let scanned = self.scan_bytes(data, options.collection_index, None)?;
        self.insert(scanned, None, options)
    }

    /// Register a Type1 program with optional AFM or PFM metrics.
    pub fn register_type1_bytes(
        &self,
        program: Vec<u8>,
        metrics: Option<&[u8]>,
        options: RegisterOptions,
    ) -> Result<Font> {
        let metrics = metrics.map(parse_type1_metrics).transpose()?;
        let scanned = scan_type1(Some(program), metrics, None)?;
        self.insert(scanned, None, options)
    }

    /// Register every member of a font collection.
    pub fn register_font_collection(&self, path: impl AsRef<Path>) -> Result<Vec<Font>> {
        let path = path.as_ref();
        let data = Arc::new(self.loader.load(path)?);
        let count = collection_count(&data)?;
        log::debug!("Registering {} fonts of collection {}", count, path.display());

        let mut fonts = Vec::with_capacity(count as usize);
        for index in 0..count {
            let options = RegisterOptions::default().collection_index(index);
            let key = (path.to_path_buf(), index);
            if let Some(font) = self.registered_path(&key, &options)? {
                fonts.push(font);
                continue;
            }
            let scanned = scan_sfnt(Arc::clone(&data), index, Some(path))?;
            fonts.push(self.insert(scanned, Some(key), options)?);
        }
        Ok(fonts)
    }

    fn registered_path(
        &self,
        key: &(PathBuf, u32),
        options: &RegisterOptions,
    ) -> Result<Option<Font>> {
        let mut state = self.lock();
        let Some(name) = state.paths.get(key).cloned() else {
            return Ok(None);
        };
        let Some(font) = state.fonts.get(&name).cloned() else {
            return Ok(None);
        };
        if let Some(alias) = &options.alias {
            state.bind_alias(alias, font.family())?;
        }
        log::debug!("Font file {} already registered as '{}'", key.0.display(), font.name());
        Ok(Some(font))
    }

    fn insert(
        &self,
        scanned: Scanned,
        path_key: Option<(PathBuf, u32)>,
        options: RegisterOptions,
    ) -> Result<Font> {
        let key = scanned.name.to_lowercase();
        let family_key = scanned.family.to_lowercase();
        let mut state = self.lock();

        if let Some(font) = state.fonts.get(&key).cloned() {
            if let Some(alias) = &options.alias {
                state.bind_alias(alias, font.family())?;
            }
            if let Some(path_key) = path_key {
                state.paths.insert(path_key, key);
            }
            log::debug!("Font '{}' already registered", font.name());
            return Ok(font);
        }

        if let Some(alias) = &options.alias {
            state.check_alias(alias, &scanned.family)?;
        }

        let entry = FontEntry {
            index: state.fonts.len() + 1,
            name: scanned.name,
            family: scanned.family,
            style: scanned.style,
            path: path_key.as_ref().map(|(p, _)| p.clone()),
            source: scanned.source,
            encoding: options.encoding,
            reordering: options.reordering,
            data: OnceLock::new(),
            init_lock: Mutex::new(()),
        };
        let font = Font(Arc::new(entry));
        log::debug!(
            "Registered {} font '{}' (family '{}', {:?}) as {}",
            font.0.source.describe(),
            font.name(),
            font.family(),
            font.style(),
            font.resource_name()
        );

        if let Some(alias) = &options.alias {
            state.bind_alias(alias, &family_key)?;
        }
        state.families.entry(family_key).or_default().push(key.clone());
        if let Some(path_key) = path_key {
            state.paths.insert(path_key, key.clone());
        }
        state.fonts.insert(key, font.clone());
        Ok(font)
    }

    /// Find a font by family and style.
    ///
    /// The family is looked up as a family name, then as an alias of one,
    /// then as a font name.
    pub fn get_font(&self, family: &str, style: FontStyle) -> Result<Font> {
        let key = family.to_lowercase();
        let state = self.lock();
        if let Some(font) = state.variant(&key, style) {
            return Ok(font);
        }
        if let Some(font) = state.aliases.get(&key).and_then(|f| state.variant(f, style)) {
            return Ok(font);
        }
        if let Some(font) = state.fonts.get(&key) {
            return Ok(font.clone());
        }
        Err(Error::FontNotFound(format!("{} ({:?})", family, style)))
    }

    /// Find a font by its name.
    pub fn font_by_name(&self, name: &str) -> Option<Font> {
        self.lock().fonts.get(&name.to_lowercase()).cloned()
    }

    /// Names of the registered fonts, in registration order.
    pub fn font_names(&self) -> Vec<String> {
        self.lock().fonts.values().map(|f| f.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of full parses performed.
    pub fn parse_count(&self) -> usize {
        self.parse_count.load(Ordering::Relaxed)
    }

    /// Parse a registered font. The first call parses; later calls, from
    /// any thread, return the same data.
    pub fn initialize(&self, font: &Font) -> Result<Arc<FontData>> {
        if let Some(data) = font.0.data.get() {
            return Ok(Arc::clone(data));
        }
        let _guard = font.0.init_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(data) = font.0.data.get() {
            return Ok(Arc::clone(data));
        }

        let data = Arc::new(self.parse(&font.0)?);
        self.parse_count.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "Initialized font '{}' as {}",
            font.name(),
            data.kind().as_str()
        );
        Ok(Arc::clone(font.0.data.get_or_init(|| data)))
    }

    fn parse(&self, entry: &FontEntry) -> Result<FontData> {
        let encoding = entry
            .encoding
            .as_deref()
            .map(|name| Encoding::load(name, &self.config))
            .transpose()?;
        match &entry.source {
            FontSource::Sfnt { data, index } => FontData::from_sfnt(
                Arc::clone(data),
                *index,
                encoding,
                entry.reordering.clone(),
                &self.config,
            ),
            FontSource::Type1 { program, metrics } => {
                FontData::from_type1(program.clone(), metrics.as_ref(), encoding, &self.config)
            },
            FontSource::Metrics { doc, base } => {
                let file = doc.file.as_ref().filter(|f| !f.name.is_empty());
                let program = file
                    .map(|f| self.referenced_file(base.as_deref(), &f.name))
                    .transpose()?
                    .map(Arc::new);
                let ctg = file
                    .and_then(|f| f.ctg.as_deref())
                    .map(|name| self.referenced_file(base.as_deref(), name))
                    .transpose()?;
                FontData::from_metrics(doc.clone(), program, ctg.as_deref(), &self.config)
            },
        }
    }

    fn referenced_file(&self, base: Option<&Path>, name: &str) -> Result<Vec<u8>> {
        let path = match base {
            Some(base) => base.join(name),
            None => PathBuf::from(name),
        };
        let data = self.loader.load(&path)?;
        decode_referenced_file(&path, data)
    }

    fn sibling_metrics(&self, path: &Path) -> Result<Option<Type1Metrics>> {
        for extension in ["afm", "pfm"] {
            let sibling = path.with_extension(extension);
            if self.loader.exists(&sibling) {
                let data = self.loader.load(&sibling)?;
                return parse_type1_metrics(&data).map(Some);
            }
        }
        Ok(None)
    }

    fn sibling_program(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        for extension in ["pfb", "pfa"] {
            let sibling = path.with_extension(extension);
            if self.loader.exists(&sibling) {
                return self.loader.load(&sibling).map(Some);
            }
        }
        Ok(None)
    }

    fn scan_bytes(&self, data: Vec<u8>, index: u32, path: Option<&Path>) -> Result<Scanned> {
        if is_sfnt(&data) {
            return scan_sfnt(Arc::new(data), index, path);
        }
        if data.starts_with(b"%!") || pfb::is_pfb(&data) || pfb::mac_resource_fork(&data).is_some() {
            return scan_type1(Some(data), None, path);
        }
        if data.starts_with(b"StartFontMetrics") {
            let metrics = parse_afm(&String::from_utf8_lossy(&data))?;
            return scan_type1(None, Some(metrics), path);
        }
        let head = String::from_utf8_lossy(&data[..data.len().min(256)]).to_string();
        if head.trim_start().starts_with('<') {
            return scan_metrics(&data, path.and_then(Path::parent).map(Path::to_path_buf));
        }
        match parse_pfm(&data) {
            Ok(metrics) => scan_type1(None, Some(metrics), path),
            Err(_) => Err(Error::InvalidFontFile(format!(
                "unrecognized font data{}",
                path.map(|p| format!(" in {}", p.display())).unwrap_or_default()
            ))),
        }
    }
}

fn is_sfnt(data: &[u8]) -> bool {
    matches!(data.get(..4), Some(b"\x00\x01\x00\x00" | b"OTTO" | b"true" | b"ttcf"))
}

fn parse_type1_metrics(data: &[u8]) -> Result<Type1Metrics> {
    if data.starts_with(b"StartFontMetrics") {
        parse_afm(&String::from_utf8_lossy(data))
    } else {
        parse_pfm(data)
    }
}

fn file_stem(path: Option<&Path>) -> Option<String> {
    path.and_then(Path::file_stem).map(|s| s.to_string_lossy().to_string())
}

fn scan_sfnt(data: Arc<Vec<u8>>, index: u32, path: Option<&Path>) -> Result<Scanned> {
    let scan = TrueTypeFont::scan(&data, index)?;
    let name = scan
        .names
        .postscript
        .or(scan.names.full)
        .or_else(|| file_stem(path))
        .ok_or_else(|| Error::InvalidFontFile("sfnt font without a name".to_string()))?;
    let family = scan.names.family.unwrap_or_else(|| name.clone());
    Ok(Scanned {
        name,
        family,
        style: scan.style,
        source: FontSource::Sfnt { data, index },
    })
}

fn scan_type1(
    program: Option<Vec<u8>>,
    metrics: Option<Type1Metrics>,
    path: Option<&Path>,
) -> Result<Scanned> {
    let header = program.as_deref().map(Type1Font::scan).transpose()?;
    let name = metrics
        .as_ref()
        .and_then(|m| m.font_name.clone())
        .or_else(|| header.as_ref().map(|h| h.font_name.clone()))
        .filter(|n| !n.is_empty())
        .or_else(|| file_stem(path))
        .ok_or_else(|| Error::InvalidFontFile("Type1 font without a name".to_string()))?;
    let family = header
        .as_ref()
        .and_then(|h| h.family_name.clone())
        .or_else(|| metrics.as_ref().and_then(|m| m.family_name.clone()))
        .unwrap_or_else(|| name.clone());
    let weight = metrics
        .as_ref()
        .and_then(|m| m.weight.clone())
        .or_else(|| header.as_ref().and_then(|h| h.weight.clone()));
    let italic_angle = match (&metrics, &header) {
        (Some(m), _) => m.italic_angle,
        (None, Some(h)) => h.italic_angle,
        (None, None) => 0.0,
    };
    Ok(Scanned {
        style: type1_style(weight.as_deref(), &name, italic_angle),
        name,
        family,
        source: FontSource::Type1 {
            program: program.map(Arc::new),
            metrics,
        },
    })
}

fn scan_metrics(data: &[u8], base: Option<PathBuf>) -> Result<Scanned> {
    let doc = parse_metrics_xml(&String::from_utf8_lossy(data))?;
    Ok(Scanned {
        name: doc.font_name.clone(),
        family: doc.family().to_string(),
        style: doc.style(),
        source: FontSource::Metrics { doc, base },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::font_data::{FontKind, FontOps};
    use crate::fonts::truetype_parser::tests::TestFont;
    use crate::fonts::type1::tests::sample_font;

    #[derive(Default)]
    struct MemoryLoader {
        files: HashMap<PathBuf, Vec<u8>>,
        loads: AtomicUsize,
    }

    impl MemoryLoader {
        fn with(files: &[(&str, Vec<u8>)]) -> Self {
            Self {
                files: files.iter().map(|(p, d)| (PathBuf::from(p), d.clone())).collect(),
                loads: AtomicUsize::new(0),
            }
        }
    }

    impl FontLoader for MemoryLoader {
        fn load(&self, path: &Path) -> Result<Vec<u8>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| Error::FontNotFound(path.display().to_string()))
        }

        fn exists(&self, path: &Path) -> bool {
            self.files.contains_key(path)
        }
    }

    fn registry(files: &[(&str, Vec<u8>)]) -> (FontRegistry, Arc<MemoryLoader>) {
        let loader = Arc::new(MemoryLoader::with(files));
        let registry = FontRegistry::with_loader(EngineConfig::default(), loader.clone());
        (registry, loader)
    }

    #[test]
    fn test_register_is_idempotent_by_path() {
        let (registry, loader) = registry(&[("/fonts/test.ttf", TestFont::default().build())]);
        let a = registry.register_font("/fonts/test.ttf", RegisterOptions::default()).unwrap();
        let b = registry.register_font("/fonts/test.ttf", RegisterOptions::default()).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(a.ref_count(), 3);
        assert_eq!(registry.len(), 1);
        assert_eq!(a.resource_name(), "F1");
    }

    #[test]
    fn test_register_is_idempotent_by_name() {
        let font = TestFont::default().build();
        let (registry, _) = registry(&[("/a/test.ttf", font.clone()), ("/b/copy.ttf", font)]);
        let a = registry.register_font("/a/test.ttf", RegisterOptions::default()).unwrap();
        let b = registry.register_font("/b/copy.ttf", RegisterOptions::default()).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(registry.font_names(), vec!["TestSans-Regular".to_string()]);
    }

    #[test]
    fn test_initialize_parses_once() {
        let (registry, _) = registry(&[("/fonts/test.ttf", TestFont::default().build())]);
        let font = registry.register_font("/fonts/test.ttf", RegisterOptions::default()).unwrap();
        assert!(!font.is_initialized());
        assert_eq!(registry.parse_count(), 0);

        let first = registry.initialize(&font).unwrap();
        let second = registry.initialize(&font).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.parse_count(), 1);
        assert_eq!(first.kind(), FontKind::TrueTypeUnicode);
        assert!(font.is_initialized());
    }

    #[test]
    fn test_encoding_option_makes_simple_font() {
        let (registry, _) = registry(&[("/fonts/test.ttf", TestFont::default().build())]);
        let font = registry
            .register_font("/fonts/test.ttf", RegisterOptions::default().encoding("winansi"))
            .unwrap();
        let data = registry.initialize(&font).unwrap();
        assert_eq!(data.kind(), FontKind::TrueType);
    }

    #[test]
    fn test_lookup_by_family_alias_and_name() {
        let (registry, _) = registry(&[("/fonts/test.ttf", TestFont::default().build())]);
        registry
            .register_font("/fonts/test.ttf", RegisterOptions::with_alias("sans"))
            .unwrap();

        let by_family = registry.get_font("test sans", FontStyle::REGULAR).unwrap();
        let by_alias = registry.get_font("Sans", FontStyle::REGULAR).unwrap();
        let by_name = registry.get_font("TestSans-Regular", FontStyle::BOLD).unwrap();
        assert!(by_family.ptr_eq(&by_alias));
        assert!(by_family.ptr_eq(&by_name));
        assert!(registry.font_by_name("testsans-regular").is_some());

        assert!(matches!(
            registry.get_font("Test Sans", FontStyle::BOLD),
            Err(Error::FontNotFound(_))
        ));
    }

    #[test]
    fn test_alias_rebinding_is_rejected() {
        let (registry, _) = registry(&[
            ("/fonts/test.ttf", TestFont::default().build()),
            ("/fonts/serif.pfb", sample_font()),
        ]);
        registry
            .register_font("/fonts/test.ttf", RegisterOptions::with_alias("body"))
            .unwrap();
        let err = registry
            .register_font("/fonts/serif.pfb", RegisterOptions::with_alias("body"))
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousFontAlias { .. }));
        assert_eq!(registry.len(), 1);

        // Binding the same family again is fine
        registry
            .register_font("/fonts/test.ttf", RegisterOptions::with_alias("body"))
            .unwrap();
    }

    #[test]
    fn test_type1_with_sibling_metrics_missing() {
        let (registry, _) = registry(&[("/fonts/sample.pfb", sample_font())]);
        let font = registry.register_font("/fonts/sample.pfb", RegisterOptions::default()).unwrap();
        let data = registry.initialize(&font).unwrap();
        assert_eq!(data.kind(), FontKind::Type1);
        assert_eq!(data.string_width("A", false), 722.0);
    }

    #[test]
    fn test_missing_file() {
        let (registry, _) = registry(&[]);
        let err = registry.register_font("/fonts/none.ttf", RegisterOptions::default()).unwrap_err();
        assert!(matches!(err, Error::FontNotFound(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_bytes_by_signature() {
        let registry = FontRegistry::new();
        let sfnt = registry
            .register_font_bytes(TestFont::default().build(), RegisterOptions::default())
            .unwrap();
        let type1 = registry.register_font_bytes(sample_font(), RegisterOptions::default()).unwrap();
        assert_eq!(sfnt.index(), 1);
        assert_eq!(type1.index(), 2);
        assert_eq!(type1.resource_name(), "F2");

        let err = registry
            .register_font_bytes(b"GIF89a....".to_vec(), RegisterOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFontFile(_)));
    }

    #[test]
    fn test_type1_style() {
        assert_eq!(type1_style(Some("Bold"), "X", 0.0), FontStyle::BOLD);
        assert_eq!(type1_style(Some("Medium"), "X", -12.0), FontStyle::ITALIC);
        assert_eq!(
            type1_style(None, "Times-BoldItalic", 0.0),
            FontStyle::BOLD | FontStyle::ITALIC
        );
        assert_eq!(type1_style(Some("Roman"), "Times-Roman", 0.0), FontStyle::REGULAR);
    }

    #[test]
    fn test_registry_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FontRegistry>();
        assert_send_sync::<Font>();
    }
}
