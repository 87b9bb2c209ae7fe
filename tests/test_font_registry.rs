//! Integration tests for the font registry.
//!
//! These tests verify:
//! - Idempotent registration by path and by name
//! - Lazy, once-only initialization across threads
//! - Family, alias and name lookups
//! - Dispatch by extension for sfnt, Type1 and collection files

mod common;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::{afm, collection, init_logging, t1_glyph, type1_font, SfntBuilder};
use pdf_font_engine::{
    EngineConfig, Error, FileSystemLoader, FontKind, FontLoader, FontOps, FontRegistry,
    FontStyle, RegisterOptions, Result,
};

/// Loader that serves files from memory and counts reads per path.
#[derive(Default)]
struct CountingLoader {
    files: HashMap<PathBuf, Vec<u8>>,
    reads: Mutex<HashMap<PathBuf, usize>>,
    total: AtomicUsize,
}

impl CountingLoader {
    fn new(files: Vec<(&str, Vec<u8>)>) -> Self {
        Self {
            files: files.into_iter().map(|(p, d)| (PathBuf::from(p), d)).collect(),
            ..Self::default()
        }
    }

    fn reads_of(&self, path: &str) -> usize {
        self.reads.lock().unwrap().get(Path::new(path)).copied().unwrap_or(0)
    }
}

impl FontLoader for CountingLoader {
    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.reads.lock().unwrap().entry(path.to_path_buf()).or_default() += 1;
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::FontNotFound(path.display().to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

fn sans() -> Vec<u8> {
    SfntBuilder::new("Test Sans", "TestSans-Regular").build()
}

fn sans_bold() -> Vec<u8> {
    SfntBuilder::new("Test Sans", "TestSans-Bold").bold().build()
}

fn serif() -> Vec<u8> {
    type1_font(
        "TestSerif-Roman",
        "Test Serif",
        &[
            (".notdef", t1_glyph(500)),
            ("space", t1_glyph(250)),
            ("A", t1_glyph(650)),
            ("B", t1_glyph(700)),
        ],
        &[],
    )
}

fn serif_afm() -> String {
    afm(
        "TestSerif-Roman",
        "Test Serif",
        "Roman",
        &[(32, 260, "space"), (65, 660, "A"), (66, 710, "B")],
        &[("A", "B", -40)],
    )
}

fn counting_registry(files: Vec<(&str, Vec<u8>)>) -> (Arc<FontRegistry>, Arc<CountingLoader>) {
    init_logging();
    let loader = Arc::new(CountingLoader::new(files));
    let registry = FontRegistry::with_loader(EngineConfig::default(), loader.clone());
    (Arc::new(registry), loader)
}

#[test]
fn test_same_path_twice_returns_same_handle_without_reparsing() {
    let (registry, loader) = counting_registry(vec![("/fonts/sans.ttf", sans())]);

    let first = registry.register_font("/fonts/sans.ttf", RegisterOptions::default()).unwrap();
    assert_eq!(first.ref_count(), 2);

    let second = registry.register_font("/fonts/sans.ttf", RegisterOptions::default()).unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(first.ref_count(), 3);
    assert_eq!(loader.reads_of("/fonts/sans.ttf"), 1);

    registry.initialize(&first).unwrap();
    registry.initialize(&second).unwrap();
    assert_eq!(registry.parse_count(), 1);

    drop(second);
    assert_eq!(first.ref_count(), 2);
}

#[test]
fn test_concurrent_initialization_parses_once() {
    let (registry, _) = counting_registry(vec![("/fonts/sans.ttf", sans())]);
    let font = registry.register_font("/fonts/sans.ttf", RegisterOptions::default()).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let font = font.clone();
            std::thread::spawn(move || registry.initialize(&font).unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(registry.parse_count(), 1);
    for data in &results {
        assert!(Arc::ptr_eq(data, &results[0]));
    }
    assert!(font.is_initialized());
}

#[test]
fn test_concurrent_registration_of_different_fonts() {
    let (registry, _) = counting_registry(vec![
        ("/fonts/sans.ttf", sans()),
        ("/fonts/sans-bold.ttf", sans_bold()),
    ]);

    let paths = ["/fonts/sans.ttf", "/fonts/sans-bold.ttf", "/fonts/sans.ttf", "/fonts/sans-bold.ttf"];
    let handles: Vec<_> = paths
        .iter()
        .map(|&path| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let font = registry.register_font(path, RegisterOptions::default()).unwrap();
                registry.initialize(&font).unwrap();
                font
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.parse_count(), 2);
    let mut indices: Vec<usize> = registry
        .font_names()
        .iter()
        .map(|name| registry.font_by_name(name).unwrap().index())
        .collect();
    indices.sort();
    assert_eq!(indices, vec![1, 2]);
}

#[test]
fn test_family_style_and_alias_lookup() {
    let (registry, _) = counting_registry(vec![
        ("/fonts/sans.ttf", sans()),
        ("/fonts/sans-bold.ttf", sans_bold()),
    ]);
    registry
        .register_font("/fonts/sans.ttf", RegisterOptions::with_alias("Helvetica"))
        .unwrap();
    registry.register_font("/fonts/sans-bold.ttf", RegisterOptions::default()).unwrap();

    let regular = registry.get_font("Test Sans", FontStyle::REGULAR).unwrap();
    let bold = registry.get_font("test sans", FontStyle::BOLD).unwrap();
    assert_eq!(regular.name(), "TestSans-Regular");
    assert_eq!(bold.name(), "TestSans-Bold");
    assert_eq!(bold.resource_name(), "F2");

    let via_alias = registry.get_font("helvetica", FontStyle::BOLD).unwrap();
    assert!(via_alias.ptr_eq(&bold));

    let err = registry.get_font("Courier", FontStyle::REGULAR).unwrap_err();
    assert!(matches!(err, Error::FontNotFound(_)));
}

#[test]
fn test_alias_cannot_move_to_another_family() {
    let (registry, _) = counting_registry(vec![
        ("/fonts/sans.ttf", sans()),
        ("/fonts/serif.pfb", serif()),
    ]);
    registry
        .register_font("/fonts/sans.ttf", RegisterOptions::with_alias("body"))
        .unwrap();
    let err = registry
        .register_font("/fonts/serif.pfb", RegisterOptions::with_alias("body"))
        .unwrap_err();
    match err {
        Error::AmbiguousFontAlias { alias, family } => {
            assert_eq!(alias, "body");
            assert_eq!(family, "test sans");
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_type1_program_picks_up_sibling_afm() {
    let (registry, loader) = counting_registry(vec![
        ("/fonts/serif.pfb", serif()),
        ("/fonts/serif.afm", serif_afm().into_bytes()),
    ]);
    let font = registry.register_font("/fonts/serif.pfb", RegisterOptions::default()).unwrap();
    assert_eq!(loader.reads_of("/fonts/serif.afm"), 1);
    assert_eq!(font.family(), "Test Serif");

    let data = registry.initialize(&font).unwrap();
    assert_eq!(data.kind(), FontKind::Type1);
    assert!(data.embed_supported());
    assert_eq!(data.string_width("AB", false), 1370.0);
    assert_eq!(data.string_width("AB", true), 1330.0);
}

#[test]
fn test_afm_without_program_is_metrics_only() {
    let (registry, _) = counting_registry(vec![("/fonts/serif.afm", serif_afm().into_bytes())]);
    let font = registry.register_font("/fonts/serif.afm", RegisterOptions::default()).unwrap();
    let data = registry.initialize(&font).unwrap();
    assert_eq!(data.name(), "TestSerif-Roman");
    assert!(!data.embed_supported());
    assert_eq!(data.write_font_program(None).unwrap().map(|p| p.data.len()), None);
    assert_eq!(data.string_width(" A", false), 920.0);
}

#[test]
fn test_type1_bytes_with_metrics() {
    init_logging();
    let registry = FontRegistry::new();
    let afm = serif_afm();
    let font = registry
        .register_type1_bytes(serif(), Some(afm.as_bytes()), RegisterOptions::default())
        .unwrap();
    let again = registry.register_type1_bytes(serif(), None, RegisterOptions::default()).unwrap();
    assert!(font.ptr_eq(&again));

    let data = registry.initialize(&font).unwrap();
    assert_eq!(data.string_width("B", false), 710.0);
}

#[test]
fn test_collection_members() {
    let ttc = collection(&[
        SfntBuilder::new("Test Sans", "TestSans-Regular"),
        SfntBuilder::new("Test Sans", "TestSans-Bold").bold(),
    ]);
    let (registry, loader) = counting_registry(vec![("/fonts/family.ttc", ttc)]);

    let fonts = registry.register_font_collection("/fonts/family.ttc").unwrap();
    assert_eq!(fonts.len(), 2);
    assert_eq!(loader.reads_of("/fonts/family.ttc"), 1);
    assert_eq!(fonts[1].name(), "TestSans-Bold");
    assert_eq!(fonts[1].style(), FontStyle::BOLD);

    let member = registry
        .register_font("/fonts/family.ttc", RegisterOptions::default().collection_index(1))
        .unwrap();
    assert!(member.ptr_eq(&fonts[1]));

    let data = registry.initialize(&member).unwrap();
    assert_eq!(data.name(), "TestSans-Bold");
    let program = data.write_font_program(None).unwrap().unwrap();
    assert_eq!(&program.data[..4], &[0, 1, 0, 0]);
    assert_eq!(program.length1, program.data.len());
}

#[test]
fn test_collection_index_out_of_range() {
    let ttc = collection(&[SfntBuilder::new("Test Sans", "TestSans-Regular")]);
    let (registry, _) = counting_registry(vec![("/fonts/family.ttc", ttc)]);
    let err = registry
        .register_font("/fonts/family.ttc", RegisterOptions::default().collection_index(3))
        .unwrap_err();
    assert!(matches!(err, Error::FontIndexOutOfRange { index: 3, count: 1 }));
}

#[test]
fn test_malformed_font_fails_only_its_registration() {
    let (registry, _) = counting_registry(vec![
        ("/fonts/broken.ttf", b"\x00\x01\x00\x00garbage".to_vec()),
        ("/fonts/sans.ttf", sans()),
    ]);
    assert!(registry.register_font("/fonts/broken.ttf", RegisterOptions::default()).is_err());
    assert!(registry.register_font("/fonts/sans.ttf", RegisterOptions::default()).is_ok());
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_file_system_registration() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("TestSans.ttf");
    std::fs::write(&path, sans()).unwrap();

    let registry = FontRegistry::with_loader(EngineConfig::default(), Arc::new(FileSystemLoader));
    let font = registry.register_font(&path, RegisterOptions::default()).unwrap();
    assert_eq!(font.path(), Some(path.as_path()));

    let data = registry.initialize(&font).unwrap();
    assert_eq!(data.string_width("AB", false), 1300.0);
    assert_eq!(data.string_width("AB", true), 1250.0);

    let err = registry
        .register_font(dir.path().join("missing.ttf"), RegisterOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::FontNotFound(_)));
}
