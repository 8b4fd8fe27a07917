// Atlas discovery, catalog parsing and lazy icon lookup

use anyhow::{Context, Result};
use image::RgbaImage;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::names::{IconKey, TEX_EXTENSION};
use super::rect::UvRect;
use super::synth::ImageSynthesizer;

/// One named region of an atlas catalog.
///
/// Coordinates are kept as written in the catalog and only parsed when the
/// element is actually cropped, so a single bad entry cannot poison the
/// whole atlas.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    u1: Option<String>,
    u2: Option<String>,
    v1: Option<String>,
    v2: Option<String>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            u1: None,
            u2: None,
            v1: None,
            v2: None,
        }
    }

    pub fn with_uv(mut self, u1: f64, u2: f64, v1: f64, v2: f64) -> Self {
        self.u1 = Some(u1.to_string());
        self.u2 = Some(u2.to_string());
        self.v1 = Some(v1.to_string());
        self.v2 = Some(v2.to_string());
        self
    }

    pub fn matches(&self, key: &IconKey) -> bool {
        self.name.to_lowercase() == key.as_str()
    }

    pub fn uv(&self) -> Result<UvRect> {
        Ok(UvRect {
            u1: parse_coord("u1", &self.u1)?,
            u2: parse_coord("u2", &self.u2)?,
            v1: parse_coord("v1", &self.v1)?,
            v2: parse_coord("v2", &self.v2)?,
        })
    }
}

fn parse_coord(attr: &str, value: &Option<String>) -> Result<f64> {
    let raw = value
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("Missing {} attribute", attr))?;
    raw.trim()
        .parse::<f64>()
        .with_context(|| format!("Invalid {} value {:?}", attr, raw))
}

/// Parsed contents of an atlas metadata file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtlasCatalog {
    /// Raw texture named by `<Texture filename="..."/>`, if any.
    pub texture: Option<String>,
    pub elements: Vec<Element>,
}

impl AtlasCatalog {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read atlas metadata {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse atlas metadata {}", path.display()))
    }

    /// Parses `<Atlas><Texture/><Elements><Element .../>...</Elements></Atlas>`.
    ///
    /// Every direct child of `Elements` counts as an element; children
    /// without a `name` attribute are ignored.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut catalog = AtlasCatalog::default();
        let mut depth = 0usize;
        let mut elements_depth: Option<usize> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    depth += 1;
                    if elements_depth.is_none() && e.name().as_ref() == b"Elements" {
                        elements_depth = Some(depth);
                    } else {
                        catalog.visit(&e, depth, elements_depth)?;
                    }
                }
                Event::Empty(e) => {
                    catalog.visit(&e, depth + 1, elements_depth)?;
                }
                Event::End(_) => {
                    if elements_depth == Some(depth) {
                        elements_depth = None;
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(catalog)
    }

    fn visit(
        &mut self,
        e: &BytesStart<'_>,
        depth: usize,
        elements_depth: Option<usize>,
    ) -> Result<()> {
        match elements_depth {
            Some(parent) if depth == parent + 1 => {
                if let Some(element) = read_element(e)? {
                    self.elements.push(element);
                }
            }
            None if e.name().as_ref() == b"Texture" => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"filename" {
                        self.texture = Some(attr.unescape_value()?.into_owned());
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn find(&self, key: &IconKey) -> Option<usize> {
        self.elements.iter().position(|e| e.matches(key))
    }
}

fn read_element(e: &BytesStart<'_>) -> Result<Option<Element>> {
    let mut element = Element::new(String::new());
    let mut has_name = false;

    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?.into_owned();
        match attr.key.as_ref() {
            b"name" => {
                element.name = value;
                has_name = true;
            }
            b"u1" => element.u1 = Some(value),
            b"u2" => element.u2 = Some(value),
            b"v1" => element.v1 = Some(value),
            b"v2" => element.v2 = Some(value),
            _ => {}
        }
    }

    Ok(has_name.then_some(element))
}

/// Position of a matched element inside an [`AtlasIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasHit {
    pub atlas: usize,
    pub element: usize,
}

struct AtlasSlot {
    meta_path: PathBuf,
    image_path: PathBuf,
    // None: not loaded yet, Some(None): unusable
    catalog: Option<Option<AtlasCatalog>>,
    available: Option<bool>,
    image: Option<Result<RgbaImage, String>>,
}

impl AtlasSlot {
    fn new(meta_path: PathBuf) -> Self {
        let image_path = meta_path.with_extension("png");
        Self {
            meta_path,
            image_path,
            catalog: None,
            available: None,
            image: None,
        }
    }

    fn catalog(&mut self, warnings: &mut Vec<String>) -> Option<&AtlasCatalog> {
        if self.catalog.is_none() {
            let loaded = match AtlasCatalog::from_file(&self.meta_path) {
                Ok(catalog) => {
                    tracing::debug!(
                        "loaded {} elements from {}",
                        catalog.elements.len(),
                        self.meta_path.display()
                    );
                    Some(catalog)
                }
                Err(e) => {
                    tracing::warn!("skipping atlas: {:#}", e);
                    warnings.push(format!("Skipping atlas: {:#}", e));
                    None
                }
            };
            self.catalog = Some(loaded);
        }
        self.catalog.as_ref().and_then(Option::as_ref)
    }

    fn raw_texture(&self) -> Option<PathBuf> {
        let dir = self.meta_path.parent()?;
        let stem = self.meta_path.file_stem()?.to_string_lossy();
        let sibling = dir.join(format!("{}{}", stem, TEX_EXTENSION));
        if sibling.is_file() {
            return Some(sibling);
        }

        let named = self
            .catalog
            .as_ref()
            .and_then(Option::as_ref)
            .and_then(|c| c.texture.as_deref())
            .map(|t| dir.join(t))?;
        named.is_file().then_some(named)
    }

    /// Whether the companion image exists, attempting synthesis at most once.
    fn ensure_image(
        &mut self,
        synthesizer: Option<&dyn ImageSynthesizer>,
        warnings: &mut Vec<String>,
    ) -> bool {
        if let Some(available) = self.available {
            return available;
        }

        let mut available = self.image_path.is_file();
        if !available {
            if let (Some(synth), Some(asset)) = (synthesizer, self.raw_texture()) {
                let target = self.meta_path.parent().unwrap_or(Path::new("."));
                tracing::debug!(
                    "synthesizing {} from {}",
                    self.image_path.display(),
                    asset.display()
                );
                available = synth.synthesize(&asset, target) && self.image_path.is_file();
                if !available {
                    warnings.push(format!(
                        "Could not rebuild {} from {}, skipping atlas",
                        self.image_path.display(),
                        asset.display()
                    ));
                }
            }
            if !available {
                tracing::debug!("no image for {}, skipping", self.meta_path.display());
            }
        }

        self.available = Some(available);
        available
    }

    fn image(&mut self) -> Result<&RgbaImage> {
        let path = &self.image_path;
        let decoded = self.image.get_or_insert_with(|| {
            image::open(path)
                .map(|img| img.to_rgba8())
                .map_err(|e| format!("Failed to decode {}: {}", path.display(), e))
        });

        match decoded {
            Ok(img) => Ok(img),
            Err(msg) => Err(anyhow::anyhow!("{}", msg)),
        }
    }
}

/// Lazily loaded view over every atlas in a source directory.
///
/// Catalogs are parsed on first visit and images decoded on first match; both
/// are cached for the lifetime of the index, i.e. one batch.
pub struct AtlasIndex<'a> {
    slots: Vec<AtlasSlot>,
    synthesizer: Option<&'a dyn ImageSynthesizer>,
    warnings: Vec<String>,
}

impl<'a> AtlasIndex<'a> {
    /// Lists the metadata files of `source_dir`, sorted by file name.
    pub fn scan(source_dir: &Path) -> Result<Self> {
        let mut slots = Vec::new();
        for entry in WalkDir::new(source_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry
                .with_context(|| format!("Failed to list {}", source_dir.display()))?;
            let path = entry.path();
            if path.is_file() && is_metadata_file(path) {
                slots.push(AtlasSlot::new(path.to_path_buf()));
            }
        }

        Ok(Self {
            slots,
            synthesizer: None,
            warnings: Vec::new(),
        })
    }

    pub fn with_synthesizer(mut self, synthesizer: &'a dyn ImageSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// First element named `key`, searching atlases in listing order.
    pub fn find(&mut self, key: &IconKey) -> Option<AtlasHit> {
        let synthesizer = self.synthesizer;
        let warnings = &mut self.warnings;
        for (atlas, slot) in self.slots.iter_mut().enumerate() {
            let Some(element) = slot.catalog(warnings).and_then(|c| c.find(key)) else {
                continue;
            };
            if !slot.ensure_image(synthesizer, warnings) {
                continue;
            }
            return Some(AtlasHit { atlas, element });
        }
        None
    }

    /// Problems met while searching that skipped an atlas, drained on read.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn element(&self, hit: AtlasHit) -> Option<&Element> {
        self.slots
            .get(hit.atlas)?
            .catalog
            .as_ref()?
            .as_ref()?
            .elements
            .get(hit.element)
    }

    pub fn image_path(&self, hit: AtlasHit) -> Option<&Path> {
        self.slots.get(hit.atlas).map(|s| s.image_path.as_path())
    }

    pub fn image(&mut self, hit: AtlasHit) -> Result<&RgbaImage> {
        self.slots
            .get_mut(hit.atlas)
            .ok_or_else(|| anyhow::anyhow!("No atlas at index {}", hit.atlas))?
            .image()
    }
}

fn is_metadata_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("xml"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::cell::Cell;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"<Atlas>
  <Texture filename="inventory.tex" />
  <Elements>
    <Element name="Meat.tex" u1="0.0" u2="0.5" v1="0.5" v2="1.0" />
    <Element name="log.tex" u1="0.5" u2="1.0" v1="0.5" v2="1.0"></Element>
    <Element u1="0" u2="1" v1="0" v2="1" />
    <Element name="broken.tex" u1="abc" u2="1" v1="0" v2="1" />
  </Elements>
</Atlas>"#;

    fn write_atlas(dir: &Path, stem: &str, xml: &str, with_png: bool) {
        fs::write(dir.join(format!("{}.xml", stem)), xml).unwrap();
        if with_png {
            RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255]))
                .save(dir.join(format!("{}.png", stem)))
                .unwrap();
        }
    }

    struct CountingSynth {
        calls: Cell<usize>,
        produce: bool,
    }

    impl ImageSynthesizer for CountingSynth {
        fn synthesize(&self, asset: &Path, target_dir: &Path) -> bool {
            self.calls.set(self.calls.get() + 1);
            if self.produce {
                let stem = asset.file_stem().unwrap().to_string_lossy();
                RgbaImage::new(4, 4)
                    .save(target_dir.join(format!("{}.png", stem)))
                    .unwrap();
            }
            self.produce
        }
    }

    #[test]
    fn test_parse_catalog() {
        let catalog = AtlasCatalog::parse(SAMPLE).unwrap();
        assert_eq!(catalog.texture.as_deref(), Some("inventory.tex"));
        assert_eq!(catalog.elements.len(), 3);
        assert_eq!(catalog.elements[0].name, "Meat.tex");
        assert_eq!(catalog.elements[1].name, "log.tex");

        let uv = catalog.elements[1].uv().unwrap();
        assert_eq!(
            uv,
            UvRect {
                u1: 0.5,
                u2: 1.0,
                v1: 0.5,
                v2: 1.0,
            }
        );
    }

    #[test]
    fn test_bad_coordinates_fail_only_on_use() {
        let catalog = AtlasCatalog::parse(SAMPLE).unwrap();
        let broken = &catalog.elements[2];
        assert_eq!(broken.name, "broken.tex");
        assert!(broken.uv().is_err());
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let catalog = AtlasCatalog::parse(SAMPLE).unwrap();
        assert_eq!(catalog.find(&IconKey::from_raw("meat")), Some(0));
        assert_eq!(catalog.find(&IconKey::from_raw("LOG")), Some(1));
        assert_eq!(catalog.find(&IconKey::from_raw("stone")), None);
    }

    #[test]
    fn test_parse_rejects_malformed_xml() {
        assert!(AtlasCatalog::parse("<Atlas><Elements></Atlas>").is_err());
    }

    #[test]
    fn test_first_atlas_wins() {
        let dir = tempdir().unwrap();
        write_atlas(dir.path(), "a_first", SAMPLE, true);
        write_atlas(dir.path(), "b_second", SAMPLE, true);

        let mut index = AtlasIndex::scan(dir.path()).unwrap();
        assert_eq!(index.len(), 2);

        let hit = index.find(&IconKey::from_raw("log")).unwrap();
        assert_eq!(hit, AtlasHit { atlas: 0, element: 1 });
        assert!(index.image_path(hit).unwrap().ends_with("a_first.png"));
        assert_eq!(index.image(hit).unwrap().dimensions(), (8, 8));
    }

    #[test]
    fn test_atlas_without_image_is_skipped() {
        let dir = tempdir().unwrap();
        write_atlas(dir.path(), "a_noimage", SAMPLE, false);
        write_atlas(dir.path(), "b_image", SAMPLE, true);

        let mut index = AtlasIndex::scan(dir.path()).unwrap();
        let hit = index.find(&IconKey::from_raw("meat")).unwrap();
        assert_eq!(hit.atlas, 1);
    }

    #[test]
    fn test_unparsable_atlas_is_skipped() {
        let dir = tempdir().unwrap();
        write_atlas(dir.path(), "a_bad", "<Atlas><Elements></Atlas>", true);
        write_atlas(dir.path(), "b_good", SAMPLE, true);

        let mut index = AtlasIndex::scan(dir.path()).unwrap();
        assert_eq!(index.find(&IconKey::from_raw("meat")).unwrap().atlas, 1);

        let warnings = index.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("a_bad.xml"), "{}", warnings[0]);
        assert!(index.take_warnings().is_empty());
    }

    #[test]
    fn test_synthesizer_called_once_per_atlas() {
        let dir = tempdir().unwrap();
        write_atlas(dir.path(), "inv", SAMPLE, false);
        fs::write(dir.path().join("inv.tex"), b"KTEX").unwrap();

        let synth = CountingSynth {
            calls: Cell::new(0),
            produce: false,
        };
        let mut index = AtlasIndex::scan(dir.path()).unwrap().with_synthesizer(&synth);

        assert!(index.find(&IconKey::from_raw("meat")).is_none());
        assert!(index.find(&IconKey::from_raw("log")).is_none());
        assert_eq!(synth.calls.get(), 1);

        let warnings = index.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Could not rebuild"), "{}", warnings[0]);
    }

    #[test]
    fn test_synthesizer_recovers_image() {
        let dir = tempdir().unwrap();
        write_atlas(dir.path(), "inv", SAMPLE, false);
        fs::write(dir.path().join("inv.tex"), b"KTEX").unwrap();

        let synth = CountingSynth {
            calls: Cell::new(0),
            produce: true,
        };
        let mut index = AtlasIndex::scan(dir.path()).unwrap().with_synthesizer(&synth);

        let hit = index.find(&IconKey::from_raw("meat")).unwrap();
        assert_eq!(index.image(hit).unwrap().dimensions(), (4, 4));
        assert_eq!(synth.calls.get(), 1);
    }

    #[test]
    fn test_synthesizer_not_called_without_raw_texture() {
        let dir = tempdir().unwrap();
        write_atlas(
            dir.path(),
            "inv",
            "<Atlas><Elements><Element name=\"meat.tex\"/></Elements></Atlas>",
            false,
        );

        let synth = CountingSynth {
            calls: Cell::new(0),
            produce: true,
        };
        let mut index = AtlasIndex::scan(dir.path()).unwrap().with_synthesizer(&synth);

        assert!(index.find(&IconKey::from_raw("meat")).is_none());
        assert_eq!(synth.calls.get(), 0);
    }

    #[test]
    fn test_scan_ignores_other_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("readme.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("nested.xml")).unwrap();
        write_atlas(dir.path(), "UPPER", SAMPLE, true);
        fs::rename(dir.path().join("UPPER.xml"), dir.path().join("UPPER.XML")).unwrap();

        let index = AtlasIndex::scan(dir.path()).unwrap();
        assert_eq!(index.len(), 1);
    }
}
