//! Translation catalogs and locale-aware string matching.
//!
//! Test scripts name widgets in the source language ("Open", "_File").
//! When the application under test runs in another locale, the bus reports
//! the translated names. [`TranslationRegistry`] holds the message catalogs
//! of the application's package (and its dependencies) so a
//! [`TranslatableString`] can match either form.
//!
//! Catalogs are GNU gettext `.mo` files. The package database collaborator
//! ([`PackageDb`]) tells us which files belong to a package.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SpanielError};

const MO_MAGIC: u32 = 0x9504_12de;
const MO_MAGIC_SWAPPED: u32 = 0xde12_0495;
const CONTEXT_SEPARATOR: char = '\u{4}';
const PLURAL_SEPARATOR: char = '\0';

/// Characters toolkits use to mark keyboard mnemonics in labels.
const MNEMONIC_MARKERS: [char; 2] = ['_', '&'];

/// One loaded message catalog: source strings to their translations.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    domain: String,
    messages: HashMap<String, String>,
}

impl Catalog {
    /// Builds a catalog from `(msgid, msgstr)` pairs.
    pub fn from_pairs<I, K, V>(domain: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut catalog = Catalog {
            domain: domain.into(),
            messages: HashMap::new(),
        };
        for (id, text) in pairs {
            catalog.insert(id.into(), text.into());
        }
        catalog
    }

    /// Reads and decodes a `.mo` file. The domain is the file stem.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let domain = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_mo_bytes(domain, &bytes)
    }

    /// Decodes a GNU gettext `.mo` image (either byte order).
    pub fn from_mo_bytes(domain: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let reader = MoReader::new(bytes)?;
        let count = reader.word(8)? as usize;
        let originals = reader.word(12)? as usize;
        let translations = reader.word(16)? as usize;
        let fits = |table: usize| {
            count
                .checked_mul(8)
                .and_then(|size| size.checked_add(table))
                .is_some_and(|end| end <= bytes.len())
        };
        if !fits(originals) || !fits(translations) {
            return Err(malformed("string tables run past the end of the file"));
        }

        let mut catalog = Catalog {
            domain: domain.into(),
            messages: HashMap::with_capacity(count),
        };
        for i in 0..count {
            let id = reader.string_at(originals + i * 8)?;
            let text = reader.string_at(translations + i * 8)?;
            if id.is_empty() {
                // Header entry.
                continue;
            }
            catalog.insert(id, text);
        }
        Ok(catalog)
    }

    fn insert(&mut self, id: String, text: String) {
        let id = id.split(PLURAL_SEPARATOR).next().unwrap_or_default().to_string();
        let text = text.split(PLURAL_SEPARATOR).next().unwrap_or_default().to_string();
        if text.is_empty() {
            return;
        }
        if let Some((_, bare)) = id.split_once(CONTEXT_SEPARATOR) {
            self.messages
                .entry(bare.to_string())
                .or_insert_with(|| text.clone());
        }
        self.messages.insert(id, text);
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.messages.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

struct MoReader<'a> {
    bytes: &'a [u8],
    big_endian: bool,
}

impl<'a> MoReader<'a> {
    fn new(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 20 {
            return Err(malformed("file too short for a header"));
        }
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let big_endian = match magic {
            MO_MAGIC => false,
            MO_MAGIC_SWAPPED => true,
            other => return Err(malformed(&format!("bad magic number {:#010x}", other))),
        };
        let reader = Self { bytes, big_endian };
        let revision = reader.word(4)?;
        if revision >> 16 > 1 {
            return Err(malformed(&format!("unsupported revision {:#x}", revision)));
        }
        Ok(reader)
    }

    fn word(&self, offset: usize) -> Result<u32> {
        let raw: [u8; 4] = self
            .bytes
            .get(offset..offset + 4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| malformed(&format!("offset {} out of bounds", offset)))?;
        Ok(if self.big_endian {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        })
    }

    /// Reads the string described by the (length, offset) descriptor at `descriptor`.
    fn string_at(&self, descriptor: usize) -> Result<String> {
        let len = self.word(descriptor)? as usize;
        let start = self.word(descriptor + 4)? as usize;
        let raw = self
            .bytes
            .get(start..start + len)
            .ok_or_else(|| malformed(&format!("string at {} overruns the file", start)))?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }
}

fn malformed(detail: &str) -> SpanielError {
    SpanielError::InvalidArgument(format!("malformed message catalog: {}", detail))
}

/// Append-only set of loaded catalogs.
#[derive(Debug, Clone, Default)]
pub struct TranslationRegistry {
    catalogs: Vec<Catalog>,
}

impl TranslationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, catalog: Catalog) {
        debug!(domain = catalog.domain(), messages = catalog.len(), "loaded translation catalog");
        self.catalogs.push(catalog);
    }

    pub fn len(&self) -> usize {
        self.catalogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }

    fn lookup<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.catalogs.iter().filter_map(move |c| c.get(id))
    }

    /// All known translations of `source`.
    ///
    /// The bare string is looked up first, then every variant with a mnemonic
    /// marker inserted at each position; markers are stripped from those hits.
    /// An empty set means the source should be used verbatim.
    pub fn translate(&self, source: &str) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        if self.catalogs.is_empty() || source.is_empty() {
            return result;
        }
        result.extend(self.lookup(source).map(str::to_string));

        let boundaries = source
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(source.len()));
        for pos in boundaries {
            for marker in MNEMONIC_MARKERS {
                let mut marked = String::with_capacity(source.len() + 1);
                marked.push_str(&source[..pos]);
                marked.push(marker);
                marked.push_str(&source[pos..]);
                for hit in self.lookup(&marked) {
                    result.insert(strip_marker(hit, marker));
                }
            }
        }
        result
    }

    /// Wraps `source` together with its known translations.
    pub fn translatable(&self, source: &str) -> TranslatableString {
        TranslatableString {
            source: source.to_string(),
            translations: self.translate(source),
        }
    }
}

fn strip_marker(text: &str, marker: char) -> String {
    match text.find(marker) {
        Some(pos) => {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..pos]);
            out.push_str(&text[pos + marker.len_utf8()..]);
            out
        }
        None => text.to_string(),
    }
}

/// A user-visible string plus every translation of it found in the catalogs.
///
/// Equality and hashing consider only the source string; the translations are
/// derived from it and the catalogs loaded at the time.
#[derive(Debug, Clone)]
pub struct TranslatableString {
    source: String,
    translations: BTreeSet<String>,
}

impl TranslatableString {
    /// A string with no known translations.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            translations: BTreeSet::new(),
        }
    }

    pub fn with_translations<I, S>(source: impl Into<String>, translations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source: source.into(),
            translations: translations.into_iter().map(Into::into).collect(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn translations(&self) -> &BTreeSet<String> {
        &self.translations
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// True if `candidate` is the source string or one of its translations.
    pub fn matched_by(&self, candidate: &str) -> bool {
        candidate == self.source || self.translations.contains(candidate)
    }
}

impl PartialEq for TranslatableString {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for TranslatableString {}

impl std::hash::Hash for TranslatableString {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl fmt::Display for TranslatableString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl From<&str> for TranslatableString {
    fn from(source: &str) -> Self {
        TranslatableString::new(source)
    }
}

impl From<String> for TranslatableString {
    fn from(source: String) -> Self {
        TranslatableString::new(source)
    }
}

/// Distribution package database, used only to find translation catalogs.
pub trait PackageDb: Send + Sync {
    /// Installed version of `package`, or `None` if it is not installed.
    fn version(&self, package: &str) -> Option<String>;

    /// Files installed by `package`.
    fn files(&self, package: &str) -> Result<Vec<PathBuf>>;

    /// Packages `package` declares as dependencies.
    fn dependencies(&self, package: &str) -> Result<Vec<String>>;
}

/// Active languages from the environment, most preferred first.
///
/// Reads `LANGUAGE`, then `LC_ALL`, `LC_MESSAGES` and `LANG`. Encodings and
/// modifiers are dropped and each `ll_CC` also contributes `ll`.
pub fn current_languages() -> Vec<String> {
    languages_from(|key| std::env::var(key).ok())
}

/// [`current_languages`] over an arbitrary variable lookup.
pub fn languages_from(lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    let raw = ["LANGUAGE", "LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.is_empty())
        .unwrap_or_default();

    let mut languages = Vec::new();
    for entry in raw.split(':') {
        let lang = entry
            .split(['.', '@'])
            .next()
            .unwrap_or_default()
            .trim();
        if lang.is_empty() || lang == "C" || lang == "POSIX" {
            continue;
        }
        if !languages.iter().any(|l| l == lang) {
            languages.push(lang.to_string());
        }
        if let Some((base, _)) = lang.split_once('_') {
            if !languages.iter().any(|l| l == base) {
                languages.push(base.to_string());
            }
        }
    }
    languages
}

fn is_catalog_for(path: &Path, languages: &[String]) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some("mo") {
        return false;
    }
    let Some(messages_dir) = path.parent() else {
        return false;
    };
    if messages_dir.file_name().and_then(|n| n.to_str()) != Some("LC_MESSAGES") {
        return false;
    }
    messages_dir
        .parent()
        .and_then(|lang_dir| lang_dir.file_name())
        .and_then(|n| n.to_str())
        .is_some_and(|lang| languages.iter().any(|l| l == lang))
}

/// Every catalog path of `package` and, transitively, its dependencies.
pub fn catalog_paths(db: &dyn PackageDb, package: &str, languages: &[String]) -> Result<Vec<PathBuf>> {
    if db.version(package).is_none() {
        return Err(SpanielError::DependencyNotFound(format!(
            "package '{}' is not installed",
            package
        )));
    }

    let mut paths = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([package.to_string()]);
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        match db.files(&current) {
            Ok(files) => paths.extend(files.into_iter().filter(|p| is_catalog_for(p, languages))),
            Err(e) => warn!(package = %current, error = %e, "could not list package files"),
        }
        match db.dependencies(&current) {
            Ok(deps) => queue.extend(deps.into_iter().filter(|d| !seen.contains(d))),
            Err(e) => warn!(package = %current, error = %e, "could not list package dependencies"),
        }
    }
    Ok(paths)
}

/// Loads every readable catalog of `package` for `languages`.
///
/// Unreadable or malformed catalog files are skipped with a warning.
pub fn load_translations_from_package(
    db: &dyn PackageDb,
    package: &str,
    languages: &[String],
) -> Result<Vec<Catalog>> {
    let mut catalogs = Vec::new();
    for path in catalog_paths(db, package, languages)? {
        match Catalog::load(&path) {
            Ok(catalog) => catalogs.push(catalog),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping translation catalog"),
        }
    }
    Ok(catalogs)
}
