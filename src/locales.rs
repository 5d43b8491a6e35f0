//! Translation file maintenance.
//!
//! Language files live side by side in one directory (`en.json`, `sv.json`,
//! ...). `en.json` is the master: every other language should carry exactly
//! its keys. Keys are compared in flattened, dot-joined form.

use crate::error::LocaleError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const MASTER_FILE: &str = "en.json";

/// Sources scanned for translation keys when none are given.
pub const DEFAULT_SOURCES: [&str; 4] = [
    "src/wizard",
    "src/translations.rs",
    "src/error.rs",
    "src/bin/setup.rs",
];
const MASTER_LANG: &str = "en";

/// Flat `key → value` view of one language file.
pub type FlatStrings = BTreeMap<String, Value>;

/// `{lang: {flat_key: value}}`, the exchange format of `gen` and `update`.
pub type TranslationBlock = BTreeMap<String, FlatStrings>;

static KEY_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([a-zA-Z0-9_.-]+)""#).unwrap());

/// Flattens nested objects into dot-joined keys. Non-object leaves are kept
/// as is.
pub fn flatten(value: &Value) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    flatten_into(value, None, &mut out);
    out
}

fn flatten_into(value: &Value, prefix: Option<&str>, out: &mut Vec<(String, Value)>) {
    match (value, prefix) {
        (Value::Object(map), _) => {
            for (k, v) in map {
                let key = match prefix {
                    Some(p) => format!("{}.{}", p, k),
                    None => k.clone(),
                };
                flatten_into(v, Some(&key), out);
            }
        }
        (leaf, Some(key)) => out.push((key.to_string(), leaf.clone())),
        // A bare scalar document has no keys.
        (_, None) => {}
    }
}

/// Rebuilds nested objects from dot-joined keys.
pub fn unflatten(flat: &FlatStrings) -> Value {
    let mut root = Map::new();
    for (key, value) in flat {
        let parts: Vec<&str> = key.split('.').collect();
        insert_path(&mut root, &parts, value.clone());
    }
    Value::Object(root)
}

fn insert_path(node: &mut Map<String, Value>, parts: &[&str], value: Value) {
    match parts {
        [] => {}
        [last] => {
            node.insert(last.to_string(), value);
        }
        [head, rest @ ..] => {
            let child = node
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                insert_path(map, rest, value);
            }
        }
    }
}

pub fn load_json(path: &Path) -> Result<Value, LocaleError> {
    let raw = fs::read_to_string(path).map_err(|source| LocaleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LocaleError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes pretty-printed JSON with a trailing newline.
pub fn save_json(path: &Path, value: &Value) -> Result<(), LocaleError> {
    let mut body = serde_json::to_string_pretty(value).map_err(|source| LocaleError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    body.push('\n');
    fs::write(path, body).map_err(|source| LocaleError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_flat(path: &Path) -> Result<FlatStrings, LocaleError> {
    Ok(flatten(&load_json(path)?).into_iter().collect())
}

/// All language files of a translations directory, flattened.
#[derive(Debug, Clone)]
pub struct Catalog {
    dir: PathBuf,
    pub master: FlatStrings,
    /// Non-master languages keyed by file stem.
    pub languages: BTreeMap<String, FlatStrings>,
}

impl Catalog {
    pub fn load(dir: &Path) -> Result<Self, LocaleError> {
        let master_path = dir.join(MASTER_FILE);
        if !master_path.is_file() {
            return Err(LocaleError::MissingMaster(master_path));
        }
        let master = load_flat(&master_path)?;

        let mut languages = BTreeMap::new();
        for path in language_files(dir)? {
            let Some(lang) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if lang == MASTER_LANG {
                continue;
            }
            languages.insert(lang.to_string(), load_flat(&path)?);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            master,
            languages,
        })
    }

    fn path_of(&self, lang: &str) -> PathBuf {
        self.dir.join(format!("{}.json", lang))
    }

    /// Master keys absent from each language, in master key order.
    pub fn missing(&self) -> BTreeMap<String, Vec<String>> {
        self.languages
            .iter()
            .map(|(lang, strings)| {
                let keys = self
                    .master
                    .keys()
                    .filter(|k| !strings.contains_key(*k))
                    .cloned()
                    .collect::<Vec<_>>();
                (lang.clone(), keys)
            })
            .filter(|(_, keys)| !keys.is_empty())
            .collect()
    }

    /// Keys present in a language but not in the master.
    pub fn redundant(&self) -> BTreeMap<String, Vec<String>> {
        self.languages
            .iter()
            .map(|(lang, strings)| {
                let keys = strings
                    .keys()
                    .filter(|k| !self.master.contains_key(*k))
                    .cloned()
                    .collect::<Vec<_>>();
                (lang.clone(), keys)
            })
            .filter(|(_, keys)| !keys.is_empty())
            .collect()
    }

    /// Missing keys with their master values, ready to be translated.
    pub fn generate(&self) -> TranslationBlock {
        self.missing()
            .into_iter()
            .map(|(lang, keys)| {
                let strings = keys
                    .into_iter()
                    .filter_map(|k| self.master.get(&k).cloned().map(|v| (k, v)))
                    .collect();
                (lang, strings)
            })
            .collect()
    }
}

fn language_files(dir: &Path) -> Result<Vec<PathBuf>, LocaleError> {
    let entries = fs::read_dir(dir).map_err(|source| LocaleError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Result of a `scan`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub missing: BTreeMap<String, Vec<String>>,
    pub redundant: BTreeMap<String, Vec<String>>,
    /// Dotted keys referenced in sources but absent from the master.
    pub unknown_in_sources: Vec<String>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.redundant.is_empty() && self.unknown_in_sources.is_empty()
    }
}

pub fn scan(dir: &Path, sources: &[PathBuf]) -> Result<ScanReport, LocaleError> {
    let catalog = Catalog::load(dir)?;
    let unknown_in_sources = used_keys(sources)?
        .into_iter()
        .filter(|k| !catalog.master.contains_key(k))
        .collect();

    Ok(ScanReport {
        missing: catalog.missing(),
        redundant: catalog.redundant(),
        unknown_in_sources,
    })
}

/// Dotted string literals in `.rs` files under `sources` (files or
/// directories). Test modules are skipped.
pub fn used_keys(sources: &[PathBuf]) -> Result<BTreeSet<String>, LocaleError> {
    let mut keys = BTreeSet::new();
    for source in sources {
        for file in rust_files(source)? {
            let content = fs::read_to_string(&file).map_err(|source| LocaleError::Io {
                path: file.clone(),
                source,
            })?;
            let code = content
                .split("#[cfg(test)]")
                .next()
                .unwrap_or_default();
            keys.extend(
                KEY_LITERAL
                    .captures_iter(code)
                    .map(|c| c[1].to_string())
                    .filter(|k| k.contains('.')),
            );
        }
    }
    Ok(keys)
}

fn rust_files(path: &Path) -> Result<Vec<PathBuf>, LocaleError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        tracing::warn!(path = %path.display(), "Source path not found, skipping");
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(path).map_err(|source| LocaleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries.filter_map(Result::ok) {
        let p = entry.path();
        if p.is_dir() {
            files.extend(rust_files(&p)?);
        } else if p.extension().is_some_and(|ext| ext == "rs") {
            files.push(p);
        }
    }
    files.sort();
    Ok(files)
}

/// Outcome of merging a block into one language file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated {
        lang: String,
        added: usize,
        overwritten: usize,
    },
    Unchanged {
        lang: String,
    },
    MissingFile {
        lang: String,
    },
}

/// Merges translated strings into the language files. Existing keys are only
/// overwritten when `force` is set and the value differs.
pub fn update(
    dir: &Path,
    block: &TranslationBlock,
    force: bool,
) -> Result<Vec<UpdateOutcome>, LocaleError> {
    let mut outcomes = Vec::with_capacity(block.len());
    for (lang, strings) in block {
        let path = dir.join(format!("{}.json", lang));
        if !path.is_file() {
            tracing::warn!(lang = %lang, "Language file missing");
            outcomes.push(UpdateOutcome::MissingFile { lang: lang.clone() });
            continue;
        }

        let mut flat = load_flat(&path)?;
        let (mut added, mut overwritten) = (0, 0);
        for (key, value) in strings {
            match flat.get(key) {
                None => {
                    flat.insert(key.clone(), value.clone());
                    added += 1;
                }
                Some(existing) if force && existing != value => {
                    flat.insert(key.clone(), value.clone());
                    overwritten += 1;
                }
                Some(_) => {}
            }
        }

        if added + overwritten > 0 {
            save_json(&path, &unflatten(&flat))?;
            tracing::info!(lang = %lang, added, overwritten, "Language file updated");
            outcomes.push(UpdateOutcome::Updated {
                lang: lang.clone(),
                added,
                overwritten,
            });
        } else {
            outcomes.push(UpdateOutcome::Unchanged { lang: lang.clone() });
        }
    }
    Ok(outcomes)
}

/// Reads a translation block from a file.
pub fn load_block(path: &Path) -> Result<TranslationBlock, LocaleError> {
    let value = load_json(path)?;
    serde_json::from_value(value).map_err(|source| LocaleError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Deletes keys not present in the master from every language file.
/// Returns the removed keys per language.
pub fn clean(dir: &Path) -> Result<BTreeMap<String, Vec<String>>, LocaleError> {
    let catalog = Catalog::load(dir)?;
    let redundant = catalog.redundant();

    for (lang, keys) in &redundant {
        let Some(strings) = catalog.languages.get(lang) else {
            continue;
        };
        let kept: FlatStrings = strings
            .iter()
            .filter(|(k, _)| !keys.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        save_json(&catalog.path_of(lang), &unflatten(&kept))?;
        tracing::info!(lang = %lang, removed = keys.len(), "Removed redundant keys");
    }
    Ok(redundant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, value: Value) {
        save_json(&dir.join(name), &value).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "en.json",
            json!({"title": "Stats", "error": {"a": "A", "b": "B"}}),
        );
        write(
            dir.path(),
            "sv.json",
            json!({"title": "Statistik", "error": {"a": "Å", "old": "Gammal"}}),
        );
        dir
    }

    #[test]
    fn test_flatten_unflatten() {
        let nested = json!({"step": {"add": {"title": "Add"}}, "title": "T", "n": 3});
        let flat: FlatStrings = flatten(&nested).into_iter().collect();

        assert_eq!(flat.get("step.add.title"), Some(&json!("Add")));
        assert_eq!(flat.get("n"), Some(&json!(3)));
        assert_eq!(unflatten(&flat), nested);
    }

    #[test]
    fn test_scan_reports_missing_and_redundant() {
        let dir = fixture();
        let src = dir.path().join("flow.rs");
        fs::write(
            &src,
            "fn f() { key(\"error.a\"); key(\"error.c\"); key(\"plain\"); }\n#[cfg(test)]\nmod tests { \"error.d\" }",
        )
        .unwrap();

        let report = scan(dir.path(), &[src]).unwrap();

        assert_eq!(report.missing["sv"], vec!["error.b"]);
        assert_eq!(report.redundant["sv"], vec!["error.old"]);
        assert_eq!(report.unknown_in_sources, vec!["error.c"]);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_missing_master() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Catalog::load(dir.path()),
            Err(LocaleError::MissingMaster(_))
        ));
    }

    #[test]
    fn test_gen_then_update() {
        let dir = fixture();
        let block = Catalog::load(dir.path()).unwrap().generate();
        assert_eq!(block["sv"]["error.b"], json!("B"));

        let outcomes = update(dir.path(), &block, false).unwrap();
        assert_eq!(
            outcomes,
            vec![UpdateOutcome::Updated {
                lang: "sv".into(),
                added: 1,
                overwritten: 0
            }]
        );

        let sv = load_json(&dir.path().join("sv.json")).unwrap();
        assert_eq!(sv["error"]["b"], json!("B"));
        assert_eq!(sv["error"]["a"], json!("Å"));
    }

    #[test]
    fn test_update_force_overwrites() {
        let dir = fixture();
        let mut block = TranslationBlock::new();
        block.insert(
            "sv".into(),
            [("title".to_string(), json!("Ny titel"))].into_iter().collect(),
        );
        block.insert("de".into(), FlatStrings::new());

        let outcomes = update(dir.path(), &block, false).unwrap();
        assert_eq!(
            outcomes,
            vec![
                UpdateOutcome::MissingFile { lang: "de".into() },
                UpdateOutcome::Unchanged { lang: "sv".into() },
            ]
        );

        update(dir.path(), &block, true).unwrap();
        let sv = load_json(&dir.path().join("sv.json")).unwrap();
        assert_eq!(sv["title"], json!("Ny titel"));
    }

    #[test]
    fn test_clean_removes_redundant() {
        let dir = fixture();

        let removed = clean(dir.path()).unwrap();

        assert_eq!(removed["sv"], vec!["error.old"]);
        let sv = load_json(&dir.path().join("sv.json")).unwrap();
        assert!(sv["error"].get("old").is_none());
        assert!(Catalog::load(dir.path()).unwrap().redundant().is_empty());
    }

    #[test]
    fn test_shipped_translations_have_no_redundant_keys() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("translations");
        let catalog = Catalog::load(&dir).unwrap();
        assert!(catalog.redundant().is_empty());
        assert!(catalog.languages.contains_key("sv"));
    }

    #[test]
    fn test_default_sources_use_only_known_keys() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let sources: Vec<PathBuf> = DEFAULT_SOURCES.iter().map(|s| root.join(s)).collect();

        let report = scan(&root.join("translations"), &sources).unwrap();

        assert!(report.unknown_in_sources.is_empty(), "{:?}", report.unknown_in_sources);
        assert!(used_keys(&sources).unwrap().contains("error.duplicate_entity"));
    }
}
