//! Corpora and the process-wide registry of loaded corpora.
//!
//! A corpus is identified by its registry directory and id. Acquiring the
//! same corpus twice shares one [`Corpus`] and bumps its reference count;
//! the corpus, with every component it has mapped, is released when the
//! last [`CorpusHandle`] is dropped.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lazy_static::lazy_static;
use log::{debug, info};
use parking_lot::{Mutex, MutexGuard};

use crate::attribute::positional::Positional;
use crate::attribute::{Attribute, AttributeInfo};
use crate::config::StoreConfig;
use crate::error::{PosattrError, Result};

/// One corpus and its attributes.
#[derive(Debug)]
pub struct Corpus {
    id: String,
    registry_dir: PathBuf,
    data_dir: PathBuf,
    config: StoreConfig,
    attributes: BTreeMap<String, Attribute>,
}

impl Corpus {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(id: &str, registry_dir: P, data_dir: Q) -> Self {
        Corpus {
            id: id.to_string(),
            registry_dir: registry_dir.as_ref().to_path_buf(),
            data_dir: data_dir.as_ref().to_path_buf(),
            config: StoreConfig::default(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn registry_dir(&self) -> &Path {
        &self.registry_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Configuration for positional attributes declared from now on.
    pub fn set_config(&mut self, config: StoreConfig) {
        self.config = config;
    }

    /// Register an attribute; names are unique within a corpus.
    pub fn add_attribute(&mut self, attribute: Attribute) -> Result<()> {
        let name = attribute.name().to_string();
        if self.attributes.contains_key(&name) {
            return Err(PosattrError::config(format!(
                "corpus {} already has an attribute named {name}",
                self.id
            )));
        }
        debug!(
            "corpus {}: declared {} attribute {name}",
            self.id,
            attribute.kind_name()
        );
        self.attributes.insert(name, attribute);
        Ok(())
    }

    /// Declare a positional attribute stored in the data directory.
    pub fn declare_positional(&mut self, name: &str) -> Result<&mut Positional> {
        let attribute = Positional::new(name, &self.data_dir, self.config.clone());
        self.add_attribute(Attribute::Positional(attribute))?;
        self.positional_mut(name)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.get_mut(name)
    }

    /// The positional attribute `name`.
    pub fn positional_mut(&mut self, name: &str) -> Result<&mut Positional> {
        let id = &self.id;
        self.attributes
            .get_mut(name)
            .ok_or_else(|| PosattrError::config(format!("corpus {id} has no attribute {name}")))?
            .as_positional_mut()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// Release every loaded component of every attribute.
    pub fn drop_all(&mut self) -> usize {
        self.attributes.values_mut().map(Attribute::drop_all).sum()
    }
}

type CorpusKey = (PathBuf, String);

#[derive(Debug)]
struct Entry {
    corpus: Arc<Mutex<Corpus>>,
    refs: usize,
}

lazy_static! {
    static ref LOADED: Mutex<HashMap<CorpusKey, Entry>> = Mutex::new(HashMap::new());
}

/// Acquire corpus `id` of `registry_dir`, sharing it with earlier
/// acquisitions that are still alive.
pub fn acquire<P: AsRef<Path>, Q: AsRef<Path>>(
    registry_dir: P,
    id: &str,
    data_dir: Q,
) -> Result<CorpusHandle> {
    if id.is_empty() {
        return Err(PosattrError::invalid_argument("corpus id must not be empty"));
    }
    let key = (registry_dir.as_ref().to_path_buf(), id.to_string());
    let mut loaded = LOADED.lock();
    let entry = loaded.entry(key.clone()).or_insert_with(|| {
        info!("loading corpus {id} from {}", key.0.display());
        Entry {
            corpus: Arc::new(Mutex::new(Corpus::new(id, &key.0, data_dir))),
            refs: 0,
        }
    });
    entry.refs += 1;
    debug!("corpus {id}: {} references", entry.refs);
    Ok(CorpusHandle {
        corpus: Arc::clone(&entry.corpus),
        key,
    })
}

/// Number of corpora currently held by the registry.
pub fn loaded_count() -> usize {
    LOADED.lock().len()
}

/// A counted reference to a loaded corpus.
#[derive(Debug)]
pub struct CorpusHandle {
    corpus: Arc<Mutex<Corpus>>,
    key: CorpusKey,
}

impl CorpusHandle {
    /// Exclusive access to the corpus.
    pub fn lock(&self) -> MutexGuard<'_, Corpus> {
        self.corpus.lock()
    }

    /// Number of live handles to this corpus.
    pub fn ref_count(&self) -> usize {
        LOADED.lock().get(&self.key).map_or(0, |entry| entry.refs)
    }
}

impl Clone for CorpusHandle {
    fn clone(&self) -> Self {
        if let Some(entry) = LOADED.lock().get_mut(&self.key) {
            entry.refs += 1;
        }
        CorpusHandle {
            corpus: Arc::clone(&self.corpus),
            key: self.key.clone(),
        }
    }
}

impl Drop for CorpusHandle {
    fn drop(&mut self) {
        let mut loaded = LOADED.lock();
        let Some(entry) = loaded.get_mut(&self.key) else {
            return;
        };
        entry.refs -= 1;
        if entry.refs == 0
            && let Some(entry) = loaded.remove(&self.key)
        {
            let released = entry.corpus.lock().drop_all();
            info!(
                "released corpus {} ({released} components unmapped)",
                self.key.1
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::component::{ComponentKind, ComponentState};
    use crate::attribute::Structural;
    use crate::encoder::AttributeEncoder;
    use tempfile::TempDir;

    #[test]
    fn test_repeated_acquire_shares_the_corpus() {
        let temp_dir = TempDir::new().unwrap();
        let registry = temp_dir.path().join("registry");

        let first = acquire(&registry, "shared", temp_dir.path()).unwrap();
        first.lock().declare_positional("word").unwrap();
        let second = acquire(&registry, "shared", temp_dir.path()).unwrap();
        assert_eq!(first.ref_count(), 2);
        assert!(second.lock().attribute("word").is_some());

        let third = second.clone();
        assert_eq!(first.ref_count(), 3);
        drop(second);
        drop(third);
        assert_eq!(first.ref_count(), 1);
        drop(first);

        let again = acquire(&registry, "shared", temp_dir.path()).unwrap();
        assert_eq!(again.ref_count(), 1);
        assert!(again.lock().attribute("word").is_none());
    }

    #[test]
    fn test_release_unmaps_components() {
        let temp_dir = TempDir::new().unwrap();
        let mut encoder = AttributeEncoder::create(temp_dir.path(), "word").unwrap();
        encoder.push("x").unwrap();
        encoder.finish().unwrap();

        let handle = acquire(temp_dir.path(), "unmapped", temp_dir.path()).unwrap();
        {
            let mut corpus = handle.lock();
            let word = corpus.declare_positional("word").unwrap();
            word.ensure(ComponentKind::Frequencies, true).unwrap();
            assert_eq!(word.state(ComponentKind::Frequencies), ComponentState::Loaded);
            assert!(corpus.drop_all() > 0);
        }
        assert_eq!(handle.ref_count(), 1);
    }

    #[test]
    fn test_attribute_names_are_unique() {
        let temp_dir = TempDir::new().unwrap();
        let mut corpus = Corpus::new("c", temp_dir.path(), temp_dir.path());
        corpus.declare_positional("word").unwrap();
        assert!(corpus.declare_positional("word").is_err());

        corpus
            .add_attribute(Attribute::Structural(Structural::new("s", temp_dir.path(), false)))
            .unwrap();
        assert!(corpus.positional_mut("s").is_err());
        assert!(corpus.positional_mut("lemma").is_err());
        assert_eq!(corpus.attributes().count(), 2);
    }

    #[test]
    fn test_empty_id_is_rejected() {
        assert!(acquire("/tmp", "", "/tmp").is_err());
    }
}
