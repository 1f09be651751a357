//! Component kinds, lifecycle states and the per-attribute component table.

use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;

use crate::error::{PosattrError, Result};
use crate::storage::blob::{AccessMode, Blob, ItemWidth};

/// Every kind of on-disk artifact an attribute may own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ComponentKind {
    Lexicon,
    LexiconIndex,
    SortedLexicon,
    TokenStream,
    Frequencies,
    ReversedIndex,
    ReversedOffsets,
    HuffStream,
    HuffDescriptor,
    HuffSync,
    CompressedRev,
    CompressedRevOffsets,
    StructRanges,
    StructValues,
    StructValueIndex,
    AlignData,
}

impl ComponentKind {
    pub const COUNT: usize = 16;

    pub const ALL: [ComponentKind; Self::COUNT] = [
        ComponentKind::Lexicon,
        ComponentKind::LexiconIndex,
        ComponentKind::SortedLexicon,
        ComponentKind::TokenStream,
        ComponentKind::Frequencies,
        ComponentKind::ReversedIndex,
        ComponentKind::ReversedOffsets,
        ComponentKind::HuffStream,
        ComponentKind::HuffDescriptor,
        ComponentKind::HuffSync,
        ComponentKind::CompressedRev,
        ComponentKind::CompressedRevOffsets,
        ComponentKind::StructRanges,
        ComponentKind::StructValues,
        ComponentKind::StructValueIndex,
        ComponentKind::AlignData,
    ];

    /// Kinds a positional attribute supports.
    pub const POSITIONAL: [ComponentKind; 12] = [
        ComponentKind::Lexicon,
        ComponentKind::LexiconIndex,
        ComponentKind::SortedLexicon,
        ComponentKind::TokenStream,
        ComponentKind::Frequencies,
        ComponentKind::ReversedIndex,
        ComponentKind::ReversedOffsets,
        ComponentKind::HuffStream,
        ComponentKind::HuffDescriptor,
        ComponentKind::HuffSync,
        ComponentKind::CompressedRev,
        ComponentKind::CompressedRevOffsets,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// File name suffix appended to the attribute name.
    pub fn suffix(self) -> &'static str {
        match self {
            ComponentKind::Lexicon => ".lexicon",
            ComponentKind::LexiconIndex => ".lexicon.idx",
            ComponentKind::SortedLexicon => ".corpus.srt",
            ComponentKind::TokenStream => ".corpus",
            ComponentKind::Frequencies => ".corpus.cnt",
            ComponentKind::ReversedIndex => ".corpus.rev",
            ComponentKind::ReversedOffsets => ".corpus.rdx",
            ComponentKind::HuffStream => ".huf",
            ComponentKind::HuffDescriptor => ".hcd",
            ComponentKind::HuffSync => ".huf.syn",
            ComponentKind::CompressedRev => ".crc",
            ComponentKind::CompressedRevOffsets => ".crx",
            ComponentKind::StructRanges => ".rng",
            ComponentKind::StructValues => ".avs",
            ComponentKind::StructValueIndex => ".avx",
            ComponentKind::AlignData => ".alg",
        }
    }

    /// Item width of the component's blob.
    pub fn width(self) -> ItemWidth {
        match self {
            ComponentKind::Lexicon
            | ComponentKind::HuffStream
            | ComponentKind::CompressedRev
            | ComponentKind::StructValues => ItemWidth::Byte,
            _ => ItemWidth::Int,
        }
    }

    /// Kinds that must be materialized before this kind can be derived.
    ///
    /// The token stream is not listed: derivations read it from whichever
    /// of the raw or compressed encodings is present.
    pub fn dependencies(self) -> &'static [ComponentKind] {
        match self {
            ComponentKind::SortedLexicon => &[ComponentKind::Lexicon, ComponentKind::LexiconIndex],
            ComponentKind::Frequencies => &[ComponentKind::LexiconIndex],
            ComponentKind::ReversedIndex | ComponentKind::ReversedOffsets => {
                &[ComponentKind::Frequencies]
            }
            ComponentKind::HuffStream | ComponentKind::HuffDescriptor | ComponentKind::HuffSync => {
                &[ComponentKind::Frequencies]
            }
            ComponentKind::CompressedRev | ComponentKind::CompressedRevOffsets => &[
                ComponentKind::Frequencies,
                ComponentKind::ReversedIndex,
                ComponentKind::ReversedOffsets,
            ],
            _ => &[],
        }
    }

    /// Whether the store can derive this kind from other components.
    pub fn is_derived(self) -> bool {
        !self.dependencies().is_empty()
    }

    pub fn name(self) -> &'static str {
        match self {
            ComponentKind::Lexicon => "lexicon",
            ComponentKind::LexiconIndex => "lexicon index",
            ComponentKind::SortedLexicon => "sorted lexicon index",
            ComponentKind::TokenStream => "token stream",
            ComponentKind::Frequencies => "frequency table",
            ComponentKind::ReversedIndex => "reversed index",
            ComponentKind::ReversedOffsets => "reversed index offsets",
            ComponentKind::HuffStream => "compressed token stream",
            ComponentKind::HuffDescriptor => "code descriptor",
            ComponentKind::HuffSync => "sync table",
            ComponentKind::CompressedRev => "compressed reversed index",
            ComponentKind::CompressedRevOffsets => "compressed reversed index offsets",
            ComponentKind::StructRanges => "structure ranges",
            ComponentKind::StructValues => "structure values",
            ComponentKind::StructValueIndex => "structure value index",
            ComponentKind::AlignData => "alignment data",
        }
    }
}

/// Lifecycle state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComponentState {
    /// The attribute's type does not support this kind.
    Undefined,
    /// Supported, but no file exists yet.
    Defined,
    /// Materialized on disk, not mapped.
    Unloaded,
    /// Mapped into memory.
    Loaded,
}

/// One on-disk artifact of an attribute.
#[derive(Debug)]
pub struct Component {
    kind: ComponentKind,
    path: PathBuf,
    state: ComponentState,
    blob: Option<Blob>,
}

impl Component {
    /// Register the expected location of a component.
    pub fn declare<P: AsRef<Path>>(kind: ComponentKind, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = if path.is_file() {
            ComponentState::Unloaded
        } else {
            ComponentState::Defined
        };
        Component {
            kind,
            path,
            state,
            blob: None,
        }
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    /// Whether the component exists on disk.
    pub fn is_materialized(&self) -> bool {
        matches!(self.state, ComponentState::Unloaded | ComponentState::Loaded)
    }

    /// The loaded blob.
    pub fn blob(&self) -> Result<&Blob> {
        self.blob.as_ref().ok_or_else(|| {
            PosattrError::config(format!(
                "{} ({}) is not loaded",
                self.kind.name(),
                self.path.display()
            ))
        })
    }

    /// Re-check the file after a derivation ran: Defined -> Unloaded.
    pub fn mark_created(&mut self) -> Result<()> {
        if self.state == ComponentState::Defined {
            if !self.path.is_file() {
                return Err(PosattrError::storage(format!(
                    "derivation of {} did not produce {}",
                    self.kind.name(),
                    self.path.display()
                )));
            }
            self.state = ComponentState::Unloaded;
        }
        Ok(())
    }

    /// Map the component: Unloaded -> Loaded.
    pub fn load(&mut self) -> Result<()> {
        match self.state {
            ComponentState::Loaded => Ok(()),
            ComponentState::Unloaded => {
                let blob = Blob::acquire(&self.path, self.kind.width(), AccessMode::ReadMap)?;
                debug!("loaded {} from {}", self.kind.name(), self.path.display());
                self.blob = Some(blob);
                self.state = ComponentState::Loaded;
                Ok(())
            }
            ComponentState::Defined => Err(PosattrError::config(format!(
                "{} has not been created ({} is missing)",
                self.kind.name(),
                self.path.display()
            ))),
            ComponentState::Undefined => Err(PosattrError::config(format!(
                "{} is not supported here",
                self.kind.name()
            ))),
        }
    }

    /// Release the blob without deleting the file: Loaded -> Unloaded.
    pub fn unload(&mut self) -> bool {
        if let Some(mut blob) = self.blob.take() {
            blob.release();
            self.state = ComponentState::Unloaded;
            true
        } else {
            false
        }
    }

    /// Release the blob and remove the file: back to Defined.
    pub fn delete(&mut self) -> Result<()> {
        self.unload();
        if self.path.is_file() {
            std::fs::remove_file(&self.path)
                .map_err(|e| PosattrError::io_at(&self.path, "delete", e))?;
        }
        self.state = ComponentState::Defined;
        Ok(())
    }
}

/// Components of one attribute, indexed by kind.
#[derive(Debug)]
pub struct ComponentTable {
    owner: String,
    slots: [Option<Component>; ComponentKind::COUNT],
}

impl ComponentTable {
    /// Create an empty table; every kind starts Undefined.
    pub fn new<S: Into<String>>(owner: S) -> Self {
        ComponentTable {
            owner: owner.into(),
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Declare the given kinds at their canonical paths below `dir`.
    pub fn with_kinds(owner: &str, dir: &Path, kinds: &[ComponentKind]) -> Self {
        let mut table = Self::new(owner);
        for &kind in kinds {
            let path = dir.join(format!("{owner}{}", kind.suffix()));
            table.declare(kind, path);
        }
        table
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Register (or move) the location of `kind`.
    pub fn declare<P: AsRef<Path>>(&mut self, kind: ComponentKind, path: P) {
        if let Some(old) = self.slots[kind.index()].as_mut() {
            old.unload();
        }
        self.slots[kind.index()] = Some(Component::declare(kind, path));
    }

    /// The component of `kind`, or `None` when the kind is not applicable.
    pub fn find(&self, kind: ComponentKind) -> Option<&Component> {
        self.slots[kind.index()].as_ref()
    }

    /// Mutable access to a supported component; fails fast otherwise.
    pub fn get_mut(&mut self, kind: ComponentKind) -> Result<&mut Component> {
        let owner = &self.owner;
        self.slots[kind.index()].as_mut().ok_or_else(|| {
            PosattrError::config(format!(
                "attribute {owner} does not support the {}",
                kind.name()
            ))
        })
    }

    /// Access to a supported component; fails fast otherwise.
    pub fn get(&self, kind: ComponentKind) -> Result<&Component> {
        self.find(kind).ok_or_else(|| {
            PosattrError::config(format!(
                "attribute {} does not support the {}",
                self.owner,
                kind.name()
            ))
        })
    }

    /// Lifecycle state of `kind`.
    pub fn state(&self, kind: ComponentKind) -> ComponentState {
        self.find(kind)
            .map(Component::state)
            .unwrap_or(ComponentState::Undefined)
    }

    /// The loaded blob of `kind`.
    pub fn blob(&self, kind: ComponentKind) -> Result<&Blob> {
        self.get(kind)?.blob()
    }

    /// Load `kind` if it is materialized.
    pub fn load(&mut self, kind: ComponentKind) -> Result<()> {
        self.get_mut(kind)?.load()
    }

    /// Release every loaded component.
    pub fn unload_all(&mut self) -> usize {
        self.slots
            .iter_mut()
            .flatten()
            .filter_map(|c| c.unload().then_some(()))
            .count()
    }

    /// Iterate over the supported components.
    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.slots.iter().flatten()
    }
}
