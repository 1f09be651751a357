//! Positional attributes: one lexicon id per corpus position.
//!
//! A [`Positional`] owns the component table of one attribute and knows how
//! to derive every derived kind from the components it depends on. Nothing
//! is derived unless a caller asks for it through [`Positional::ensure`] with
//! `try_create` set, or through [`Positional::create`] directly.

use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;

use crate::attribute::component::{ComponentKind, ComponentState, ComponentTable};
use crate::config::{MAX_WIRE_VALUE, StoreConfig};
use crate::error::{PosattrError, Result, remember};
use crate::golomb::{self, CompressedPostings, GolombStats};
use crate::huffman::{self, CodeDescriptor, HuffmanPaths, HuffmanReader, HuffmanStats};
use crate::lexicon::{self, Lexicon};
use crate::reversed::{self, ReversedBuildStats, ReversedIndex};
use crate::storage::blob::Blob;
use crate::tokens::TokenSource;

const HUFFMAN_KINDS: [ComponentKind; 3] = [
    ComponentKind::HuffStream,
    ComponentKind::HuffDescriptor,
    ComponentKind::HuffSync,
];

const COMPRESSED_REV_KINDS: [ComponentKind; 2] = [
    ComponentKind::CompressedRev,
    ComponentKind::CompressedRevOffsets,
];

/// One row of [`Positional::status`].
#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    pub kind: ComponentKind,
    pub name: &'static str,
    pub path: PathBuf,
    pub state: ComponentState,
    /// File size in bytes, if the file exists.
    pub bytes: Option<u64>,
}

/// The token stream in whichever encoding is available.
enum Tokens<'a> {
    Raw(&'a Blob),
    Compressed(HuffmanReader<'a>),
}

impl Tokens<'_> {
    fn source(&self) -> &dyn TokenSource {
        match self {
            Tokens::Raw(blob) => *blob,
            Tokens::Compressed(reader) => reader,
        }
    }
}

/// A positional attribute and its components.
#[derive(Debug)]
pub struct Positional {
    name: String,
    dir: PathBuf,
    components: ComponentTable,
    config: StoreConfig,
    descriptor: Option<CodeDescriptor>,
}

impl Positional {
    /// Declare every positional kind at its canonical path below `dir`.
    pub fn new<P: AsRef<Path>>(name: &str, dir: P, config: StoreConfig) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let components = ComponentTable::with_kinds(name, &dir, &ComponentKind::POSITIONAL);
        Positional {
            name: name.to_string(),
            dir,
            components,
            config,
            descriptor: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn components(&self) -> &ComponentTable {
        &self.components
    }

    /// Lifecycle state of `kind`; non-positional kinds are Undefined.
    pub fn state(&self, kind: ComponentKind) -> ComponentState {
        self.components.state(kind)
    }

    /// Move the expected location of `kind`.
    pub fn declare<P: AsRef<Path>>(&mut self, kind: ComponentKind, path: P) -> Result<()> {
        if !ComponentKind::POSITIONAL.contains(&kind) {
            return remember(Err(PosattrError::config(format!(
                "positional attribute {} cannot hold the {}",
                self.name,
                kind.name()
            ))));
        }
        if kind == ComponentKind::HuffDescriptor {
            self.descriptor = None;
        }
        self.components.declare(kind, path);
        Ok(())
    }

    /// The loaded blob of `kind`.
    pub fn blob(&self, kind: ComponentKind) -> Result<&Blob> {
        self.components.blob(kind)
    }

    /// Map `kind` if it exists on disk.
    pub fn load(&mut self, kind: ComponentKind) -> Result<()> {
        remember(self.components.load(kind))
    }

    /// Make sure `kind` is loaded, deriving it first when it is missing and
    /// `try_create` is set.
    pub fn ensure(&mut self, kind: ComponentKind, try_create: bool) -> Result<()> {
        let result = self.ensure_loaded(kind, try_create);
        remember(result)
    }

    fn ensure_loaded(&mut self, kind: ComponentKind, try_create: bool) -> Result<()> {
        match self.components.state(kind) {
            ComponentState::Loaded => Ok(()),
            ComponentState::Unloaded => self.components.load(kind),
            ComponentState::Defined if try_create => {
                self.create(kind)?;
                self.components.load(kind)
            }
            ComponentState::Defined => Err(PosattrError::config(format!(
                "{} of attribute {} does not exist ({})",
                kind.name(),
                self.name,
                self.components.get(kind)?.path().display()
            ))),
            ComponentState::Undefined => Err(PosattrError::config(format!(
                "positional attribute {} does not support the {}",
                self.name,
                kind.name()
            ))),
        }
    }

    /// Derive `kind` from its dependencies, leaving it Unloaded.
    ///
    /// Components are write-once: creating one that already exists fails.
    pub fn create(&mut self, kind: ComponentKind) -> Result<()> {
        let result = self.create_component(kind);
        remember(result)
    }

    fn create_component(&mut self, kind: ComponentKind) -> Result<()> {
        match self.components.state(kind) {
            ComponentState::Defined => {}
            ComponentState::Undefined => {
                return Err(PosattrError::config(format!(
                    "positional attribute {} does not support the {}",
                    self.name,
                    kind.name()
                )));
            }
            ComponentState::Unloaded | ComponentState::Loaded => {
                return Err(PosattrError::config(format!(
                    "{} of attribute {} already exists",
                    kind.name(),
                    self.name
                )));
            }
        }
        if !kind.is_derived() {
            return Err(PosattrError::config(format!(
                "{} of attribute {} is a base component and must be encoded",
                kind.name(),
                self.name
            )));
        }
        for &dependency in kind.dependencies() {
            self.ensure_loaded(dependency, true)?;
        }

        match kind {
            ComponentKind::SortedLexicon => {
                self.ensure_loaded(ComponentKind::Lexicon, false)?;
                let out = self.path_of(kind)?;
                let lexicon = Lexicon::new(
                    self.components.blob(ComponentKind::Lexicon)?,
                    self.components.blob(ComponentKind::LexiconIndex)?,
                );
                lexicon::compute_sorted_lexicon(&lexicon, &out)?;
            }
            ComponentKind::Frequencies => {
                self.prepare_tokens()?;
                let out = self.path_of(kind)?;
                let size = self.components.blob(ComponentKind::LexiconIndex)?.items();
                let tokens = self.tokens()?;
                lexicon::compute_frequencies(
                    tokens.source(),
                    size,
                    self.config.frequency_block_items,
                    &out,
                )?;
            }
            ComponentKind::ReversedOffsets => {
                let frequencies = self.frequency_table()?;
                reversed::write_offsets(&frequencies, &self.path_of(kind)?)?;
            }
            ComponentKind::ReversedIndex => {
                self.build_reversed_index()?;
                return Ok(());
            }
            ComponentKind::HuffStream | ComponentKind::HuffDescriptor | ComponentKind::HuffSync => {
                self.compress_token_stream()?;
                return Ok(());
            }
            ComponentKind::CompressedRev | ComponentKind::CompressedRevOffsets => {
                self.compress_reversed_index()?;
                return Ok(());
            }
            ComponentKind::Lexicon
            | ComponentKind::LexiconIndex
            | ComponentKind::TokenStream
            | ComponentKind::StructRanges
            | ComponentKind::StructValues
            | ComponentKind::StructValueIndex
            | ComponentKind::AlignData => {
                return Err(PosattrError::config(format!(
                    "{} cannot be derived",
                    kind.name()
                )));
            }
        }
        self.components.get_mut(kind)?.mark_created()
    }

    fn path_of(&self, kind: ComponentKind) -> Result<PathBuf> {
        Ok(self.components.get(kind)?.path().to_path_buf())
    }

    fn require_defined(&self, kinds: &[ComponentKind]) -> Result<()> {
        for &kind in kinds {
            if self.components.state(kind) != ComponentState::Defined {
                return Err(PosattrError::config(format!(
                    "{} of attribute {} already exists",
                    kind.name(),
                    self.name
                )));
            }
        }
        Ok(())
    }

    fn is_materialized(&self, kind: ComponentKind) -> bool {
        self.components
            .find(kind)
            .is_some_and(|c| c.is_materialized())
    }

    fn has_compressed_tokens(&self) -> bool {
        HUFFMAN_KINDS.iter().all(|&kind| self.is_materialized(kind))
    }

    /// Load whichever token stream encoding exists, preferring the raw one.
    fn prepare_tokens(&mut self) -> Result<()> {
        if self.is_materialized(ComponentKind::TokenStream) {
            return self.components.load(ComponentKind::TokenStream);
        }
        if !self.has_compressed_tokens() {
            return Err(PosattrError::config(format!(
                "attribute {} has neither a token stream nor a compressed token stream",
                self.name
            )));
        }
        for kind in HUFFMAN_KINDS {
            self.components.load(kind)?;
        }
        if self.descriptor.is_none() {
            let bytes = self
                .components
                .blob(ComponentKind::HuffDescriptor)?
                .as_bytes();
            self.descriptor = Some(CodeDescriptor::from_bytes(bytes)?);
        }
        Ok(())
    }

    /// The token stream prepared by [`Self::prepare_tokens`].
    fn tokens(&self) -> Result<Tokens<'_>> {
        if self.components.state(ComponentKind::TokenStream) == ComponentState::Loaded {
            return Ok(Tokens::Raw(
                self.components.blob(ComponentKind::TokenStream)?,
            ));
        }
        Ok(Tokens::Compressed(self.compressed_reader()?))
    }

    fn frequency_table(&mut self) -> Result<Vec<u32>> {
        self.ensure_loaded(ComponentKind::Frequencies, false)?;
        Ok(self
            .components
            .blob(ComponentKind::Frequencies)?
            .ints()
            .collect())
    }

    /// Build the postings file of the reversed index, and its offsets if
    /// they are missing.
    pub fn build_reversed_index(&mut self) -> Result<ReversedBuildStats> {
        let result = self.build_reversed_index_inner();
        remember(result)
    }

    fn build_reversed_index_inner(&mut self) -> Result<ReversedBuildStats> {
        self.require_defined(&[ComponentKind::ReversedIndex])?;
        self.ensure_loaded(ComponentKind::Frequencies, true)?;
        if self.components.state(ComponentKind::ReversedOffsets) == ComponentState::Defined {
            self.create_component(ComponentKind::ReversedOffsets)?;
        }
        let frequencies = self.frequency_table()?;
        self.prepare_tokens()?;

        let out = self.path_of(ComponentKind::ReversedIndex)?;
        let stats = {
            let tokens = self.tokens()?;
            reversed::build_reversed_index(
                tokens.source(),
                &frequencies,
                self.config.buffer_limit(),
                &out,
            )?
        };
        self.components
            .get_mut(ComponentKind::ReversedIndex)?
            .mark_created()?;
        Ok(stats)
    }

    /// Check the reversed-index offsets against the frequency table and the
    /// corpus size.
    pub fn validate_reversed_offsets(&mut self) -> Result<()> {
        let result = self.validate_offsets_inner();
        remember(result)
    }

    fn validate_offsets_inner(&mut self) -> Result<()> {
        let frequencies = self.frequency_table()?;
        let corpus_size = self.corpus_size()?;
        self.ensure_loaded(ComponentKind::ReversedOffsets, false)?;
        let offsets: Vec<u32> = self
            .components
            .blob(ComponentKind::ReversedOffsets)?
            .ints()
            .collect();
        reversed::validate_offsets(&frequencies, &offsets, corpus_size)
    }

    /// Entropy-code the token stream. With validation enabled, the result
    /// is decoded and compared with the raw stream before the raw stream
    /// may be deleted.
    pub fn compress_token_stream(&mut self) -> Result<HuffmanStats> {
        let result = self.compress_token_stream_inner();
        remember(result)
    }

    fn compress_token_stream_inner(&mut self) -> Result<HuffmanStats> {
        self.require_defined(&HUFFMAN_KINDS)?;
        self.ensure_loaded(ComponentKind::Frequencies, true)?;
        self.ensure_loaded(ComponentKind::TokenStream, false)?;
        let frequencies = self.frequency_table()?;

        let stream = self.path_of(ComponentKind::HuffStream)?;
        let descriptor_path = self.path_of(ComponentKind::HuffDescriptor)?;
        let sync = self.path_of(ComponentKind::HuffSync)?;
        let (descriptor, stats) = huffman::compress(
            self.components.blob(ComponentKind::TokenStream)?,
            &frequencies,
            HuffmanPaths {
                stream: &stream,
                descriptor: &descriptor_path,
                sync: &sync,
            },
        )?;
        for kind in HUFFMAN_KINDS {
            self.components.get_mut(kind)?.mark_created()?;
        }
        self.descriptor = Some(descriptor);

        if self.config.validate {
            for kind in HUFFMAN_KINDS {
                self.components.load(kind)?;
            }
            let reader = self.compressed_reader()?;
            huffman::validate(&reader, self.components.blob(ComponentKind::TokenStream)?)?;
            if self.config.delete_uncompressed {
                info!("deleting uncompressed token stream of {}", self.name);
                self.components
                    .get_mut(ComponentKind::TokenStream)?
                    .delete()?;
            }
        } else if self.config.delete_uncompressed {
            warn!(
                "keeping uncompressed token stream of {}: validation is disabled",
                self.name
            );
        }
        Ok(stats)
    }

    fn compressed_reader(&self) -> Result<HuffmanReader<'_>> {
        let descriptor = self.descriptor.as_ref().ok_or_else(|| {
            PosattrError::config(format!(
                "token stream of attribute {} is not loaded",
                self.name
            ))
        })?;
        HuffmanReader::new(
            descriptor,
            self.components.blob(ComponentKind::HuffStream)?,
            self.components.blob(ComponentKind::HuffSync)?,
        )
    }

    /// Golomb-code the reversed index. With validation enabled, every id's
    /// postings are decoded and compared before the uncompressed index may
    /// be deleted.
    pub fn compress_reversed_index(&mut self) -> Result<GolombStats> {
        let result = self.compress_reversed_index_inner();
        remember(result)
    }

    fn compress_reversed_index_inner(&mut self) -> Result<GolombStats> {
        self.require_defined(&COMPRESSED_REV_KINDS)?;
        for &dependency in ComponentKind::CompressedRev.dependencies() {
            self.ensure_loaded(dependency, true)?;
        }
        let corpus_size = self.corpus_size_u32()?;

        let stream = self.path_of(ComponentKind::CompressedRev)?;
        let offsets = self.path_of(ComponentKind::CompressedRevOffsets)?;
        let stats = {
            let index = ReversedIndex::new(
                self.components.blob(ComponentKind::ReversedIndex)?,
                self.components.blob(ComponentKind::ReversedOffsets)?,
            );
            golomb::compress_reversed_index(
                &index,
                self.components.blob(ComponentKind::Frequencies)?,
                corpus_size,
                &stream,
                &offsets,
            )?
        };
        for kind in COMPRESSED_REV_KINDS {
            self.components.get_mut(kind)?.mark_created()?;
        }

        if self.config.validate {
            self.validate_compressed_reversed_index_inner()?;
        } else if self.config.delete_uncompressed {
            warn!(
                "keeping uncompressed reversed index of {}: validation is disabled",
                self.name
            );
        }
        Ok(stats)
    }

    /// Decode the compressed reversed index and compare it with the
    /// uncompressed one. Only a passing comparison lets
    /// `delete_uncompressed` remove `.rev` and `.rdx`.
    pub fn validate_compressed_reversed_index(&mut self) -> Result<()> {
        let result = self.validate_compressed_reversed_index_inner();
        remember(result)
    }

    fn validate_compressed_reversed_index_inner(&mut self) -> Result<()> {
        let corpus_size = self.corpus_size_u32()?;
        for kind in [
            ComponentKind::Frequencies,
            ComponentKind::ReversedIndex,
            ComponentKind::ReversedOffsets,
            ComponentKind::CompressedRev,
            ComponentKind::CompressedRevOffsets,
        ] {
            self.ensure_loaded(kind, false)?;
        }
        {
            let compressed = CompressedPostings::new(
                self.components.blob(ComponentKind::CompressedRev)?,
                self.components.blob(ComponentKind::CompressedRevOffsets)?,
                self.components.blob(ComponentKind::Frequencies)?,
                corpus_size,
            )?;
            let index = ReversedIndex::new(
                self.components.blob(ComponentKind::ReversedIndex)?,
                self.components.blob(ComponentKind::ReversedOffsets)?,
            );
            golomb::validate(&compressed, &index)?;
        }
        if self.config.delete_uncompressed {
            info!("deleting uncompressed reversed index of {}", self.name);
            for kind in [ComponentKind::ReversedIndex, ComponentKind::ReversedOffsets] {
                self.components.get_mut(kind)?.delete()?;
            }
        }
        Ok(())
    }

    /// Release `kind` without deleting its file. Returns whether it was
    /// loaded.
    pub fn drop_component(&mut self, kind: ComponentKind) -> Result<bool> {
        let component = remember(self.components.get_mut(kind))?;
        let released = component.unload();
        if released && kind == ComponentKind::HuffDescriptor {
            self.descriptor = None;
        }
        Ok(released)
    }

    /// Release every loaded component.
    pub fn drop_all(&mut self) -> usize {
        self.descriptor = None;
        self.components.unload_all()
    }

    /// Every positional kind with its state and file size.
    pub fn status(&self) -> Vec<ComponentStatus> {
        self.components
            .iter()
            .map(|component| ComponentStatus {
                kind: component.kind(),
                name: component.kind().name(),
                path: component.path().to_path_buf(),
                state: component.state(),
                bytes: std::fs::metadata(component.path()).ok().map(|m| m.len()),
            })
            .collect()
    }

    /// Number of lexicon entries.
    pub fn lexicon_size(&mut self) -> Result<usize> {
        remember(self.ensure_loaded(ComponentKind::LexiconIndex, false))?;
        Ok(self.components.blob(ComponentKind::LexiconIndex)?.items())
    }

    /// Number of corpus positions, taken from the raw stream, the
    /// compressed stream or the frequency table, whichever exists. Only the
    /// absence of both stream encodings falls back to the frequency table.
    pub fn corpus_size(&mut self) -> Result<usize> {
        if self.is_materialized(ComponentKind::TokenStream) || self.has_compressed_tokens() {
            remember(self.prepare_tokens())?;
            return Ok(self.tokens()?.source().token_count());
        }
        let total: u64 = self.frequency_table()?.iter().map(|&f| f as u64).sum();
        Ok(total as usize)
    }

    fn corpus_size_u32(&mut self) -> Result<u32> {
        let size = self.corpus_size()? as u64;
        if size > MAX_WIRE_VALUE {
            return Err(PosattrError::limit(format!(
                "corpus of {size} tokens exceeds {MAX_WIRE_VALUE}"
            )));
        }
        Ok(size as u32)
    }

    /// The string of lexicon id `id`.
    pub fn id_to_str(&mut self, id: u32) -> Result<String> {
        remember(self.ensure_loaded(ComponentKind::Lexicon, false))?;
        remember(self.ensure_loaded(ComponentKind::LexiconIndex, false))?;
        let lexicon = Lexicon::new(
            self.components.blob(ComponentKind::Lexicon)?,
            self.components.blob(ComponentKind::LexiconIndex)?,
        );
        remember(lexicon.get_str(id).map(str::to_string))
    }

    /// The id of `word`, or `None` if it is not in the lexicon.
    pub fn str_to_id(&mut self, word: &str) -> Result<Option<u32>> {
        for kind in [
            ComponentKind::Lexicon,
            ComponentKind::LexiconIndex,
            ComponentKind::SortedLexicon,
        ] {
            remember(self.ensure_loaded(kind, false))?;
        }
        let lexicon = Lexicon::new(
            self.components.blob(ComponentKind::Lexicon)?,
            self.components.blob(ComponentKind::LexiconIndex)?,
        );
        remember(lexicon.find(
            self.components.blob(ComponentKind::SortedLexicon)?,
            word.as_bytes(),
        ))
    }

    /// The id at corpus position `position`.
    pub fn id_at(&mut self, position: usize) -> Result<u32> {
        remember(self.prepare_tokens())?;
        let id = match self.tokens()? {
            Tokens::Raw(blob) => blob.int(position).ok_or_else(|| {
                PosattrError::invalid_argument(format!(
                    "position {position} is beyond the corpus of {} tokens",
                    blob.items()
                ))
            }),
            Tokens::Compressed(reader) => reader.get(position),
        };
        remember(id)
    }

    /// Ids of positions `start..end`, clamped to the corpus.
    pub fn decode_range(&mut self, start: usize, end: usize) -> Result<Vec<u32>> {
        remember(self.prepare_tokens())?;
        match self.tokens()? {
            Tokens::Raw(blob) => {
                let end = end.min(blob.items());
                Ok((start.min(end)..end).filter_map(|i| blob.int(i)).collect())
            }
            Tokens::Compressed(reader) => remember(reader.decode_range(start, end)),
        }
    }

    /// Occurrence count of `id`.
    pub fn frequency(&mut self, id: u32) -> Result<u32> {
        remember(self.ensure_loaded(ComponentKind::Frequencies, false))?;
        let blob = self.components.blob(ComponentKind::Frequencies)?;
        remember(blob.int(id as usize).ok_or_else(|| {
            PosattrError::invalid_argument(format!(
                "id {id} is outside the frequency table of {} ids",
                blob.items()
            ))
        }))
    }

    /// Ascending positions of `id`, from the compressed reversed index when
    /// it exists.
    pub fn postings(&mut self, id: u32) -> Result<Vec<u32>> {
        let result = self.postings_inner(id);
        remember(result)
    }

    fn postings_inner(&mut self, id: u32) -> Result<Vec<u32>> {
        if COMPRESSED_REV_KINDS.iter().all(|&kind| self.is_materialized(kind)) {
            let corpus_size = self.corpus_size_u32()?;
            for kind in [
                ComponentKind::Frequencies,
                ComponentKind::CompressedRev,
                ComponentKind::CompressedRevOffsets,
            ] {
                self.ensure_loaded(kind, false)?;
            }
            return CompressedPostings::new(
                self.components.blob(ComponentKind::CompressedRev)?,
                self.components.blob(ComponentKind::CompressedRevOffsets)?,
                self.components.blob(ComponentKind::Frequencies)?,
                corpus_size,
            )?
            .postings(id);
        }
        self.ensure_loaded(ComponentKind::ReversedIndex, false)?;
        self.ensure_loaded(ComponentKind::ReversedOffsets, false)?;
        ReversedIndex::new(
            self.components.blob(ComponentKind::ReversedIndex)?,
            self.components.blob(ComponentKind::ReversedOffsets)?,
        )
        .postings(id)
    }
}
