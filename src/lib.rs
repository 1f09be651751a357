//! # posattr
//!
//! On-disk storage and compression engine for positional corpus attributes.
//!
//! A positional attribute maps every corpus position to an id of a string
//! lexicon. From the encoded base components (lexicon, lexicon index and
//! token stream) the store derives:
//!
//! - a sorted-lexicon index for string lookup
//! - a frequency table
//! - a reversed index, built in bounded memory
//! - an entropy-coded token stream with random access
//! - a Golomb-coded reversed index
//!
//! All integers on disk are 4-byte big-endian. Components are write-once
//! and shared read-only through memory maps.

pub mod attribute;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod encoder;
pub mod error;
pub mod golomb;
pub mod huffman;
pub mod lexicon;
pub mod reversed;
pub mod storage;
pub mod tokens;
pub mod util;

pub mod prelude {
    pub use crate::attribute::component::{ComponentKind, ComponentState};
    pub use crate::attribute::positional::Positional;
    pub use crate::attribute::{Attribute, AttributeInfo};
    pub use crate::config::StoreConfig;
    pub use crate::corpus::{Corpus, CorpusHandle};
    pub use crate::encoder::AttributeEncoder;
    pub use crate::error::{PosattrError, Result};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
