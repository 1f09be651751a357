//! Integration tests for building and compressing a positional attribute.

use std::fs;
use std::path::Path;

use posattr::attribute::component::{ComponentKind, ComponentState};
use posattr::attribute::positional::Positional;
use posattr::config::StoreConfig;
use posattr::encoder::AttributeEncoder;
use posattr::error::{PosattrError, Result};
use posattr::storage::int_file::{read_int_file, write_int_file};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

fn encode(dir: &Path, name: &str, tokens: &[String]) -> Result<()> {
    let mut encoder = AttributeEncoder::create(dir, name)?;
    for token in tokens {
        encoder.push(token)?;
    }
    encoder.finish()?;
    Ok(())
}

/// A skewed random stream over `types` words.
fn random_tokens(seed: u64, len: usize, types: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| {
            let r: f64 = rng.random();
            format!("t{}", (r * r * r * types as f64) as usize)
        })
        .collect()
}

#[test]
fn test_end_to_end_example() -> Result<()> {
    let dir = tempdir().unwrap();
    let tokens: Vec<String> = ["a", "b", "a", "c"].iter().map(|s| s.to_string()).collect();
    encode(dir.path(), "word", &tokens)?;

    let mut word = Positional::new("word", dir.path(), StoreConfig::default());
    word.ensure(ComponentKind::ReversedIndex, true)?;

    let base = dir.path().join("word");
    assert_eq!(read_int_file(base.with_extension("corpus.cnt"))?, vec![2, 1, 1]);
    assert_eq!(read_int_file(base.with_extension("corpus.rev"))?, vec![0, 2, 1, 3]);
    assert_eq!(read_int_file(base.with_extension("corpus.rdx"))?, vec![0, 2, 3, 4]);

    let stats = word.compress_token_stream()?;
    assert_eq!(stats.tokens, 4);
    // codes of length 1, 2, 2 for ids 0, 1, 2: 1 + 2 + 1 + 2 bits
    assert_eq!(stats.bits, 6);
    assert_eq!(stats.checkpoints, 1);

    word.compress_reversed_index()?;
    assert_eq!(word.postings(0)?, vec![0, 2]);
    assert_eq!(word.postings(1)?, vec![1]);
    assert_eq!(word.postings(2)?, vec![3]);
    Ok(())
}

#[test]
fn test_random_corpus_round_trip() -> Result<()> {
    let dir = tempdir().unwrap();
    let tokens = random_tokens(42, 20_000, 500);
    encode(dir.path(), "word", &tokens)?;

    let config = StoreConfig {
        memory_limit_items: 3_000,
        delete_uncompressed: true,
        ..Default::default()
    };
    let mut word = Positional::new("word", dir.path(), config);
    word.ensure(ComponentKind::SortedLexicon, true)?;
    let stats = word.build_reversed_index()?;
    assert!(stats.passes > 1);
    word.validate_reversed_offsets()?;

    word.compress_token_stream()?;
    word.compress_reversed_index()?;
    assert_eq!(word.state(ComponentKind::TokenStream), ComponentState::Defined);
    assert_eq!(word.state(ComponentKind::ReversedIndex), ComponentState::Defined);

    // reopen from disk: only compressed components remain
    drop(word);
    let mut word = Positional::new("word", dir.path(), StoreConfig::default());
    assert_eq!(word.corpus_size()?, tokens.len());
    for position in [0, 1, 127, 128, 129, 12_345, tokens.len() - 1] {
        let id = word.id_at(position)?;
        assert_eq!(word.id_to_str(id)?, tokens[position]);
    }

    let mut total = 0usize;
    for id in 0..word.lexicon_size()? as u32 {
        let word_string = word.id_to_str(id)?;
        assert_eq!(word.str_to_id(&word_string)?, Some(id));

        let postings = word.postings(id)?;
        assert_eq!(postings.len(), word.frequency(id)? as usize);
        assert!(postings.windows(2).all(|w| w[0] < w[1]));
        assert!(postings.iter().all(|&p| tokens[p as usize] == word_string));
        total += postings.len();
    }
    assert_eq!(total, tokens.len());
    Ok(())
}

#[test]
fn test_memory_limit_does_not_change_output() -> Result<()> {
    let tokens = random_tokens(7, 5_000, 80);
    let mut files = Vec::new();

    for limit in [1, usize::MAX] {
        let dir = tempdir().unwrap();
        encode(dir.path(), "word", &tokens)?;
        let mut word = Positional::new(
            "word",
            dir.path(),
            StoreConfig::default().with_memory_limit(limit),
        );
        word.build_reversed_index()?;
        files.push((
            fs::read(dir.path().join("word.corpus.rev")).unwrap(),
            fs::read(dir.path().join("word.corpus.rdx")).unwrap(),
        ));
    }

    assert_eq!(files[0], files[1]);
    Ok(())
}

#[test]
fn test_out_of_range_id_is_rejected_before_writing() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("word.lexicon"), b"a\0b\0c\0").unwrap();
    write_int_file(dir.path().join("word.lexicon.idx"), &[0, 2, 4]).unwrap();
    write_int_file(dir.path().join("word.corpus"), &[0, 1, 3, 2]).unwrap();

    let mut word = Positional::new("word", dir.path(), StoreConfig::default());
    let error = word.create(ComponentKind::Frequencies).unwrap_err();
    assert!(matches!(error, PosattrError::Corruption(_)));
    assert!(error.is_fatal());
    assert!(!dir.path().join("word.corpus.cnt").exists());
    assert_eq!(word.state(ComponentKind::Frequencies), ComponentState::Defined);
}

#[test]
fn test_empty_corpus() -> Result<()> {
    let dir = tempdir().unwrap();
    encode(dir.path(), "word", &[])?;

    let mut word = Positional::new("word", dir.path(), StoreConfig::default());
    word.ensure(ComponentKind::ReversedIndex, true)?;
    word.validate_reversed_offsets()?;
    let stats = word.compress_token_stream()?;
    assert_eq!(stats.tokens, 0);
    assert_eq!(word.corpus_size()?, 0);
    assert!(word.decode_range(0, 10)?.is_empty());
    Ok(())
}

#[test]
fn test_compression_without_validation_keeps_sources() -> Result<()> {
    let dir = tempdir().unwrap();
    encode(dir.path(), "word", &random_tokens(3, 1_000, 20))?;

    let config = StoreConfig {
        validate: false,
        ..Default::default()
    };
    let mut word = Positional::new("word", dir.path(), config);
    word.compress_token_stream()?;
    word.compress_reversed_index()?;
    assert!(dir.path().join("word.corpus").exists());
    assert!(dir.path().join("word.corpus.rev").exists());
    assert!(dir.path().join("word.crx").exists());
    Ok(())
}
