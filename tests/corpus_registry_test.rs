//! Integration tests for the corpus registry and lazy component loading.

use posattr::attribute::component::{ComponentKind, ComponentState};
use posattr::attribute::{Alignment, Attribute, AttributeInfo};
use posattr::config::StoreConfig;
use posattr::corpus;
use posattr::encoder::AttributeEncoder;
use posattr::error::{PosattrError, clear_last_error, last_error};
use tempfile::tempdir;

fn encode(dir: &std::path::Path, name: &str, tokens: &[&str]) {
    let mut encoder = AttributeEncoder::create(dir, name).unwrap();
    for token in tokens {
        encoder.push(token).unwrap();
    }
    encoder.finish().unwrap();
}

#[test]
fn test_handles_share_attributes_and_components() {
    let dir = tempdir().unwrap();
    encode(dir.path(), "word", &["to", "be", "or", "not", "to", "be"]);
    let registry = dir.path().join("registry");

    let reader = corpus::acquire(&registry, "hamlet", dir.path()).unwrap();
    reader.lock().declare_positional("word").unwrap();

    let writer = corpus::acquire(&registry, "hamlet", dir.path()).unwrap();
    assert_eq!(reader.ref_count(), 2);
    {
        let mut corpus = writer.lock();
        let word = corpus.positional_mut("word").unwrap();
        word.ensure(ComponentKind::SortedLexicon, true).unwrap();
        assert_eq!(word.str_to_id("or").unwrap(), Some(2));
    }
    {
        let mut corpus = reader.lock();
        let word = corpus.positional_mut("word").unwrap();
        assert_eq!(word.state(ComponentKind::SortedLexicon), ComponentState::Loaded);
        assert_eq!(word.str_to_id("be").unwrap(), Some(1));
    }

    drop(writer);
    assert_eq!(reader.ref_count(), 1);
    assert_eq!(reader.lock().id(), "hamlet");
}

#[test]
fn test_lazy_loading_never_creates_unrequested() {
    let dir = tempdir().unwrap();
    encode(dir.path(), "lemma", &["go", "go", "went"]);

    let handle = corpus::acquire(dir.path(), "lazy", dir.path()).unwrap();
    let mut corpus = handle.lock();
    corpus.set_config(StoreConfig::default().with_memory_limit(1));
    let lemma = corpus.declare_positional("lemma").unwrap();

    clear_last_error();
    assert!(lemma.frequency(0).is_err());
    assert!(last_error().is_some());
    assert_eq!(lemma.state(ComponentKind::Frequencies), ComponentState::Defined);
    assert!(lemma.postings(0).is_err());
    assert_eq!(lemma.state(ComponentKind::ReversedIndex), ComponentState::Defined);

    lemma.ensure(ComponentKind::ReversedIndex, true).unwrap();
    assert_eq!(lemma.config().memory_limit_items, 1);
    assert_eq!(lemma.frequency(0).unwrap(), 2);
    assert_eq!(lemma.postings(1).unwrap(), vec![2]);
    assert_eq!(lemma.state(ComponentKind::SortedLexicon), ComponentState::Defined);
}

#[test]
fn test_mixed_attribute_kinds() {
    let dir = tempdir().unwrap();
    encode(dir.path(), "word", &["a"]);

    let handle = corpus::acquire(dir.path(), "mixed", dir.path()).unwrap();
    let mut corpus = handle.lock();
    corpus.declare_positional("word").unwrap();
    corpus
        .add_attribute(Attribute::Alignment(Alignment::new(
            "mixed_de",
            dir.path(),
            "mixed_de",
        )))
        .unwrap();

    let names: Vec<&str> = corpus.attributes().map(|a| a.name()).collect();
    assert_eq!(names, vec!["mixed_de", "word"]);

    let alignment = corpus.attribute_mut("mixed_de").unwrap();
    assert_eq!(alignment.kind_name(), "alignment");
    let error = alignment.ensure(ComponentKind::AlignData, true).unwrap_err();
    assert!(matches!(error, PosattrError::Config(_)));
    assert!(alignment.ensure(ComponentKind::Lexicon, false).is_err());

    let word = corpus.attribute_mut("word").unwrap();
    word.ensure(ComponentKind::Frequencies, true).unwrap();
    assert_eq!(corpus.drop_all(), 3);
}
