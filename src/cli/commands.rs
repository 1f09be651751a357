//! Command implementations for the posattr CLI.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use log::info;

use crate::attribute::component::{ComponentKind, ComponentState};
use crate::attribute::positional::Positional;
use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::StoreConfig;
use crate::encoder::AttributeEncoder;
use crate::error::{PosattrError, Result};

/// Execute a CLI command.
pub fn execute_command(args: PosattrArgs) -> Result<()> {
    let config = load_config(&args)?;
    match &args.command {
        Command::Encode(encode_args) => encode(encode_args, &args),
        Command::Makeall(makeall_args) => makeall(makeall_args, config, &args),
        Command::Huffcode(compress_args) => huffcode(compress_args, config, &args),
        Command::CompressRdx(compress_args) => compress_rdx(compress_args, config, &args),
        Command::Info(info_args) => show_info(info_args, config, &args),
        Command::Decode(decode_args) => decode(decode_args, config, &args),
        Command::Lookup(lookup_args) => lookup(lookup_args, config, &args),
    }
}

fn load_config(args: &PosattrArgs) -> Result<StoreConfig> {
    match &args.config {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            StoreConfig::from_file(path)
        }
        None => Ok(StoreConfig::default()),
    }
}

fn open_attribute(target: &AttributeArgs, config: StoreConfig) -> Result<Positional> {
    if !target.dir.is_dir() {
        return Err(PosattrError::config(format!(
            "data directory {} does not exist",
            target.dir.display()
        )));
    }
    Ok(Positional::new(&target.attr, &target.dir, config))
}

/// Encode a token list into the base components.
fn encode(args: &EncodeArgs, cli_args: &PosattrArgs) -> Result<()> {
    let target = &args.target;
    let (reader, source) = match &args.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("cannot open token list {}", path.display()))?;
            (Box::new(BufReader::new(file)) as Box<dyn BufRead>, path.as_path())
        }
        None => (
            Box::new(io::stdin().lock()) as Box<dyn BufRead>,
            Path::new("<stdin>"),
        ),
    };
    fs::create_dir_all(&target.dir)
        .map_err(|e| PosattrError::io_at(&target.dir, "create", e))?;

    let start_time = Instant::now();
    let mut encoder = AttributeEncoder::create(&target.dir, &target.attr)?;
    push_lines(&mut encoder, reader, source)?;
    let summary = encoder.finish()?;
    info!(
        "encoded {} tokens in {}ms",
        summary.tokens,
        start_time.elapsed().as_millis()
    );

    output_result("Attribute encoded", &summary, cli_args)
}

fn push_lines<R: BufRead>(encoder: &mut AttributeEncoder, reader: R, source: &Path) -> Result<()> {
    for line in reader.lines() {
        let line = line.with_context(|| format!("cannot read token list {}", source.display()))?;
        encoder.push(line.strip_suffix('\r').unwrap_or(&line))?;
    }
    Ok(())
}

/// Derive every uncompressed component that does not exist yet.
fn makeall(args: &MakeallArgs, mut config: StoreConfig, cli_args: &PosattrArgs) -> Result<()> {
    if let Some(memory) = args.memory {
        config = config.with_memory_limit(memory);
    }
    let mut attribute = open_attribute(&args.target, config)?;
    let mut created = Vec::new();
    let mut reversed_passes = None;

    for kind in [
        ComponentKind::SortedLexicon,
        ComponentKind::Frequencies,
        ComponentKind::ReversedIndex,
        ComponentKind::ReversedOffsets,
    ] {
        if attribute.state(kind) != ComponentState::Defined {
            continue;
        }
        if kind == ComponentKind::ReversedIndex {
            let had_offsets = attribute.state(ComponentKind::ReversedOffsets);
            reversed_passes = Some(attribute.build_reversed_index()?.passes);
            if had_offsets == ComponentState::Defined {
                created.push(ComponentKind::ReversedOffsets.name().to_string());
            }
        } else {
            attribute.create(kind)?;
        }
        created.push(kind.name().to_string());
    }
    attribute.validate_reversed_offsets()?;

    let result = MakeallResult {
        attribute: args.target.attr.clone(),
        lexicon_size: attribute.lexicon_size()?,
        corpus_size: attribute.corpus_size()?,
        created,
        reversed_passes,
    };
    output_result("Components derived", &result, cli_args)
}

fn compression_config(args: &CompressArgs, config: StoreConfig) -> Result<StoreConfig> {
    let config = StoreConfig {
        validate: config.validate && !args.no_validate,
        delete_uncompressed: config.delete_uncompressed || args.delete,
        ..config
    };
    config.validate()?;
    Ok(config)
}

/// Entropy-code the token stream.
fn huffcode(args: &CompressArgs, config: StoreConfig, cli_args: &PosattrArgs) -> Result<()> {
    let config = compression_config(args, config)?;
    let mut attribute = open_attribute(&args.target, config.clone())?;
    let stats = attribute.compress_token_stream()?;

    let result = HuffcodeResult {
        attribute: args.target.attr.clone(),
        tokens: stats.tokens,
        compressed_bytes: stats.bytes,
        checkpoints: stats.checkpoints,
        bits_per_token: if stats.tokens > 0 {
            stats.bits as f64 / stats.tokens as f64
        } else {
            0.0
        },
        validated: config.validate,
        deleted_uncompressed: attribute.state(ComponentKind::TokenStream)
            == ComponentState::Defined,
    };
    output_result("Token stream compressed", &result, cli_args)
}

/// Golomb-code the reversed index.
fn compress_rdx(args: &CompressArgs, config: StoreConfig, cli_args: &PosattrArgs) -> Result<()> {
    let config = compression_config(args, config)?;
    let mut attribute = open_attribute(&args.target, config.clone())?;
    let stats = attribute.compress_reversed_index()?;

    let result = CompressRdxResult {
        attribute: args.target.attr.clone(),
        ids: stats.ids,
        entries: stats.entries,
        compressed_bytes: stats.bytes,
        bits_per_entry: if stats.entries > 0 {
            (stats.bytes * 8) as f64 / stats.entries as f64
        } else {
            0.0
        },
        validated: config.validate,
        deleted_uncompressed: attribute.state(ComponentKind::ReversedIndex)
            == ComponentState::Defined,
    };
    output_result("Reversed index compressed", &result, cli_args)
}

/// Show the components of an attribute.
fn show_info(args: &AttributeArgs, config: StoreConfig, cli_args: &PosattrArgs) -> Result<()> {
    let attribute = open_attribute(args, config)?;
    let result = AttributeInfoResult {
        attribute: args.attr.clone(),
        dir: args.dir.display().to_string(),
        components: attribute.status(),
    };
    output_result("Attribute components", &result, cli_args)
}

/// Print the tokens of a corpus range.
fn decode(args: &DecodeArgs, config: StoreConfig, cli_args: &PosattrArgs) -> Result<()> {
    let mut attribute = open_attribute(&args.target, config)?;
    let end = args.end.unwrap_or(usize::MAX);
    if end < args.start {
        return Err(PosattrError::invalid_argument(format!(
            "end {end} lies before start {}",
            args.start
        )));
    }

    let ids = attribute.decode_range(args.start, end)?;
    let tokens = ids
        .into_iter()
        .map(|id| attribute.id_to_str(id))
        .collect::<Result<Vec<_>>>()?;

    let result = DecodeResult {
        start: args.start,
        tokens,
    };
    output_result("Tokens", &result, cli_args)
}

/// Look up a word.
fn lookup(args: &LookupArgs, config: StoreConfig, cli_args: &PosattrArgs) -> Result<()> {
    let mut attribute = open_attribute(&args.target, config)?;
    let result = match attribute.str_to_id(&args.word)? {
        Some(id) => {
            let mut positions = attribute.postings(id)?;
            positions.truncate(args.limit);
            LookupResult {
                word: args.word.clone(),
                id: Some(id),
                frequency: attribute.frequency(id)?,
                positions,
            }
        }
        None => LookupResult {
            word: args.word.clone(),
            id: None,
            frequency: 0,
            positions: Vec::new(),
        },
    };
    output_result("Lookup", &result, cli_args)
}
