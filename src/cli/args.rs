//! Command line argument parsing for the posattr build tool using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// posattr - build and compress positional corpus attributes
#[derive(Parser, Debug, Clone)]
#[command(name = "posattr")]
#[command(about = "Build, compress and inspect positional corpus attributes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct PosattrArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Store configuration file (JSON)
    #[arg(short, long, global = true, value_name = "FILE", env = "POSATTR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl PosattrArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Encode a token list into lexicon, lexicon index and token stream
    Encode(EncodeArgs),

    /// Derive sorted lexicon, frequencies and reversed index
    Makeall(MakeallArgs),

    /// Entropy-code the token stream
    Huffcode(CompressArgs),

    /// Golomb-code the reversed index
    #[command(name = "compress-rdx")]
    CompressRdx(CompressArgs),

    /// Show the components of an attribute
    Info(AttributeArgs),

    /// Print the tokens of a corpus range
    Decode(DecodeArgs),

    /// Look up a word: id, frequency and positions
    Lookup(LookupArgs),
}

/// Location of one attribute
#[derive(Args, Debug, Clone)]
pub struct AttributeArgs {
    /// Data directory of the corpus
    #[arg(short, long, value_name = "DIR")]
    pub dir: PathBuf,

    /// Attribute name
    #[arg(short, long, value_name = "NAME", default_value = "word")]
    pub attr: String,
}

/// Arguments for encoding
#[derive(Parser, Debug, Clone)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub target: AttributeArgs,

    /// Input file with one token per line (stdin when absent)
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,
}

/// Arguments for deriving the uncompressed components
#[derive(Parser, Debug, Clone)]
pub struct MakeallArgs {
    #[command(flatten)]
    pub target: AttributeArgs,

    /// Reversed-index buffer limit in items
    #[arg(short, long, value_name = "ITEMS")]
    pub memory: Option<usize>,
}

/// Arguments for the compression commands
#[derive(Parser, Debug, Clone)]
pub struct CompressArgs {
    #[command(flatten)]
    pub target: AttributeArgs,

    /// Skip decoding the result for comparison
    #[arg(long)]
    pub no_validate: bool,

    /// Delete the uncompressed files after a successful validation
    #[arg(long, conflicts_with = "no_validate")]
    pub delete: bool,
}

/// Arguments for decoding
#[derive(Parser, Debug, Clone)]
pub struct DecodeArgs {
    #[command(flatten)]
    pub target: AttributeArgs,

    /// First position
    #[arg(short, long, default_value = "0")]
    pub start: usize,

    /// Position after the last one (end of corpus when absent)
    #[arg(short, long)]
    pub end: Option<usize>,
}

/// Arguments for lookup
#[derive(Parser, Debug, Clone)]
pub struct LookupArgs {
    #[command(flatten)]
    pub target: AttributeArgs,

    /// Word to look up
    #[arg(value_name = "WORD")]
    pub word: String,

    /// Maximum number of positions to print
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command() {
        let args = PosattrArgs::try_parse_from([
            "posattr", "encode", "--dir", "/data/bnc", "--attr", "lemma", "tokens.txt",
        ])
        .unwrap();

        if let Command::Encode(encode_args) = args.command {
            assert_eq!(encode_args.target.dir, PathBuf::from("/data/bnc"));
            assert_eq!(encode_args.target.attr, "lemma");
            assert_eq!(encode_args.input, Some(PathBuf::from("tokens.txt")));
        } else {
            panic!("Expected Encode command");
        }
    }

    #[test]
    fn test_makeall_memory_limit() {
        let args =
            PosattrArgs::try_parse_from(["posattr", "makeall", "-d", "/data", "--memory", "1000"])
                .unwrap();

        if let Command::Makeall(makeall_args) = args.command {
            assert_eq!(makeall_args.memory, Some(1000));
            assert_eq!(makeall_args.target.attr, "word");
        } else {
            panic!("Expected Makeall command");
        }
    }

    #[test]
    fn test_compress_flags() {
        let args =
            PosattrArgs::try_parse_from(["posattr", "compress-rdx", "-d", "/data", "--delete"])
                .unwrap();
        if let Command::CompressRdx(compress_args) = args.command {
            assert!(compress_args.delete);
            assert!(!compress_args.no_validate);
        } else {
            panic!("Expected CompressRdx command");
        }

        let conflicting = PosattrArgs::try_parse_from([
            "posattr",
            "huffcode",
            "-d",
            "/data",
            "--delete",
            "--no-validate",
        ]);
        assert!(conflicting.is_err());
    }

    #[test]
    fn test_verbosity_levels() {
        // Default verbosity
        let args = PosattrArgs::try_parse_from(["posattr", "info", "-d", "/data"]).unwrap();
        assert_eq!(args.verbosity(), 1);

        // Multiple verbose flags
        let args = PosattrArgs::try_parse_from(["posattr", "-vv", "info", "-d", "/data"]).unwrap();
        assert_eq!(args.verbosity(), 2);

        // Quiet flag
        let args =
            PosattrArgs::try_parse_from(["posattr", "--quiet", "info", "-d", "/data"]).unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_output_format() {
        let args =
            PosattrArgs::try_parse_from(["posattr", "--format", "json", "info", "-d", "/data"])
                .unwrap();
        assert_eq!(args.output_format, OutputFormat::Json);
    }
}
