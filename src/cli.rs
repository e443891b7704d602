use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "snfs-defrag")]
#[command(about = "Batch automation around the snfsdefrag utility", long_about = None)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the snfsdefrag executable
    #[arg(long, global = true)]
    pub executable: Option<PathBuf>,

    /// Override the worklist file
    #[arg(long, global = true)]
    pub worklist: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List files fragmented enough to defragment
    ListCandidates {
        /// Files or directories to inspect
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Recurse into directories
        #[arg(short, long)]
        recursive: bool,

        /// Include extent counts and messages
        #[arg(short, long)]
        verbose: bool,

        /// Minimum extent count for a candidate
        #[arg(short = 'm', long)]
        min_extents: Option<u32>,

        /// Print the utility's output untouched
        #[arg(long)]
        raw: bool,
    },

    /// List the extents of fragmented files
    ListExtents {
        /// Files or directories to inspect
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Recurse into directories
        #[arg(short, long)]
        recursive: bool,

        /// Print the utility's output untouched
        #[arg(long)]
        raw: bool,
    },

    /// Count extents per file
    CountExtents {
        /// Files or directories to inspect
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Recurse into directories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Defragment a single file now, ignoring business hours
    Defrag {
        /// File to defragment
        path: PathBuf,

        /// Only move data on this stripe group
        #[arg(short = 'G', long)]
        stripe_group: Option<String>,

        /// Move data onto stripe groups with this affinity key
        #[arg(short = 'k', long)]
        affinity_key: Option<String>,

        /// Verbose utility output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Release unused preallocated space of a file
    Prune {
        /// File to prune
        path: PathBuf,
    },

    /// Append defragmentation candidates to the worklist
    Enqueue {
        /// Files or directories to scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Recurse into directories
        #[arg(short, long)]
        recursive: bool,

        /// Minimum extent count for a candidate
        #[arg(short = 'm', long)]
        min_extents: Option<u32>,
    },

    /// Defragment every file in the worklist
    Batch,

    /// Print the effective configuration
    ShowConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_list_candidates() {
        let cli = Cli::parse_from(["snfs-defrag", "--json", "list-candidates", "-r", "-v", "-m", "4", "/stornext/a", "/stornext/b c"]);
        assert!(cli.json);
        match cli.command {
            Commands::ListCandidates { paths, recursive, verbose, min_extents, raw } => {
                assert_eq!(paths, vec![PathBuf::from("/stornext/a"), PathBuf::from("/stornext/b c")]);
                assert!(recursive && verbose && !raw);
                assert_eq!(min_extents, Some(4));
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_parse_defrag_migration_flags() {
        let cli = Cli::parse_from(["snfs-defrag", "defrag", "-G", "sg1", "-k", "fast", "/stornext/f"]);
        match cli.command {
            Commands::Defrag { path, stripe_group, affinity_key, verbose } => {
                assert_eq!(path, PathBuf::from("/stornext/f"));
                assert_eq!(stripe_group.as_deref(), Some("sg1"));
                assert_eq!(affinity_key.as_deref(), Some("fast"));
                assert!(!verbose);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_global_overrides_after_subcommand() {
        let cli = Cli::parse_from(["snfs-defrag", "batch", "--worklist", "/tmp/q.txt"]);
        assert!(matches!(cli.command, Commands::Batch));
        assert_eq!(cli.worklist, Some(PathBuf::from("/tmp/q.txt")));
    }

    #[test]
    fn test_listing_requires_paths() {
        assert!(Cli::try_parse_from(["snfs-defrag", "list-extents"]).is_err());
    }
}
