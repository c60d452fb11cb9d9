use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "object-dump",
    version,
    about = "Dump objects and everything they depend on, dependencies first",
    long_about = "Dump one or more objects together with the objects they reference, in an order that can be loaded back: every object comes after the objects it depends on. Reverse and many-valued relations are followed up to --depth and capped by --limit; forward references are always followed."
)]
pub struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Only log errors and print nothing but the dump
    #[arg(short, long, default_value_t = false, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Dump objects of a type and their related objects
    Dump(DumpArgs),
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct DumpArgs {
    /// Type of the root objects, as group.model
    #[arg(value_name = "GROUP.MODEL")]
    pub root_type: String,
    /// Root identifiers; every object of the type when omitted
    #[arg(value_name = "ID")]
    pub ids: Vec<String>,
    /// JSON store file (falls back to `store` in the config file)
    #[arg(long)]
    pub store: Option<PathBuf>,
    /// TOML configuration file (default: object-dump.toml in the working directory)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// A group or group.model to leave out; repeatable
    #[arg(short, long, value_name = "NAME")]
    pub exclude: Vec<String>,
    /// A group or group.model to restrict related objects to; repeatable
    #[arg(short, long, value_name = "NAME")]
    pub include: Vec<String>,
    /// Depth below which reverse and many-valued relations are followed
    #[arg(long)]
    pub depth: Option<usize>,
    /// Maximum related objects taken from one reverse or many-valued relation (0: no limit)
    #[arg(long)]
    pub limit: Option<usize>,
    /// How root identifiers are parsed
    #[arg(long, value_enum)]
    pub idtype: Option<IdType>,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
    /// Pretty-print JSON with this many spaces
    #[arg(long)]
    pub indent: Option<usize>,
    /// Write polymorphic references as [type, id] pairs
    #[arg(long, default_value_t = false)]
    pub generic_fields: bool,
    /// Print what each object pulled in instead of the dump
    #[arg(long, default_value_t = false)]
    pub debug: bool,
    /// Write the relation map as a DOT file
    #[arg(long)]
    pub dot: Option<PathBuf>,
    /// Draw the DOT file per object or per type
    #[arg(long, value_enum, default_value_t = DotLevelArg::Instance)]
    pub dot_level: DotLevelArg,
    /// DOT: one cluster per group (falls back to `[dot] clusters`, default off)
    #[arg(long, value_enum)]
    pub dot_clusters: Option<OnOff>,
    /// DOT: rank direction (falls back to `[dot] rankdir`, default LR)
    #[arg(long, value_enum)]
    pub dot_rankdir: Option<RankDirArg>,
    /// Write the dump to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IdType {
    Int,
    Str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DotLevelArg {
    Instance,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnOff {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RankDirArg {
    #[value(name = "LR")]
    Lr,
    #[value(name = "TB")]
    Tb,
}

#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn dump_collects_repeated_filters() {
        let cli = Cli::try_parse_from([
            "object-dump", "-vv", "dump", "simpleapp.article", "1", "2", "-e", "auth", "-e",
            "simpleapp.tag", "--depth", "0", "--format", "text",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Dump(args) = cli.command else {
            panic!("expected dump");
        };
        assert_eq!(args.root_type, "simpleapp.article");
        assert_eq!(args.ids, vec!["1", "2"]);
        assert_eq!(args.exclude, vec!["auth", "simpleapp.tag"]);
        assert_eq!(args.depth, Some(0));
        assert_eq!(args.format, Some(OutputFormat::Text));
        assert_eq!(args.dot_level, DotLevelArg::Instance);
        assert_eq!(args.dot_clusters, None);
    }

    #[test]
    fn dot_layout_flags() {
        let cli = Cli::try_parse_from([
            "object-dump", "dump", "a.b", "--dot-clusters", "on", "--dot-rankdir", "TB",
        ])
        .unwrap();
        let Commands::Dump(args) = cli.command else {
            panic!("expected dump");
        };
        assert_eq!(args.dot_clusters, Some(OnOff::On));
        assert_eq!(args.dot_rankdir, Some(RankDirArg::Tb));
        assert!(Cli::try_parse_from(["object-dump", "dump", "a.b", "--dot-rankdir", "RL"]).is_err());
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        assert!(Cli::try_parse_from(["object-dump", "-q", "-v", "dump", "a.b"]).is_err());
    }
}
