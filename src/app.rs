use crate::cli::{Cli, Commands, DotLevelArg, DumpArgs, IdType, OnOff, OutputFormat, RankDirArg};
use crate::dump::{DumpRequest, DumpResult, ObjectDump};
use crate::errors::DumpError;
use crate::model::{EntityId, TypeName};
use crate::registry::TypeConfigRegistry;
use crate::serializer::{Encoder, JsonEncoder, ObjectSerializer, TextEncoder};
use crate::store::Store;
use crate::utils::config::{load_config_at, load_config_near, Config};
use crate::visualization::{DotGenerator, DotLevel, DotOptions, RankDir};
use clap::CommandFactory;
use clap_complete::generate;
use log::info;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Why a dump did not happen: bad invocation (exit 2) or a failed run (exit 1).
#[derive(Debug)]
enum Failure {
    Usage(String),
    Run(DumpError),
}

impl From<DumpError> for Failure {
    fn from(e: DumpError) -> Self {
        Failure::Run(e)
    }
}

/// Run the CLI logic in-process.
///
/// Returns an exit code (0 = success).
#[must_use]
pub fn run_cli(cli: Cli) -> i32 {
    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let mut out = io::stdout();
            generate(shell, &mut cmd, "object-dump", &mut out);
            0
        }
        Commands::Dump(args) => match dump(args, cli.quiet) {
            Ok(()) => 0,
            Err(Failure::Usage(msg)) => {
                eprintln!("error: {msg}");
                2
            }
            Err(Failure::Run(e)) => {
                eprintln!("error: {e}");
                1
            }
        },
    }
}

fn dump(args: DumpArgs, quiet: bool) -> Result<(), Failure> {
    let cfg = match &args.config {
        Some(path) => load_config_at(path)?,
        None => load_config_near(Path::new(".")).unwrap_or_default(),
    };
    let Some(store_path) = args.store.clone().or_else(|| cfg.store.as_ref().map(PathBuf::from)) else {
        return Err(Failure::Usage("no store given: pass --store or set `store` in the config".into()));
    };
    let settings = Settings::resolve(&args, &cfg)?;
    let dot_opts = dot_options(&args, &cfg)?;
    let root_type = TypeName::parse(&args.root_type).map_err(|e| Failure::Usage(e.to_string()))?;
    let ids = parse_ids(&args.ids, settings.idtype)?;

    let store = Store::load(&store_path)?;
    info!("loaded {} object(s) from {}", store.len(), store_path.display());
    let registry = TypeConfigRegistry::from_settings(&cfg.types, &store)?;

    let request = DumpRequest {
        root_type,
        ids,
        exclude: args.exclude.clone(),
        include: args.include.clone(),
        max_depth: settings.depth,
        limit: settings.limit,
    };
    let result = ObjectDump::new(&store, &registry).run(&request)?;

    if let Some(dot_path) = &args.dot {
        let dot = DotGenerator::new().generate_dot_with_options(&result.edges(), dot_opts);
        fs::write(dot_path, dot).map_err(DumpError::from)?;
        if !quiet {
            eprintln!("Wrote DOT to {}", dot_path.display());
        }
    }

    let bytes = if args.debug {
        relation_report(&result).into_bytes()
    } else {
        let mut serializer = ObjectSerializer::new(&store, registry.field_rules(), settings.generic_fields);
        let records = serializer.serialize(result.sorted.iter().map(|e| &**e));
        let encoder: Box<dyn Encoder> = match settings.format {
            OutputFormat::Json => Box::new(JsonEncoder { indent: settings.indent }),
            OutputFormat::Text => Box::new(TextEncoder),
        };
        let mut buf = Vec::new();
        encoder.encode(&records, &mut buf)?;
        buf
    };

    match &args.output {
        Some(path) => {
            fs::write(path, &bytes).map_err(DumpError::from)?;
            if !quiet {
                eprintln!("Wrote {} object(s) to {}", result.sorted.len(), path.display());
            }
        }
        None => io::stdout().lock().write_all(&bytes).map_err(DumpError::from)?,
    }
    Ok(())
}

/// Effective dump settings: command line first, then `[dump]` from the config, then defaults.
#[derive(Debug, Clone, Copy)]
struct Settings {
    format: OutputFormat,
    indent: Option<usize>,
    depth: Option<usize>,
    limit: Option<usize>,
    generic_fields: bool,
    idtype: IdType,
}

impl Settings {
    fn resolve(args: &DumpArgs, cfg: &Config) -> Result<Self, Failure> {
        let d = cfg.dump.clone().unwrap_or_default();
        let format = match (args.format, d.format.as_deref()) {
            (Some(f), _) => f,
            (None, None | Some("json")) => OutputFormat::Json,
            (None, Some("text")) => OutputFormat::Text,
            (None, Some(other)) => {
                return Err(Failure::Run(DumpError::Configuration(format!("unknown format '{other}'"))))
            }
        };
        let idtype = match (args.idtype, d.idtype.as_deref()) {
            (Some(t), _) => t,
            (None, None | Some("int")) => IdType::Int,
            (None, Some("str")) => IdType::Str,
            (None, Some(other)) => {
                return Err(Failure::Run(DumpError::Configuration(format!("unknown idtype '{other}'"))))
            }
        };
        Ok(Self {
            format,
            indent: args.indent.or(d.indent),
            depth: args.depth.or(d.depth),
            limit: args.limit.or(d.limit),
            generic_fields: args.generic_fields || d.generic_fields.unwrap_or(false),
            idtype,
        })
    }
}

/// DOT layout: command line first, then `[dot]` from the config.
fn dot_options(args: &DumpArgs, cfg: &Config) -> Result<DotOptions, Failure> {
    let d = cfg.dot.clone().unwrap_or_default();
    let level = match args.dot_level {
        DotLevelArg::Instance => DotLevel::Instance,
        DotLevelArg::Type => DotLevel::Type,
    };
    let clusters = match args.dot_clusters {
        Some(v) => v == OnOff::On,
        None => d.clusters.unwrap_or(false),
    };
    let rankdir = match (args.dot_rankdir, d.rankdir.as_deref()) {
        (Some(RankDirArg::Lr), _) | (None, None | Some("LR")) => RankDir::LR,
        (Some(RankDirArg::Tb), _) | (None, Some("TB")) => RankDir::TB,
        (None, Some(other)) => {
            return Err(Failure::Run(DumpError::Configuration(format!("unknown rankdir '{other}'"))))
        }
    };
    Ok(DotOptions { level, rankdir, clusters })
}

fn parse_ids(raw: &[String], idtype: IdType) -> Result<Option<Vec<EntityId>>, Failure> {
    if raw.is_empty() {
        return Ok(None);
    }
    let mut ids = Vec::with_capacity(raw.len());
    for s in raw {
        let id = match idtype {
            IdType::Int => s
                .parse::<i64>()
                .map(EntityId::Int)
                .map_err(|_| Failure::Usage(format!("'{s}' is not an integer id (use --idtype str)")))?,
            IdType::Str => EntityId::Str(s.clone()),
        };
        ids.push(id);
    }
    Ok(Some(ids))
}

/// What each emitted object pulled in, grouped by relation.
fn relation_report(result: &DumpResult) -> String {
    let mut s = String::new();
    for (key, by_name) in &result.relations {
        let _ = writeln!(s, "{key}");
        for (name, targets) in by_name {
            let targets: Vec<String> = targets.iter().map(ToString::to_string).collect();
            let _ = writeln!(s, "  {name} -> {}", targets.join(", "));
        }
    }
    s
}
