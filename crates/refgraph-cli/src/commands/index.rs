//! Index command - turn syntax trees into graph facts

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use rayon::prelude::*;
use refgraph_config::{
    ConfigOverrides, OutputConfig, OutputFormat, TemplateMode, UnimplementedMode, VerbosityMode,
};
use refgraph_core::{Indexer, IndexerOptions, JsonLinesSink, MemorySink, RunSummary, SyntaxTree};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::{load_config, parse_keyword, print_info, to_indexer_options};
use crate::progress::{finish_progress, progress_bar};
use crate::GlobalOptions;

/// Arguments for the index command
#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Syntax tree files, or directories searched for `*.json` trees
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for per-unit output files (default: stdout)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Output format (jsonl, graph)
    #[arg(long, value_parser = parse_keyword::<OutputFormat>)]
    format: Option<OutputFormat>,

    /// Implicit template instantiations (visit, skip)
    #[arg(long, value_parser = parse_keyword::<TemplateMode>)]
    templates: Option<TemplateMode>,

    /// Constructs without an indexing rule (continue, abort)
    #[arg(long, value_parser = parse_keyword::<UnimplementedMode>)]
    on_unimplemented: Option<UnimplementedMode>,

    /// Fact verbosity (full, common)
    #[arg(long, value_parser = parse_keyword::<VerbosityMode>)]
    verbosity: Option<VerbosityMode>,

    /// Bytes of hash kept for external identifiers (0 disables them)
    #[arg(long)]
    usr_bytes: Option<u8>,

    /// Worker threads (default: one per core)
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Cancel the remaining units after the first failure
    #[arg(long)]
    fail_fast: bool,
}

impl IndexArgs {
    fn to_config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            on_unimplemented: self.on_unimplemented,
            templates: self.templates,
            verbosity: self.verbosity,
            usr_byte_size: self.usr_bytes,
            output_format: self.format,
            ..Default::default()
        }
    }
}

/// A syntax tree to index.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InputUnit {
    path: PathBuf,
    /// Path below the input that named it; output files mirror it
    relative: PathBuf,
}

/// One indexed translation unit.
struct UnitReport {
    summary: RunSummary,
    facts: usize,
    /// Output bound for stdout; empty once written to a file
    output: Vec<u8>,
}

/// Per-unit report printed by `--format graph`.
#[derive(Debug, Serialize)]
struct GraphSummary<'a> {
    unit: String,
    nodes: BTreeMap<&'static str, usize>,
    edges: BTreeMap<&'static str, usize>,
    #[serde(flatten)]
    run: &'a RunSummary,
}

impl<'a> GraphSummary<'a> {
    fn new(unit: &Path, sink: &MemorySink, run: &'a RunSummary) -> Self {
        let mut nodes = BTreeMap::new();
        for node in sink.graph().iter_nodes() {
            if let Some(kind) = node.kind {
                *nodes.entry(kind.as_str()).or_default() += 1;
            }
        }
        let mut edges = BTreeMap::new();
        for edge in sink.graph().iter_edges() {
            *edges.entry(edge.kind.as_str()).or_default() += 1;
        }
        Self {
            unit: unit.display().to_string(),
            nodes,
            edges,
            run,
        }
    }
}

/// Execute the index command
pub fn execute(args: IndexArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global, Some(&args.to_config_overrides()))?;
    let options = to_indexer_options(&config.indexer);
    debug!(?options, "Indexer options");

    let units = collect_inputs(&args.inputs)?;
    if units.is_empty() {
        anyhow::bail!("No syntax trees found in the given inputs");
    }

    let extension = output_extension(config.output.format);
    if let Some(ref dir) = args.output {
        check_output_collisions(&units, extension)?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = args.jobs {
        pool = pool.num_threads(jobs);
    }
    let pool = pool.build().context("Failed to start worker threads")?;

    let cancel = CancellationToken::new();
    let pb = progress_bar(units.len() as u64, "Indexing", global.quiet);

    // None marks a unit skipped after cancellation
    let results: Vec<Option<Result<UnitReport>>> = pool.install(|| {
        units
            .par_iter()
            .map(|unit| {
                if cancel.is_cancelled() {
                    return None;
                }
                let result = index_unit(
                    unit,
                    &options,
                    &config.output,
                    args.output.as_deref(),
                    &cancel,
                );
                if result.is_err() && args.fail_fast {
                    cancel.cancel();
                }
                if let Some(ref pb) = pb {
                    pb.inc(1);
                }
                Some(result)
            })
            .collect()
    });

    let mut stdout = std::io::stdout().lock();
    let (mut indexed, mut failed, mut skipped, mut facts) = (0usize, 0usize, 0usize, 0usize);
    for (unit, result) in units.iter().zip(results) {
        let path = &unit.path;
        match result {
            Some(Ok(report)) => {
                indexed += 1;
                facts += report.facts;
                if report.summary.cancelled {
                    warn!(unit = %path.display(), "Indexing cancelled; output is partial");
                }
                for diagnostic in &report.summary.diagnostics {
                    warn!(unit = %path.display(), kind = ?diagnostic.kind, "{}", diagnostic.message);
                }
                stdout
                    .write_all(&report.output)
                    .context("Failed to write to stdout")?;
            }
            Some(Err(err)) => {
                failed += 1;
                error!("{:#}", err);
            }
            None => skipped += 1,
        }
    }
    stdout.flush().context("Failed to write to stdout")?;

    finish_progress(pb);
    print_info(
        &format!(
            "Indexed {} of {} unit(s): {} fact(s), {} failed, {} skipped",
            indexed,
            units.len(),
            facts,
            failed,
            skipped
        ),
        global.quiet,
    );

    if failed > 0 {
        anyhow::bail!("{} of {} unit(s) failed to index", failed, units.len());
    }
    Ok(())
}

/// Expand inputs into syntax tree files, directories walked in name order.
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<InputUnit>> {
    let mut units = Vec::new();
    for input in inputs {
        if input.is_file() {
            let relative = input
                .file_name()
                .map_or_else(|| input.clone(), PathBuf::from);
            units.push(InputUnit {
                path: input.clone(),
                relative,
            });
        } else if input.is_dir() {
            for entry in WalkDir::new(input).sort_by_file_name() {
                let entry = entry
                    .with_context(|| format!("Failed to walk {}", input.display()))?;
                if entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "json")
                {
                    let relative = entry
                        .path()
                        .strip_prefix(input)
                        .map_or_else(|_| PathBuf::from(entry.file_name()), Path::to_path_buf);
                    units.push(InputUnit {
                        path: entry.into_path(),
                        relative,
                    });
                }
            }
        } else {
            anyhow::bail!("Input not found: {}", input.display());
        }
    }
    Ok(units)
}

fn read_tree(path: &Path) -> Result<SyntaxTree> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    SyntaxTree::from_json(&text)
        .with_context(|| format!("Failed to parse syntax tree {}", path.display()))
}

/// Two inputs that map to one output file would overwrite each other.
fn check_output_collisions(units: &[InputUnit], extension: &str) -> Result<()> {
    let mut targets: HashMap<PathBuf, &Path> = HashMap::new();
    for unit in units {
        let target = output_relative(&unit.relative, extension);
        if let Some(previous) = targets.insert(target.clone(), &unit.path) {
            anyhow::bail!(
                "Inputs {} and {} would both write {}",
                previous.display(),
                unit.path.display(),
                target.display()
            );
        }
    }
    Ok(())
}

fn output_extension(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Jsonl => "jsonl",
        OutputFormat::Graph => "graph.json",
    }
}

fn index_unit(
    unit: &InputUnit,
    options: &IndexerOptions,
    output: &OutputConfig,
    out_dir: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<UnitReport> {
    let path = unit.path.as_path();
    let tree = read_tree(path)?;
    let mut indexer = Indexer::new(&tree, options.clone()).with_cancellation(cancel.clone());

    let (summary, facts, bytes) = match output.format {
        OutputFormat::Jsonl => {
            let paths = tree.files.iter().map(|file| file.path.clone()).collect();
            let mut sink = JsonLinesSink::new(Vec::new()).with_paths(paths);
            let summary = indexer
                .index(&mut sink)
                .with_context(|| format!("Failed to index {}", path.display()))?;
            let facts = sink.written();
            let bytes = sink.finish().context("Failed to serialize facts")?;
            (summary, facts, bytes)
        }
        OutputFormat::Graph => {
            let mut sink = MemorySink::new();
            let summary = indexer
                .index(&mut sink)
                .with_context(|| format!("Failed to index {}", path.display()))?;
            let report = GraphSummary::new(path, &sink, &summary);
            let mut bytes = if output.pretty {
                serde_json::to_vec_pretty(&report)?
            } else {
                serde_json::to_vec(&report)?
            };
            bytes.push(b'\n');
            (summary, sink.facts().len(), bytes)
        }
    };

    info!(
        unit = %path.display(),
        jobs = summary.jobs_started,
        facts,
        "Indexed translation unit"
    );

    let output = match out_dir {
        Some(dir) => {
            let extension = output_extension(output.format);
            let target = dir.join(output_relative(&unit.relative, extension));
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&target, &bytes)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            Vec::new()
        }
        None => bytes,
    };

    Ok(UnitReport {
        summary,
        facts,
        output,
    })
}

/// `relative` with its extension replaced, e.g. `nested/unit.jsonl`.
fn output_relative(relative: &Path, extension: &str) -> PathBuf {
    relative.with_extension(extension)
}
