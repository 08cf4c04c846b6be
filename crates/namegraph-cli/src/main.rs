//! Namegraph CLI
//!
//! Command-line front end for the name consolidation pipeline:
//! - Listing the unique raw names in a mention file
//! - Seeding and advancing the generation store (`init`, `pass`, `apply`)
//! - Inspecting, exporting and importing generations
//! - Building the co-occurrence network and its communities

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use namegraph_core::{
    detect_communities, export_network, unique_names, EquivalenceGeneration,
    EquivalenceMapBuilder, ExclusionSet, GraphBuilder, MergeOutcome, MergeProposal,
};
use namegraph_oracle::{
    build_requests, parse_proposal, render_prompt, BatchRunner, PassKind, PassReport, PassRunner,
    ResponseShape,
};
use namegraph_storage::{
    load_exclusions, write_network, GenerationStore, JsonlMentionStore, MentionFilter,
    NameMentionStore,
};
use std::path::{Path, PathBuf};

mod config;
mod oracle;

use config::{llm_timeout, PipelineConfig};
use oracle::{build_oracle, OracleChoice};

#[derive(Parser)]
#[command(name = "namegraph")]
#[command(
    author,
    version,
    about = "Namegraph: person-name consolidation and co-occurrence networks"
)]
struct Cli {
    /// Pipeline config (JSON). Missing sections use defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List unique raw names with the number of threads they appear in.
    Names {
        /// Mentions file (JSON Lines)
        mentions: PathBuf,
        /// Hide names seen in fewer threads
        #[arg(long, default_value_t = 1)]
        min_occurrences: usize,
        /// Print at most this many names
        #[arg(long)]
        limit: Option<usize>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Create the root (identity) generation from a mention file.
    Init {
        mentions: PathBuf,
        /// Generation store directory
        #[arg(long)]
        store: PathBuf,
        #[arg(long, default_value = "F1")]
        tag: String,
    },

    /// Show the oracle requests a pass would send, without calling anything.
    Candidates {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        pass: PassKind,
        /// Write the requests as JSON here
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print the rendered prompt of this batch
        #[arg(long)]
        prompt: Option<usize>,
    },

    /// Run one consolidation pass against the latest generation.
    ///
    /// Failed batches leave their names as they were. A pass halted by a
    /// fatal oracle error is not saved.
    Pass {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        pass: PassKind,
        /// Tag of the new generation
        #[arg(long)]
        tag: String,
        #[arg(long, value_enum, default_value_t = OracleChoice::Anthropic)]
        oracle: OracleChoice,
        /// Replies for `--oracle replay` (JSON array, one entry per batch)
        #[arg(long)]
        responses: Option<PathBuf>,
        /// Model override for the Anthropic oracle
        #[arg(long)]
        model: Option<String>,
        /// Names always forced to None (one per line)
        #[arg(long)]
        exclusions: Option<PathBuf>,
        /// Oracle request timeout in seconds (0 disables).
        /// Can also be set via `NAMEGRAPH_LLM_TIMEOUT_SECS`.
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Concurrent oracle calls
        #[arg(long)]
        concurrency: Option<usize>,
        /// Override the pass's batch size
        #[arg(long)]
        batch_size: Option<usize>,
        /// Report what would change without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply reviewed proposals from a file as a new generation.
    Apply {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        tag: String,
        /// Either a JSON array of proposals or a single oracle-style object
        proposals: PathBuf,
        /// How to read a single oracle-style object
        #[arg(long, value_enum, default_value_t = ShapeArg::Renames)]
        shape: ShapeArg,
        #[arg(long)]
        exclusions: Option<PathBuf>,
        #[arg(long, default_value = "manual review")]
        source: String,
    },

    /// Inspect and move generations in and out of the store.
    Generations {
        #[command(subcommand)]
        command: GenerationCommands,
    },

    /// Build the co-occurrence network and communities for a generation.
    Network {
        mentions: PathBuf,
        #[arg(long)]
        store: PathBuf,
        /// Generation tag (defaults to latest)
        #[arg(long)]
        generation: Option<String>,
        /// Output directory for nodes.json, edges.json, communities.json
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        exclusions: Option<PathBuf>,
        #[arg(long)]
        min_occurrences: Option<usize>,
        #[arg(long)]
        min_edge_weight: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Members listed per community summary
        #[arg(long, default_value_t = namegraph_core::export::DEFAULT_TOP_MEMBERS)]
        top: usize,
    },
}

#[derive(Subcommand)]
enum GenerationCommands {
    /// List generations, oldest first.
    List {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show one generation (defaults to latest).
    Show {
        #[arg(long)]
        store: PathBuf,
        tag: Option<String>,
        /// Print the full flat mapping
        #[arg(long)]
        mapping: bool,
    },
    /// Write a generation's flat `raw -> canonical | "None"` mapping.
    Export {
        #[arg(long)]
        store: PathBuf,
        tag: String,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Append a generation from a flat mapping file.
    Import {
        #[arg(long)]
        store: PathBuf,
        input: PathBuf,
        #[arg(long)]
        tag: String,
        #[arg(long, default_value = "import")]
        source: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ShapeArg {
    Grouped,
    Renames,
}

impl From<ShapeArg> for ResponseShape {
    fn from(value: ShapeArg) -> Self {
        match value {
            ShapeArg::Grouped => ResponseShape::Grouped,
            ShapeArg::Renames => ResponseShape::Renames,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Names {
            mentions,
            min_occurrences,
            limit,
            json,
        } => cmd_names(&mentions, min_occurrences, limit, json)?,
        Commands::Init {
            mentions,
            store,
            tag,
        } => cmd_init(&mentions, &store, &tag)?,
        Commands::Candidates {
            store,
            pass,
            out,
            prompt,
        } => cmd_candidates(&config, &store, pass, out.as_deref(), prompt)?,
        Commands::Pass {
            store,
            pass,
            tag,
            oracle,
            responses,
            model,
            exclusions,
            timeout_secs,
            concurrency,
            batch_size,
            dry_run,
        } => {
            let mut config = config;
            config.runner.call_timeout_ms = llm_timeout(timeout_secs, &config.runner)?
                .map_or(0, |d| d.as_millis() as u64);
            if let Some(n) = concurrency {
                config.runner.max_concurrency = n;
            }
            if batch_size.is_some() {
                config.candidates.batch_size = batch_size;
            }
            let oracle = build_oracle(oracle, pass, responses.as_deref(), model.as_deref())?;
            cmd_pass(
                &config,
                &store,
                pass,
                &tag,
                oracle,
                exclusions.as_deref(),
                dry_run,
            )?;
        }
        Commands::Apply {
            store,
            tag,
            proposals,
            shape,
            exclusions,
            source,
        } => cmd_apply(
            &store,
            &tag,
            &proposals,
            shape.into(),
            exclusions.as_deref(),
            &source,
        )?,
        Commands::Generations { command } => cmd_generations(command)?,
        Commands::Network {
            mentions,
            store,
            generation,
            out,
            exclusions,
            min_occurrences,
            min_edge_weight,
            seed,
            top,
        } => {
            let mut config = config;
            if let Some(n) = min_occurrences {
                config.graph.min_occurrences = n;
            }
            if let Some(n) = min_edge_weight {
                config.graph.min_edge_weight = n;
            }
            if let Some(s) = seed {
                config.community.seed = s;
            }
            cmd_network(
                &config,
                &mentions,
                &store,
                generation.as_deref(),
                &out,
                exclusions.as_deref(),
                top,
            )?;
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ============================================================================
// Helpers
// ============================================================================

fn open_store(dir: &Path) -> Result<GenerationStore> {
    GenerationStore::open(dir).with_context(|| format!("failed to open store {}", dir.display()))
}

fn latest_generation(store: &GenerationStore) -> Result<EquivalenceGeneration> {
    store.latest()?.ok_or_else(|| {
        anyhow!(
            "store {} has no generations; run `namegraph init` first",
            store.root().display()
        )
    })
}

fn exclusions_from(path: Option<&Path>) -> Result<ExclusionSet> {
    match path {
        Some(p) => load_exclusions(p).with_context(|| "failed to load exclusion list"),
        None => Ok(ExclusionSet::new()),
    }
}

fn print_outcome(outcome: &MergeOutcome) {
    let g = &outcome.generation;
    eprintln!(
        "  {} raw names → {} canonical, {} excluded",
        g.len(),
        g.canonical_names().len(),
        g.excluded_count()
    );
    eprintln!(
        "  {} merges accepted, {} names changed",
        outcome.accepted, outcome.changed
    );
    if !outcome.unmatched.is_empty() {
        eprintln!(
            "  {} {} proposal keys matched no canonical name",
            "note:".yellow().bold(),
            outcome.unmatched.len()
        );
    }
    for conflict in &outcome.conflicts {
        eprintln!("  {} {}", "conflict:".yellow().bold(), conflict);
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_names(
    mentions: &Path,
    min_occurrences: usize,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let batch = JsonlMentionStore::new(mentions).load_mentions(&MentionFilter::all())?;
    let mut names = unique_names(&batch.mentions);
    names.retain(|u| u.occurrences >= min_occurrences);
    names.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then_with(|| a.name.cmp(&b.name)));
    if let Some(n) = limit {
        names.truncate(n);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(());
    }
    for u in &names {
        println!("{:>6}  {}", u.occurrences, u.name);
    }
    eprintln!(
        "{} {} names across {} threads",
        "ok".green().bold(),
        names.len(),
        batch.thread_count()
    );
    Ok(())
}

fn cmd_init(mentions: &Path, store_dir: &Path, tag: &str) -> Result<()> {
    let store = open_store(store_dir)?;
    if !store.is_empty() {
        bail!(
            "store {} already has generations (latest: {})",
            store_dir.display(),
            store.latest_tag().unwrap_or_default()
        );
    }
    let batch = JsonlMentionStore::new(mentions).load_mentions(&MentionFilter::all())?;
    let root = EquivalenceGeneration::root_from_unique(tag, &unique_names(&batch.mentions));
    store.save(&root)?;
    eprintln!(
        "{} root generation {} with {} names",
        "ok".green().bold(),
        tag.bold(),
        root.len()
    );
    Ok(())
}

fn cmd_candidates(
    config: &PipelineConfig,
    store_dir: &Path,
    pass: PassKind,
    out: Option<&Path>,
    prompt: Option<usize>,
) -> Result<()> {
    let store = open_store(store_dir)?;
    let parent = latest_generation(&store)?;
    let requests = build_requests(pass, &parent, &config.candidates);
    let items: usize = requests.iter().map(|r| r.payload.item_count()).sum();
    eprintln!(
        "{} {pass} on {}: {} batches, {} items",
        "ok".green().bold(),
        parent.tag(),
        requests.len(),
        items
    );

    if let Some(index) = prompt {
        let request = requests
            .iter()
            .find(|r| r.batch_index == index)
            .ok_or_else(|| anyhow!("no batch {index} (have {})", requests.len()))?;
        println!("{}", render_prompt(request));
    }
    if let Some(out) = out {
        std::fs::write(out, serde_json::to_string_pretty(&requests)?)
            .with_context(|| format!("failed to write {}", out.display()))?;
        eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
    }
    Ok(())
}

fn cmd_pass(
    config: &PipelineConfig,
    store_dir: &Path,
    pass: PassKind,
    tag: &str,
    oracle: std::sync::Arc<dyn namegraph_oracle::ResolutionOracle>,
    exclusions: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    let store = open_store(store_dir)?;
    let parent = latest_generation(&store)?;
    let runner = PassRunner::new(
        BatchRunner::new(oracle, config.runner.clone()),
        EquivalenceMapBuilder::new(exclusions_from(exclusions)?),
    )
    .with_candidates(config.candidates.clone());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let report: PassReport = rt.block_on(runner.run(pass, &parent, tag));

    eprintln!(
        "{} {} → {}: {}/{} batches applied, {} failed, {} skipped",
        pass.to_string().bold(),
        parent.tag(),
        tag.bold(),
        report.run.applied(),
        report.requests,
        report.run.failed(),
        report.run.skipped()
    );
    print_outcome(&report.outcome);

    if let Some(reason) = &report.run.halted {
        bail!("pass halted by a fatal oracle error ({reason}); {tag} was not saved");
    }
    if dry_run {
        eprintln!("{} dry run; {tag} was not saved", "info:".yellow().bold());
        return Ok(());
    }
    store.save(&report.outcome.generation)?;
    eprintln!("{} saved generation {}", "ok".green().bold(), tag.bold());
    Ok(())
}

fn cmd_apply(
    store_dir: &Path,
    tag: &str,
    proposals_path: &Path,
    shape: ResponseShape,
    exclusions: Option<&Path>,
    source: &str,
) -> Result<()> {
    let store = open_store(store_dir)?;
    let parent = latest_generation(&store)?;
    let text = std::fs::read_to_string(proposals_path)
        .with_context(|| format!("failed to read {}", proposals_path.display()))?;
    let proposals: Vec<MergeProposal> = match serde_json::from_str(&text) {
        Ok(list) => list,
        Err(_) => vec![parse_proposal(&text, shape)
            .with_context(|| format!("{} is not a proposal file", proposals_path.display()))?],
    };

    let outcome = EquivalenceMapBuilder::new(exclusions_from(exclusions)?).apply(
        &parent,
        tag,
        source,
        &proposals,
    );
    eprintln!("{} → {}", parent.tag(), tag.bold());
    print_outcome(&outcome);
    store.save(&outcome.generation)?;
    eprintln!("{} saved generation {}", "ok".green().bold(), tag.bold());
    Ok(())
}

fn cmd_generations(command: GenerationCommands) -> Result<()> {
    match command {
        GenerationCommands::List { store, json } => {
            let store = open_store(&store)?;
            let manifest = store.manifest();
            if json {
                println!("{}", serde_json::to_string_pretty(&manifest)?);
                return Ok(());
            }
            for entry in &manifest.generations {
                let marker = if manifest.latest.as_deref() == Some(entry.tag.as_str()) {
                    "*".green().bold().to_string()
                } else {
                    " ".to_string()
                };
                println!(
                    "{marker} {:<10} parent={:<10} names={:<7} canonical={:<7} excluded={:<6} {}",
                    entry.tag,
                    entry.parent.as_deref().unwrap_or("-"),
                    entry.names,
                    entry.canonical_names,
                    entry.excluded,
                    entry.source
                );
            }
        }
        GenerationCommands::Show { store, tag, mapping } => {
            let store = open_store(&store)?;
            let generation = match tag {
                Some(t) => store.load(&t)?,
                None => latest_generation(&store)?,
            };
            println!("{} {}", "generation".bold(), generation.tag());
            println!("lineage:   {}", store.lineage(generation.tag())?.join(" → "));
            println!("source:    {}", generation.source());
            println!("created:   {}", generation.created_at());
            println!("digest:    {}", generation.digest());
            println!(
                "names:     {} raw, {} canonical, {} excluded",
                generation.len(),
                generation.canonical_names().len(),
                generation.excluded_count()
            );
            if mapping {
                println!("{}", serde_json::to_string_pretty(&generation.to_flat())?);
            }
        }
        GenerationCommands::Export { store, tag, out } => {
            let count = open_store(&store)?.export_flat(&tag, &out)?;
            eprintln!(
                "{} {} ({count} names)",
                "wrote".green().bold(),
                out.display().to_string().bold()
            );
        }
        GenerationCommands::Import {
            store,
            input,
            tag,
            source,
        } => {
            let generation = open_store(&store)?.import_flat(&input, &tag, &source)?;
            eprintln!(
                "{} imported {} as {} (parent {})",
                "ok".green().bold(),
                input.display(),
                tag.bold(),
                generation.parent().unwrap_or("-")
            );
        }
    }
    Ok(())
}

fn cmd_network(
    config: &PipelineConfig,
    mentions: &Path,
    store_dir: &Path,
    generation: Option<&str>,
    out: &Path,
    exclusions: Option<&Path>,
    top: usize,
) -> Result<()> {
    let store = open_store(store_dir)?;
    let generation = match generation {
        Some(tag) => store.load(tag)?,
        None => latest_generation(&store)?,
    };
    let batch = JsonlMentionStore::new(mentions).load_mentions(&MentionFilter::all())?;

    let graph = GraphBuilder::new(config.graph.clone())
        .with_exclusions(exclusions_from(exclusions)?)
        .build(&generation, &batch.threads());
    let partition = detect_communities(&graph, &config.community);
    let export = export_network(&graph, &partition, top);
    write_network(out, &export)?;

    eprintln!(
        "{} {} nodes, {} edges, {} communities (modularity {:.4}) from {}",
        "ok".green().bold(),
        export.nodes.len(),
        export.edges.len(),
        export.communities.len(),
        export.modularity,
        generation.tag().bold()
    );
    for row in export.most_connected(10) {
        println!(
            "{:>5}  {:<40} threads={} community={}",
            row.degree,
            row.canonical_name,
            row.occurrence_count,
            row.community_id.map_or("-".to_string(), |c| c.to_string())
        );
    }
    eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
    Ok(())
}
