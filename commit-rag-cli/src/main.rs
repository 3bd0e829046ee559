mod git;

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use commit_rag_core::{
    ChangeSummary, Config, Engine, OpenRouterClient, analyze_diff, build_index, load_corpus,
};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "commit-rag", version)]
#[command(about = "conventional commit messages grounded on similar commits from history")]
struct Cli {
    /// config file (defaults to ./commit-rag.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// log pipeline details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// show what a diff changes
    Analyze {
        #[command(flatten)]
        source: DiffSource,

        /// print the summary as json
        #[arg(long)]
        json: bool,
    },

    /// generate a commit message for a diff
    Generate {
        #[command(flatten)]
        source: DiffSource,

        /// number of similar commits to show the model
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// extra notes for the model, e.g. why the change was made
        #[arg(long)]
        context: Option<String>,

        /// print the message as json
        #[arg(long)]
        json: bool,
    },

    /// build the commit index from a corpus file and save it
    BuildIndex {
        /// json, json lines or csv corpus (overrides index.corpus_path)
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// where to write the index (overrides index.artifact_path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// list the corpus commits most similar to a query
    Search {
        /// query text, `-` reads stdin
        query: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
}

#[derive(Args, Debug)]
struct DiffSource {
    /// read the diff from a file, `-` for stdin
    #[arg(short, long)]
    diff_file: Option<PathBuf>,

    /// path to git repository (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    path: PathBuf,

    /// maximum file size in kb to include from the repository
    #[arg(short, long, default_value = "100")]
    max_size: usize,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!(
            "{} {} {}",
            style("❌"),
            style("commit-rag failed:").red().bold(),
            style(format!("{e:#}")).red()
        );
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "commit_rag_core=debug,commit_rag=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze { source, json } => {
            let diff = read_diff(&source)?;
            let summary = analyze_diff(&diff);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Command::Generate {
            source,
            top_k,
            context,
            json,
        } => generate(config, &source, top_k, context.as_deref(), json).await?,
        Command::BuildIndex { corpus, output } => build(config, corpus, output)?,
        Command::Search { query, top_k } => search(config, &query, top_k).await?,
    }

    Ok(())
}

async fn generate(
    config: Config,
    source: &DiffSource,
    top_k: Option<usize>,
    context: Option<&str>,
    json: bool,
) -> Result<()> {
    let diff = read_diff(source)?;
    let k = top_k.unwrap_or(config.retrieval.top_k);

    let client = OpenRouterClient::from_config(&config.generation)
        .context("please set it with: export OPENROUTER_API_KEY=your-api-key")?;
    let engine = Engine::new(config, Arc::new(client));

    let spinner = spinner("🧙", "generating commit message...");
    let result = engine.generate_with_context(&diff, k, context).await;
    spinner.finish_and_clear();
    let message = result.context("failed to generate commit message")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&message)?);
        return Ok(());
    }

    println!("\n{}\n", style("✅ generated commit message:").green().bold());
    println!("{}", style(message.full_message()).yellow());
    if !message.source_exemplar_ids.is_empty() {
        println!(
            "\n{} {}",
            style("grounded on:").dim(),
            style(message.source_exemplar_ids.join(", ")).dim()
        );
    }

    println!("\n{}", style("run this command from your terminal:").cyan());
    let git_command = format!(
        "git commit -m \"{}\"",
        message.full_message().replace('"', "\\\"")
    );
    println!("{}\n", style(git_command).yellow().bold());
    Ok(())
}

fn build(mut config: Config, corpus: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    if let Some(corpus) = corpus {
        config.index.corpus_path = Some(corpus);
    }
    if let Some(output) = output {
        config.index.artifact_path = Some(output);
    }

    let corpus_path = config
        .index
        .corpus_path
        .as_deref()
        .ok_or_else(|| anyhow!("no corpus given, pass --corpus or set index.corpus_path"))?;
    let artifact_path = config
        .index
        .artifact_path
        .as_deref()
        .ok_or_else(|| anyhow!("no output given, pass --output or set index.artifact_path"))?;

    let spinner = spinner("📚", "indexing commits...");
    let records = load_corpus(corpus_path)
        .with_context(|| format!("failed to load corpus {}", corpus_path.display()))?;
    let index = build_index(&records, &config.index_options())?;
    index
        .save(artifact_path)
        .with_context(|| format!("failed to save index to {}", artifact_path.display()))?;
    spinner.finish_and_clear();

    println!(
        "{} indexed {} commits ({} terms) into {}",
        style("✅").green(),
        style(index.len()).bold(),
        index.vocabulary_len(),
        style(artifact_path.display()).cyan()
    );
    Ok(())
}

async fn search(config: Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let query = if query == "-" {
        read_stdin()?
    } else {
        query.to_string()
    };
    let k = top_k.unwrap_or(config.retrieval.top_k);

    // retrieval never calls the model, so no key is needed here
    let client = OpenRouterClient::new(config.generation.api_url.clone(), "", config.generation.model.clone())?;
    let engine = Engine::new(config, Arc::new(client));
    let hits = engine.search(&query, k).await?;

    if hits.is_empty() {
        println!("{}", style("no similar commits found").yellow());
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        let subject = hit.commit_message.lines().next().unwrap_or_default();
        println!(
            "{:>2}. {} {} {}",
            rank + 1,
            style(format!("{:.3}", hit.score)).green(),
            style(&hit.id).dim(),
            subject
        );
    }
    Ok(())
}

fn print_summary(summary: &ChangeSummary) {
    if summary.is_empty() {
        println!("{}", style("⚠️  no changes found in the diff").yellow().bold());
        return;
    }

    println!("{}\n", style(summary.stat_line()).cyan().bold());
    for file in &summary.files_changed {
        let label = match &file.old_path {
            Some(old) => format!("{} → {}", old, file.path),
            None => file.path.clone(),
        };
        println!(
            "  {} {} ({}, {}) {} {}",
            style("-").dim(),
            label,
            file.change_kind.as_str(),
            file.file_type.as_str(),
            style(format!("+{}", file.additions)).green(),
            style(format!("-{}", file.deletions)).red()
        );
    }

    if !summary.key_changes.is_empty() {
        println!("\n{}", style("key changes:").cyan().bold());
        for change in &summary.key_changes {
            println!("  {}", change);
        }
    }

    if !summary.skipped.is_empty() {
        println!(
            "\n{}",
            style(format!("{} fragment(s) could not be parsed", summary.skipped.len())).dim()
        );
    }
}

/// diff text from --diff-file, stdin or the repository
fn read_diff(source: &DiffSource) -> Result<String> {
    match source.diff_file.as_deref() {
        Some(path) if path == Path::new("-") => read_stdin(),
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read diff file {}", path.display())),
        None => {
            let diff = git::working_diff(&source.path, source.max_size * 1024)
                .context("failed to get git diff information")?;
            if !diff.staged && !diff.text.is_empty() {
                eprintln!(
                    "{}\n",
                    style("⚠️  no staged changes found, will analyse unstaged changes instead")
                        .yellow()
                        .bold()
                );
            }
            Ok(diff.text)
        }
    }
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read stdin")?;
    Ok(buffer)
}

fn spinner(icon: &str, message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let ticks: Vec<String> = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]
        .iter()
        .map(|t| format!("{icon} {t}"))
        .collect();
    let ticks: Vec<&str> = ticks.iter().map(String::as_str).collect();
    let template = format!("{{spinner}} {message}");

    match ProgressStyle::default_spinner().template(&template) {
        Ok(progress_style) => spinner.set_style(progress_style.tick_strings(&ticks)),
        Err(_) => spinner.set_message(message.to_string()),
    }
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}
