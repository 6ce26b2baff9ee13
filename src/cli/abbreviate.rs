use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use clap::Args;
use tracing::warn;

use crate::catalog::store::JournalStore;
use crate::cli::{open_input, Context, OutputFormat};
use crate::config::check_unit;
use crate::core::types::AbbreviationStyle;
use crate::matching::engine::Resolver;
use crate::rewrite::pass::{FieldText, RewriteConfig, RewritePass, RewriteReport};

#[derive(Args)]
pub struct AbbreviateArgs {
    /// Lines of `entry_id<TAB>journal` or bare journal text. Use '-' for stdin
    pub input: Option<PathBuf>,

    /// Minimum confidence for substituting an abbreviation (default from settings)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Abbreviation to substitute
    #[arg(long, value_enum)]
    pub style: Option<AbbreviationStyle>,

    /// Worker threads
    #[arg(short = 't', long)]
    pub threads: Option<usize>,
}

/// Execute abbreviate command
///
/// # Errors
///
/// Returns an error if the input or store cannot be read.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: AbbreviateArgs, ctx: &Context) -> anyhow::Result<()> {
    let mut config = ctx.settings.rewrite.clone();
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(style) = args.style {
        config.style = style;
    }
    if let Some(threads) = args.threads {
        anyhow::ensure!(threads > 0, "--threads must be at least 1");
        config.threads = Some(threads);
    }
    check_unit("--threshold", config.threshold)?;

    let fields = read_fields(open_input(args.input.as_ref())?)?;
    let store = ctx.open_store()?;

    if ctx.verbose {
        eprintln!(
            "Rewriting {} fields against {} journals ({:?}, threshold {})",
            fields.len(),
            store.stats().records,
            config.style,
            config.threshold
        );
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        warn!("Ctrl-C will not stop the rewrite early: {e}");
    }

    let mut report = rewrite(&store, ctx, &config, fields.clone(), &cancel)?;
    if !report.summary.cancelled && report.summary.failed > 0 && store.verify_index().is_err() {
        warn!(
            "{} fields failed against an inconsistent index; rebuilding and retrying",
            report.summary.failed
        );
        store.rebuild_index()?;
        report = rewrite(&store, ctx, &config, fields, &cancel)?;
    }

    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Tsv => {
            println!("entry_id\tstatus\tconfidence\toriginal\ttext");
            for outcome in &report.outcomes {
                println!(
                    "{}\t{}\t{:.4}\t{}\t{}",
                    outcome.entry_id, outcome.status, outcome.confidence, outcome.original, outcome.text
                );
            }
        }
        OutputFormat::Text => {
            for outcome in &report.outcomes {
                println!("{}\t{}", outcome.entry_id, outcome.text);
            }
            print_summary(&report, ctx.verbose);
        }
    }
    store.close()?;
    if report.summary.cancelled {
        anyhow::bail!(
            "Interrupted after {} of {} fields",
            report.outcomes.len(),
            report.summary.total
        );
    }
    Ok(())
}

fn rewrite(
    store: &JournalStore,
    ctx: &Context,
    config: &RewriteConfig,
    fields: Vec<FieldText>,
    cancel: &AtomicBool,
) -> anyhow::Result<RewriteReport> {
    let snapshot = store.snapshot();
    let resolver = Resolver::new(&snapshot, ctx.settings.matching.clone());
    let pass = RewritePass::new(resolver, config.clone());
    Ok(pass.run(fields, cancel)?)
}

/// Parse input lines; the entry id defaults to the 1-based line number
fn read_fields(reader: impl BufRead) -> anyhow::Result<Vec<FieldText>> {
    let mut fields = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read input line {}", i + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let field = match line.split_once('\t') {
            Some((entry_id, text)) => FieldText::new(entry_id.trim(), text),
            None => FieldText::new((i + 1).to_string(), line),
        };
        fields.push(field);
    }
    Ok(fields)
}

fn print_summary(report: &RewriteReport, verbose: bool) {
    let summary = &report.summary;
    eprintln!(
        "{} fields: {} rewritten, {} unchanged, {} unresolved, {} without abbreviation, {} failed",
        summary.total,
        summary.rewritten,
        summary.unchanged,
        summary.unresolved,
        summary.no_abbreviation,
        summary.failed
    );
    if verbose && !summary.unresolved_entries.is_empty() {
        eprintln!("Unresolved: {}", summary.unresolved_entries.join(", "));
    }
    for outcome in &report.outcomes {
        if let Some(error) = &outcome.error {
            eprintln!("Failed {}: {error}", outcome.entry_id);
        }
    }
}
