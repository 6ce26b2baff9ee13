use clap::Args;

use crate::catalog::snapshot::CatalogSnapshot;
use crate::cli::{Context, OutputFormat};
use crate::config::check_unit;
use crate::matching::engine::{ResolutionResult, Resolver};
use crate::matching::scoring::ScorerKind;

#[derive(Args)]
pub struct ResolveArgs {
    /// Journal names to resolve
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Minimum confidence for a fuzzy match (default from settings)
    #[arg(long)]
    pub min_confidence: Option<f64>,

    /// Similarity function for fuzzy matching
    #[arg(long, value_enum)]
    pub scorer: Option<ScorerKind>,
}

/// Execute resolve command
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the index is corrupt.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: ResolveArgs, ctx: &Context) -> anyhow::Result<()> {
    let mut config = ctx.settings.matching.clone();
    if let Some(scorer) = args.scorer {
        config.scorer = scorer;
    }
    let min_confidence = args.min_confidence.unwrap_or(config.min_confidence);
    check_unit("--min-confidence", min_confidence)?;

    let store = ctx.open_store()?;
    let snapshot = store.snapshot();
    let resolver = Resolver::new(&snapshot, config);

    if ctx.verbose {
        eprintln!(
            "Resolving {} names against {} journals (scorer {}, min confidence {min_confidence})",
            args.names.len(),
            snapshot.len(),
            resolver.scorer_name()
        );
    }

    let results = args
        .names
        .iter()
        .map(|name| resolver.resolve(name, min_confidence))
        .collect::<Result<Vec<_>, _>>()?;

    match ctx.format {
        OutputFormat::Json => print_json(&results, &snapshot)?,
        OutputFormat::Tsv => print_tsv(&results, &snapshot),
        OutputFormat::Text => print_text(&results, &snapshot),
    }
    Ok(())
}

fn print_text(results: &[ResolutionResult], snapshot: &CatalogSnapshot) {
    for result in results {
        match result.journal_id.and_then(|id| snapshot.get(id)) {
            Some(record) => {
                let abbreviation = record
                    .abbreviation
                    .as_deref()
                    .map(|a| format!(" [{a}]"))
                    .unwrap_or_default();
                println!(
                    "{} → {} {}{abbreviation} ({}, {:.2})",
                    result.query, record.id, record.full_name, result.strategy, result.confidence
                );
            }
            None => println!(
                "{} → no match (best {:.2})",
                result.query, result.confidence
            ),
        }
    }
}

fn print_tsv(results: &[ResolutionResult], snapshot: &CatalogSnapshot) {
    println!("query\tid\tfull_name\tabbreviation\tstrategy\tconfidence");
    for result in results {
        let record = result.journal_id.and_then(|id| snapshot.get(id));
        println!(
            "{}\t{}\t{}\t{}\t{}\t{:.4}",
            result.query,
            record.map(|r| r.id.to_string()).unwrap_or_default(),
            record.map(|r| r.full_name.as_str()).unwrap_or(""),
            record.and_then(|r| r.abbreviation.as_deref()).unwrap_or(""),
            result.strategy,
            result.confidence
        );
    }
}

fn print_json(results: &[ResolutionResult], snapshot: &CatalogSnapshot) -> anyhow::Result<()> {
    let output: Vec<serde_json::Value> = results
        .iter()
        .map(|result| {
            serde_json::json!({
                "query": result.query,
                "journal_id": result.journal_id,
                "matched_key": result.matched_key,
                "confidence": result.confidence,
                "confidence_level": result.confidence_level().to_string(),
                "strategy": result.strategy,
                "record": result.journal_id.and_then(|id| snapshot.get(id)),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
