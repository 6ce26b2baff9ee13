use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Subcommand};

use crate::catalog::store::{ImportSummary, StoreError};
use crate::cli::{open_input, Context, OutputFormat};
use crate::core::candidate::candidates_from_reader;
use crate::core::record::JournalRecord;
use crate::core::types::{JournalId, SourceTag};
use crate::merge::MergeMode;

#[derive(Args)]
pub struct DbArgs {
    #[command(subcommand)]
    pub command: DbCommands,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Show store location and counters
    Info,

    /// List journals
    List {
        /// Show at most this many journals
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show journals by id (`#42` or `42`) or by name
    Get {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Merge candidate journals from JSON (file or stdin)
    Add {
        /// JSON file: an object, an array, or one value per line. Use '-' for stdin
        file: Option<PathBuf>,

        /// Source tag for every candidate, overriding the input
        #[arg(long)]
        source: Option<String>,

        /// Replace matched journals with the candidate instead of merging by trust
        #[arg(short = 'o', long)]
        overwrite: bool,
    },

    /// Delete journals by id
    Remove {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Re-derive the name and abbreviation indexes from the records
    RebuildIndex,

    /// Check the indexes against the records
    Verify,
}

/// Execute db subcommand
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the operation fails.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: DbArgs, ctx: &Context) -> anyhow::Result<()> {
    match args.command {
        DbCommands::Info => run_info(ctx),
        DbCommands::List { limit } => run_list(ctx, limit),
        DbCommands::Get { names } => run_get(ctx, &names),
        DbCommands::Add {
            file,
            source,
            overwrite,
        } => {
            let mode = if overwrite {
                MergeMode::Overwrite
            } else {
                MergeMode::Merge
            };
            run_add(ctx, file.as_ref(), source.as_deref(), mode)
        }
        DbCommands::Remove { ids } => run_remove(ctx, &ids),
        DbCommands::RebuildIndex => run_rebuild_index(ctx),
        DbCommands::Verify => run_verify(ctx),
    }
}

fn run_info(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let stats = store.stats();

    match ctx.format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "path": ctx.db_dir.display().to_string(),
                "stats": stats,
                "trust": store.trust().order(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Tsv => {
            println!("path\trecords\tname_keys\tabbreviation_keys\tformat_version\tnext_id\tgeneration");
            println!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                ctx.db_dir.display(),
                stats.records,
                stats.name_keys,
                stats.abbreviation_keys,
                stats.format_version,
                stats.next_id,
                stats.generation
            );
        }
        OutputFormat::Text => {
            let trust: Vec<&str> = store.trust().order().iter().map(SourceTag::as_str).collect();
            println!("Journal store: {}", ctx.db_dir.display());
            println!("   Journals:          {}", stats.records);
            println!("   Name keys:         {}", stats.name_keys);
            println!("   Abbreviation keys: {}", stats.abbreviation_keys);
            println!("   Format version:    {}", stats.format_version);
            println!("   Next id:           #{}", stats.next_id);
            println!("   Trust order:       {}", trust.join(" > "));
        }
    }
    store.close()?;
    Ok(())
}

fn run_list(ctx: &Context, limit: Option<usize>) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let records = store.all_records();
    let shown: Vec<&JournalRecord> = records.iter().take(limit.unwrap_or(usize::MAX)).collect();

    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&shown)?),
        OutputFormat::Tsv => print_tsv(&shown),
        OutputFormat::Text => {
            let id_width = shown
                .iter()
                .map(|r| r.id.to_string().len())
                .max()
                .unwrap_or(2)
                .max(2);
            let abbreviation_width = shown
                .iter()
                .map(|r| r.abbreviation.as_deref().map_or(1, str::len).min(30))
                .max()
                .unwrap_or(12)
                .max(12);

            println!("Journals ({} of {})\n", shown.len(), records.len());
            println!(
                "{:<id_w$} {:<abbr_w$} NAME",
                "ID",
                "ABBREVIATION",
                id_w = id_width,
                abbr_w = abbreviation_width
            );
            for record in &shown {
                println!(
                    "{:<id_w$} {:<abbr_w$} {}",
                    record.id.to_string(),
                    record.abbreviation.as_deref().unwrap_or("-"),
                    record.full_name,
                    id_w = id_width,
                    abbr_w = abbreviation_width
                );
            }
        }
    }
    Ok(())
}

fn run_get(ctx: &Context, names: &[String]) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let mut found = Vec::new();
    let mut missing = Vec::new();

    for name in names {
        let lookup = match JournalId::parse(name) {
            Some(id) => store.get(id),
            None => store.lookup_by_name(name),
        };
        match lookup {
            Ok(record) => found.push(record),
            Err(StoreError::NotFound(_)) => missing.push(name.as_str()),
            Err(e) => return Err(e.into()),
        }
    }

    let shown: Vec<&JournalRecord> = found.iter().collect();
    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&shown)?),
        OutputFormat::Tsv => print_tsv(&shown),
        OutputFormat::Text => {
            for (i, record) in shown.iter().enumerate() {
                if i > 0 {
                    println!("\n{}", "─".repeat(60));
                }
                print_record_text(record, ctx.verbose);
            }
        }
    }

    for name in &missing {
        eprintln!("Not found: {name}");
    }
    if !missing.is_empty() {
        anyhow::bail!("{} of {} journals not found", missing.len(), names.len());
    }
    Ok(())
}

fn run_add(
    ctx: &Context,
    file: Option<&PathBuf>,
    source: Option<&str>,
    mode: MergeMode,
) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let reader = open_input(file)?;
    let source = source.map(SourceTag::new);

    let mut parse_error = None;
    let candidates = candidates_from_reader(reader).map_while(|item| match item {
        Ok(mut candidate) => {
            if let Some(source) = &source {
                candidate.source = source.clone();
            }
            Some(candidate)
        }
        Err(e) => {
            parse_error = Some(e);
            None
        }
    });
    let summary = store.import_with(candidates, mode)?;

    print_import_summary(&summary, ctx.format)?;
    store.close()?;

    if let Some(e) = parse_error {
        return Err(e).context("Stopped reading candidates at malformed JSON");
    }
    Ok(())
}

fn print_import_summary(summary: &ImportSummary, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
        OutputFormat::Tsv => {
            println!("added\tupdated\tunchanged\tconflicts\tinvalid");
            println!(
                "{}\t{}\t{}\t{}\t{}",
                summary.added, summary.updated, summary.unchanged, summary.conflicts, summary.invalid
            );
        }
        OutputFormat::Text => {
            println!(
                "Added {}, updated {}, unchanged {}",
                summary.added, summary.updated, summary.unchanged
            );
            if !summary.warnings.is_empty() {
                println!(
                    "Skipped {} ({} conflicts, {} invalid):",
                    summary.warnings.len(),
                    summary.conflicts,
                    summary.invalid
                );
                for warning in &summary.warnings {
                    println!("   - {warning}");
                }
            }
        }
    }
    Ok(())
}

fn run_remove(ctx: &Context, ids: &[String]) -> anyhow::Result<()> {
    let parsed = ids
        .iter()
        .map(|s| JournalId::parse(s).with_context(|| format!("Invalid journal id: {s}")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let store = ctx.open_store()?;
    for id in parsed {
        let removed = store.remove(id)?;
        if ctx.format == OutputFormat::Text {
            println!("Removed {} {}", removed.id, removed.full_name);
        } else {
            println!("{}\t{}", removed.id, removed.full_name);
        }
    }
    store.close()?;
    Ok(())
}

fn run_rebuild_index(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let keys = store.rebuild_index()?;
    println!("Rebuilt index: {keys} keys for {} journals", store.stats().records);
    store.close()?;
    Ok(())
}

fn run_verify(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    store
        .verify_index()
        .context("Index does not match records; run `journal-abbrev db rebuild-index`")?;
    let stats = store.stats();
    println!(
        "Index OK: {} name keys, {} abbreviation keys for {} journals",
        stats.name_keys, stats.abbreviation_keys, stats.records
    );
    Ok(())
}

fn print_tsv(records: &[&JournalRecord]) {
    println!("id\tfull_name\tabbreviation\talternates\taliases\tcoden\tissn_print\tissn_web");
    for record in records {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            record.id,
            record.full_name,
            record.abbreviation.as_deref().unwrap_or(""),
            join(&record.alternate_abbreviations),
            join(&record.aliases),
            record.coden.as_deref().unwrap_or(""),
            record.issn_print.as_deref().unwrap_or(""),
            record.issn_web.as_deref().unwrap_or(""),
        );
    }
}

fn join<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
    values
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("; ")
}

fn print_record_text(record: &JournalRecord, verbose: bool) {
    println!("{} {}", record.id, record.full_name);
    if let Some(abbreviation) = &record.abbreviation {
        println!("   Abbreviation: {abbreviation}");
    }
    if !record.alternate_abbreviations.is_empty() {
        println!("   Alternates:   {}", join(&record.alternate_abbreviations));
    }
    for alias in &record.aliases {
        println!("   Alias:        {alias}");
    }
    if let Some(coden) = &record.coden {
        println!("   CODEN:        {coden}");
    }
    if let Some(issn) = &record.issn_print {
        println!("   ISSN (print): {issn}");
    }
    if let Some(issn) = &record.issn_web {
        println!("   ISSN (web):   {issn}");
    }
    if verbose {
        println!("   Provenance:");
        for (field, provenance) in &record.provenance {
            println!(
                "     {:<13} {} at {}",
                field.to_string(),
                provenance.source,
                provenance.updated_at.to_rfc3339()
            );
        }
    }
}
