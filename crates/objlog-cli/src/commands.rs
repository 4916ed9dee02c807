use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use colored::Colorize;
use objlog_codec::{Audit, AuditReport, RecordReader, Section};
use objlog_journal::{Directory, GenerationFile, GenerationListing, JournalConfig, LocalDirectory};
use objlog_types::GenerationStamp;
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Status(args) => cmd_status(args, &config, &cli.format),
        Command::Dump(args) => cmd_dump(args, &cli.format),
        Command::Audit(args) => cmd_audit(args, &config, &cli.format),
        Command::Config(_) => cmd_config(&config),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<JournalConfig> {
    match path {
        Some(path) => JournalConfig::load(path)
            .with_context(|| format!("cannot load config {}", path.display())),
        None => Ok(JournalConfig::default()),
    }
}

fn render_stamp(stamp: GenerationStamp) -> String {
    i64::try_from(stamp.as_millis())
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| stamp.to_string())
}

fn open_store(dir: &Path) -> anyhow::Result<LocalDirectory> {
    LocalDirectory::open(dir).with_context(|| format!("cannot open store {}", dir.display()))
}

fn reader(dir: &LocalDirectory, file: &GenerationFile) -> anyhow::Result<impl BufRead> {
    let input = dir
        .open_read(&file.name)
        .with_context(|| format!("cannot read {}", file.name))?;
    Ok(BufReader::new(input))
}

fn count_records(dir: &LocalDirectory, file: &GenerationFile) -> anyhow::Result<u64> {
    let mut count = 0;
    for record in RecordReader::new(reader(dir, file)?) {
        record.with_context(|| format!("{} is corrupt", file.name))?;
        count += 1;
    }
    Ok(count)
}

fn archived_files(dir: &LocalDirectory, config: &JournalConfig) -> anyhow::Result<usize> {
    let archive = dir.root().join(&config.archive_dir);
    if !archive.is_dir() {
        return Ok(0);
    }
    let archive = open_store(&archive)?;
    Ok(GenerationListing::scan(&archive, config)?.files.len())
}

fn cmd_status(args: StatusArgs, config: &JournalConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let dir = open_store(&args.dir)?;
    let listing = GenerationListing::scan(&dir, config)?;
    let archived = archived_files(&dir, config)?;

    let mut current = Vec::new();
    for file in [&listing.snapshot, &listing.journal].into_iter().flatten() {
        current.push((file, count_records(&dir, file)?));
    }

    match format {
        OutputFormat::Json => {
            let files: Vec<_> = current
                .iter()
                .map(|(file, records)| {
                    json!({
                        "name": file.name,
                        "kind": file.kind.to_string(),
                        "stamp": file.stamp.as_millis(),
                        "written_at": render_stamp(file.stamp),
                        "records": records,
                    })
                })
                .collect();
            let status = json!({"dir": args.dir.display().to_string(), "files": files, "archived": archived});
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Text => {
            println!("Store {}", args.dir.display().to_string().bold());
            if current.is_empty() {
                println!("  {}", "empty (a fresh root is created on first open)".dimmed());
            }
            for (file, records) in &current {
                println!(
                    "  {:<9} {}  {}  ({} records)",
                    format!("{}:", file.kind),
                    file.name.yellow(),
                    render_stamp(file.stamp).cyan(),
                    records
                );
            }
            println!("  {:<9} {} files", "archived:", archived);
        }
    }
    Ok(())
}

fn cmd_dump(args: DumpArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let input = File::open(&args.file).with_context(|| format!("cannot open {}", args.file.display()))?;
    let mut records = RecordReader::new(BufReader::new(input));
    let mut shown = 0u64;
    while let Some(record) = records.next() {
        let record = record.with_context(|| format!("{} is corrupt", args.file.display()))?;
        let command = record.command();
        if args.kind.as_deref().is_some_and(|kind| kind != command) {
            continue;
        }
        let line = record.to_line()?;
        match format {
            OutputFormat::Json => println!("{line}"),
            OutputFormat::Text => println!("{:>6}  {:<6} {}", records.line(), command.cyan(), line.dimmed()),
        }
        shown += 1;
    }
    if matches!(format, OutputFormat::Text) {
        println!("{} records", shown.to_string().bold());
    }
    Ok(())
}

fn audit_generation(dir: &LocalDirectory, listing: &GenerationListing) -> anyhow::Result<AuditReport> {
    let mut audit = match &listing.snapshot {
        Some(_) => Audit::new(),
        None => Audit::with_implicit_root(),
    };
    if let Some(snapshot) = &listing.snapshot {
        audit
            .scan(Section::Snapshot, reader(dir, snapshot)?)
            .with_context(|| format!("snapshot {} is corrupt", snapshot.name))?;
    }
    if let Some(journal) = &listing.journal {
        if let Some(snapshot) = &listing.snapshot {
            if journal.stamp <= snapshot.stamp {
                bail!("journal {} is not newer than snapshot {}", journal.name, snapshot.name);
            }
        }
        audit
            .scan(Section::Journal, reader(dir, journal)?)
            .with_context(|| format!("journal {} is corrupt", journal.name))?;
    }
    Ok(audit.report())
}

fn cmd_audit(args: AuditArgs, config: &JournalConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let dir = open_store(&args.dir)?;
    let listing = GenerationListing::scan(&dir, config)?;
    if listing.is_empty() {
        bail!("no generation files in {}", args.dir.display());
    }
    let report = audit_generation(&dir, &listing)?;

    match format {
        OutputFormat::Json => {
            let out = json!({
                "types": report.types,
                "objects": report.objects,
                "snapshot_records": report.snapshot_records,
                "journal_records": report.journal_records,
                "by_command": report.by_command,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!("{} Generation is consistent", "✓".green().bold());
            println!("  Types: {}", report.types);
            println!("  Objects: {}", report.objects);
            println!(
                "  Records: {} snapshot, {} journal",
                report.snapshot_records, report.journal_records
            );
            for (command, count) in &report.by_command {
                println!("    {:<8} {}", command.cyan(), count);
            }
        }
    }
    Ok(())
}

fn cmd_config(config: &JournalConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
