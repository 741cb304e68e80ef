mod cli;

use anyhow::{anyhow, Context};
use chrono_tz::Tz;
use clap::Parser;
use cli::{Cli, Commands, SourceArgs};
use stacklens_lib::insight::{CommandProvider, InsightResult, InsightService};
use stacklens_lib::source::{open_path, StaticRegistry};
use stacklens_lib::store::CrashDatabase;
use stacklens_lib::time::{format_timestamp, now_ms, parse_time_ms, parse_tz};
use stacklens_lib::{
    CategoryFilter, CrashCategory, CrashFilter, CrashReader, CrashRepository, RepositoryResult,
    SignatureGenerator, SortOrder, StackLensConfig, StackLensError,
};
use std::collections::BTreeSet;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            source,
            hours,
            type_filter,
            categories,
            package,
            search,
            oldest_first,
            group,
            json,
            tz,
            at,
        } => {
            let tz = parse_tz(&tz)?;
            let config = load_config(&source)?;
            let generator = config.signature_generator();

            let categories: BTreeSet<CrashCategory> = if categories.is_empty() {
                config.categories.iter().copied().collect()
            } else {
                categories
                    .iter()
                    .map(|tag| tag.parse::<CrashCategory>())
                    .collect::<Result<_, StackLensError>>()?
            };
            let filter = CrashFilter {
                categories,
                package_name: package,
                search_query: search,
                time_range_hours: hours.unwrap_or(config.since_hours),
                sort_order: if oldest_first { SortOrder::OldestFirst } else { SortOrder::NewestFirst },
                type_filter: type_filter.parse::<CategoryFilter>()?,
            };
            let now = match at {
                Some(at) => parse_time_ms(&at, &tz)?,
                None => now_ms(),
            };

            let mut repo = open_repository(&source, &config)?;
            let result = repo.query_at(&filter, now)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if group {
                print_groups(&result, &tz);
            } else {
                print_flat(&result, &generator, &tz);
            }
            Ok(())
        }
        Commands::Signature { file, category, json } => {
            let category: CrashCategory = category.parse()?;
            let data = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let content = String::from_utf8_lossy(&data);
            let generator = SignatureGenerator::default();
            let exception_type = generator.extract_exception_type(&content, Some(category));
            let signature = generator.generate_signature(&content, category);

            if json {
                let value = serde_json::json!({
                    "exceptionType": exception_type,
                    "signature": signature,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}", exception_type);
                println!("{}", signature);
            }
            Ok(())
        }
        Commands::Packages { source } => {
            let config = load_config(&source)?;
            let mut repo = open_repository(&source, &config)?;
            for package in repo.crashed_packages()? {
                println!("{}", package);
            }
            Ok(())
        }
        Commands::Stats { source, hours } => {
            let config = load_config(&source)?;
            let mut repo = open_repository(&source, &config)?;
            let stats = repo.crash_stats(hours.unwrap_or(config.since_hours))?;
            for (category, count) in stats {
                println!("{:>6}  {:<20} {}", count, category.tag(), category.display_name());
            }
            Ok(())
        }
        Commands::Explain { source, id, model, json } => {
            let config = load_config(&source)?;
            let mut repo = open_repository(&source, &config)?;
            let outcome = repo.get_crash_logs(&config.categories, config.since_hours)?;
            let record = outcome
                .records
                .into_iter()
                .find(|r| r.id == id)
                .ok_or_else(|| anyhow!("no crash with id {} in the last {} hours", id, config.since_hours))?;

            let provider = CommandProvider::from_command_line(&model)
                .ok_or_else(|| anyhow!("empty --model command"))?;
            let mut service = InsightService::new(Box::new(provider));
            if let Some(db) = repo.into_database() {
                service = service.with_cache(db);
            }

            let result = service.summarize(&record);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            match result {
                InsightResult::Success(insight) => {
                    println!("Summary:       {}", insight.summary);
                    println!("Root cause:    {}", insight.root_cause);
                    println!("Suggested fix: {}", insight.suggested_fix);
                    if let Some(line) = insight.affected_line {
                        println!("Affected line: {}", line);
                    }
                    Ok(())
                }
                InsightResult::Error(msg) => Err(anyhow!("insight failed: {}", msg)),
                InsightResult::Unavailable => Err(anyhow!("model command '{}' not found", model)),
                InsightResult::Downloading => {
                    println!("Model is downloading; try again later");
                    Ok(())
                }
            }
        }
    }
}

fn load_config(source: &SourceArgs) -> anyhow::Result<StackLensConfig> {
    let mut config = match &source.config {
        Some(path) => StackLensConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StackLensConfig::default(),
    };
    if let Some(bytes) = source.max_content {
        config = config.with_max_content_length(bytes);
    }
    if let Some(Some(db)) = &source.cache {
        config = config.with_database_path(db.clone());
    }
    config.validate()?;
    Ok(config)
}

fn open_repository(source: &SourceArgs, config: &StackLensConfig) -> anyhow::Result<CrashRepository> {
    let log_source = open_path(&source.path)
        .with_context(|| format!("opening {}", source.path.display()))?;
    let mut reader = CrashReader::new(log_source);
    if let Some(labels) = &source.labels {
        let registry = StaticRegistry::load(labels)
            .with_context(|| format!("loading labels {}", labels.display()))?;
        log::debug!("Loaded {} app labels", registry.len());
        reader = reader.with_registry(Box::new(registry));
    }

    let repo = if source.cache.is_some() {
        let db_path = config
            .resolved_database_path()
            .ok_or_else(|| anyhow!("no home directory for the default cache; pass --cache <DB>"))?;
        let db = CrashDatabase::open(&db_path)
            .with_context(|| format!("opening cache {}", db_path.display()))?;
        log::info!("Using crash cache {}", db_path.display());
        CrashRepository::cached(reader, db, config.retention_days)
    } else {
        CrashRepository::live(reader)
    };

    Ok(repo
        .with_generator(config.signature_generator())
        .with_max_content_length(config.max_content_length))
}

fn first_line(content: &str) -> &str {
    content.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

fn print_flat(result: &RepositoryResult, generator: &SignatureGenerator, tz: &Tz) {
    for record in &result.view.flat {
        println!(
            "{}  {:<20} {:<40} {}",
            format_timestamp(record.timestamp, tz),
            record.category.tag(),
            record.app_name.as_deref().or(record.package_name.as_deref()).unwrap_or("-"),
            generator.extract_exception_type(&record.content, Some(record.category)),
        );
    }
    print_footer(result, result.view.flat.len(), "crashes");
}

fn print_groups(result: &RepositoryResult, tz: &Tz) {
    for group in &result.view.groups {
        println!(
            "{:>5}x {:<32} {}",
            group.count,
            group.exception_type,
            group.app_name().or(group.package_name()).unwrap_or("-"),
        );
        println!(
            "       last {}  first {}",
            format_timestamp(group.last_occurrence, tz),
            format_timestamp(group.first_occurrence, tz),
        );
        println!("       {}", group.signature);
        if let Some(latest) = group.latest_crash() {
            println!("       {}", first_line(&latest.content));
        }
    }
    print_footer(result, result.view.groups.len(), "groups");
}

fn print_footer(result: &RepositoryResult, shown: usize, noun: &str) {
    println!("{} {}", shown, noun);
    if result.permission_denied {
        log::warn!("Some categories could not be read; results are incomplete");
    }
}
