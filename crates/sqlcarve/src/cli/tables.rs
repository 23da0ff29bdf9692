//! `sqlcarve tables`: resolved tables and the matchers compiled for them.

use crate::cli::config::parse_scenarios;
use crate::cli::error::HelpfulError;
use anyhow::Result;
use serde::Serialize;
use sqlcarve_engine::pattern::PatternBuilder;
use sqlcarve_engine::Scenario;
use sqlcarve_schema::{SchemaConfig, TableSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arguments for the tables command
#[derive(Debug, clap::Args)]
pub struct TablesArgs {
    /// Schema configuration (JSON)
    pub schema: PathBuf,

    /// Include legacy variants of tables with trailing DEFAULT columns
    #[arg(long)]
    pub legacy_variants: bool,

    /// Scenarios to compile (0-5, comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub scenarios: Vec<u8>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct MatcherInfo {
    scenario: Scenario,
    pattern: String,
}

#[derive(Debug, Serialize)]
struct TableInfo {
    #[serde(flatten)]
    table: TableSpec,
    matchers: Vec<MatcherInfo>,
}

/// Load a schema config, mapping failures to helpful errors.
pub fn load_schema(path: &Path) -> Result<SchemaConfig> {
    SchemaConfig::load(path)
        .map_err(|err| HelpfulError::schema_invalid(path, &err.to_string()).into())
}

/// Resolve the tables of a loaded schema config; at least one is required.
pub fn resolve_tables(
    config: &SchemaConfig,
    path: &Path,
    legacy_variants: bool,
) -> Result<Vec<TableSpec>> {
    let tables = config.table_specs(legacy_variants);
    if tables.is_empty() {
        return Err(HelpfulError::no_tables(path).into());
    }
    Ok(tables)
}

/// Run the tables command
pub fn run(args: TablesArgs) -> Result<()> {
    let schema = load_schema(&args.schema)?;
    let tables = resolve_tables(&schema, &args.schema, args.legacy_variants)?;
    let scenarios = if args.scenarios.is_empty() {
        Scenario::ALL.to_vec()
    } else {
        parse_scenarios(&args.scenarios)?
    };

    let builder = PatternBuilder::new();
    let infos: Vec<TableInfo> = tables
        .into_iter()
        .map(|table| {
            let table = Arc::new(table);
            let matchers = scenarios
                .iter()
                .filter_map(|&scenario| builder.build(&table, scenario))
                .map(|m| MatcherInfo {
                    scenario: m.scenario(),
                    pattern: m.describe(),
                })
                .collect();
            TableInfo {
                table: (*table).clone(),
                matchers,
            }
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    for info in &infos {
        println!("{} ({} columns)", info.table.name, info.table.column_count());
        for column in &info.table.columns {
            println!("  {:<24} {}", column.name, column.storage_class);
        }
        if info.matchers.is_empty() {
            println!("  no matchers compiled");
        }
        for matcher in &info.matchers {
            println!("  [{}] {}", matcher.scenario, matcher.pattern);
        }
        println!();
    }
    Ok(())
}
