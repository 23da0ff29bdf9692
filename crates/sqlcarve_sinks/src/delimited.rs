use crate::{output_columns, SinkError, SinkResult, SOURCES_COLUMNS, SOURCES_TABLE};
use anyhow::{Context, Result};
use sqlcarve_engine::{CarvedRecord, FileReport};
use sqlcarve_schema::TableSpec;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name for a table, with path-hostile characters replaced.
pub(crate) fn csv_filename(table: &str) -> String {
    let stem: String = table
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.csv", stem)
}

struct CsvTable {
    writer: Option<csv::Writer<File>>,
    /// Temp file path for staging
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
    width: usize,
    rows_written: u64,
    /// True once final file has been promoted
    committed: bool,
}

impl CsvTable {
    fn create(output_dir: &Path, name: &str, header: &[String], width: usize) -> Result<Self> {
        let filename = csv_filename(name);
        let final_path = output_dir.join(&filename);
        let temp_path = output_dir.join(format!(".{}.tmp", filename));

        let file = File::create(&temp_path)
            .with_context(|| format!("Failed to create temp CSV file: {}", temp_path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(header)
            .with_context(|| format!("Failed to write CSV header: {}", temp_path.display()))?;

        Ok(Self {
            writer: Some(writer),
            temp_path: Some(temp_path),
            final_path,
            width,
            rows_written: 0,
            committed: false,
        })
    }

    fn write_row(&mut self, row: &[String]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("CSV sink not initialized"))?;
        writer
            .write_record(row)
            .context("Failed to write row to CSV")?;
        self.rows_written += 1;
        Ok(())
    }
}

/// CSV sink writer.
///
/// Writes `{table}.csv` per recovered table plus `_carve_sources.csv` into
/// the output directory. Files are staged as `.{name}.tmp` and renamed on
/// commit, replacing earlier output of the same name.
pub struct CsvSink {
    output_dir: PathBuf,
    tables: HashMap<String, CsvTable>,
    /// Tables set aside, with the reason.
    unusable: HashMap<String, String>,
}

impl CsvSink {
    pub fn new(output_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&output_dir).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_dir.display()
            )
        })?;

        Ok(Self {
            output_dir,
            tables: HashMap::new(),
            unusable: HashMap::new(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn init(&mut self, tables: &[TableSpec]) -> Result<()> {
        info!(
            "Initializing CSV sink: {} ({} tables)",
            self.output_dir.display(),
            tables.len()
        );

        let sources_header: Vec<String> = SOURCES_COLUMNS.iter().map(|c| c.to_string()).collect();
        let sources = CsvTable::create(
            &self.output_dir,
            SOURCES_TABLE,
            &sources_header,
            SOURCES_COLUMNS.len(),
        )?;
        self.tables.insert(SOURCES_TABLE.to_string(), sources);
        let mut filenames: HashMap<String, String> = HashMap::new();
        filenames.insert(csv_filename(SOURCES_TABLE), SOURCES_TABLE.to_string());

        for table in tables {
            let filename = csv_filename(&table.name);
            if let Some(owner) = filenames.get(&filename) {
                let reason = format!("{} is already written for '{}'", filename, owner);
                warn!(table = %table.name, "Skipping output table: {}", reason);
                self.unusable.insert(table.name.clone(), reason);
                continue;
            }
            filenames.insert(filename, table.name.clone());

            let header = output_columns(table);
            let staged = CsvTable::create(&self.output_dir, &table.name, &header, table.column_count())?;
            debug!("Staged CSV output for '{}'", table.name);
            self.tables.insert(table.name.clone(), staged);
        }
        Ok(())
    }

    pub fn write_record(&mut self, carved: &CarvedRecord) -> SinkResult<()> {
        let record = &carved.record;
        let name = carved.table.name.as_str();
        if let Some(reason) = self.unusable.get(name) {
            return Err(SinkError::rejected(name, reason.clone()));
        }
        let table = self
            .tables
            .get_mut(name)
            .ok_or_else(|| SinkError::rejected(name, "no output file was created"))?;
        if record.values.len() != table.width {
            return Err(SinkError::rejected(
                name,
                format!("expected {} values, got {}", table.width, record.values.len()),
            ));
        }

        let mut row: Vec<String> = record.values.iter().map(|v| v.to_string()).collect();
        row.push(record.scenario_label());
        row.push(record.source_offset.to_string());
        row.push(record.source_file.to_string());
        table.write_row(&row)?;
        Ok(())
    }

    pub fn write_source(&mut self, report: &FileReport) -> Result<()> {
        let sources = self
            .tables
            .get_mut(SOURCES_TABLE)
            .ok_or_else(|| anyhow::anyhow!("CSV sink not initialized"))?;
        sources.write_row(&[
            report.path.display().to_string(),
            report.blake3.clone(),
            report.size.to_string(),
            report.stats.accepted.to_string(),
        ])
    }

    pub fn prepare(&mut self) -> Result<()> {
        for table in self.tables.values_mut() {
            if let Some(mut writer) = table.writer.take() {
                writer.flush().context("Failed to flush CSV output")?;
            }
        }
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        let mut rows = 0u64;
        for table in self.tables.values_mut() {
            if let Some(temp_path) = &table.temp_path {
                std::fs::rename(temp_path, &table.final_path).with_context(|| {
                    format!(
                        "Failed to rename {} -> {}",
                        temp_path.display(),
                        table.final_path.display()
                    )
                })?;
                table.committed = true;
                rows += table.rows_written;
            }
            table.temp_path = None;
        }
        info!(
            "Committed CSV sink: {} ({} rows)",
            self.output_dir.display(),
            rows
        );
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        for table in self.tables.values_mut() {
            table.writer = None;
            if table.committed && table.final_path.exists() {
                let _ = std::fs::remove_file(&table.final_path);
                warn!(
                    "Rolled back CSV committed file: {}",
                    table.final_path.display()
                );
            }
            if let Some(temp_path) = table.temp_path.take() {
                if temp_path.exists() {
                    let _ = std::fs::remove_file(&temp_path);
                    warn!("Rolled back CSV temp file: {}", temp_path.display());
                }
            }
            table.committed = false;
        }
        Ok(())
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        for table in self.tables.values_mut() {
            table.writer = None;
            if let Some(temp_path) = &table.temp_path {
                if temp_path.exists() {
                    let _ = std::fs::remove_file(temp_path);
                    warn!("Cleaned up orphaned temp file: {}", temp_path.display());
                }
            }
        }
    }
}
