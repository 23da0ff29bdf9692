//! `sqlcarve info`: database header of each input.

use crate::cli::inputs::collect_inputs;
use anyhow::{Context, Result};
use serde::Serialize;
use sqlcarve_engine::db_header::HEADER_LEN;
use sqlcarve_engine::DatabaseHeader;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Arguments for the info command
#[derive(Debug, clap::Args)]
pub struct InfoArgs {
    /// Files or directories to inspect
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct FileInfo {
    path: PathBuf,
    size: u64,
    header: Option<DatabaseHeader>,
    sqlite_version: Option<String>,
}

fn inspect(path: &Path) -> Result<FileInfo> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let size = file
        .metadata()
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    let mut head = Vec::with_capacity(HEADER_LEN);
    file.take(HEADER_LEN as u64)
        .read_to_end(&mut head)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let header = DatabaseHeader::parse(&head);
    let sqlite_version = header.as_ref().map(DatabaseHeader::version_string);
    Ok(FileInfo {
        path: path.to_path_buf(),
        size,
        header,
        sqlite_version,
    })
}

/// Run the info command
pub fn run(args: InfoArgs) -> Result<()> {
    let inputs = collect_inputs(&args.inputs)?;
    let infos = inputs
        .iter()
        .map(|path| inspect(path))
        .collect::<Result<Vec<_>>>()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    for info in &infos {
        println!("{} ({} bytes)", info.path.display(), info.size);
        match &info.header {
            Some(h) => {
                println!("  page size:       {}", h.page_size);
                println!("  pages:           {}", h.page_count);
                println!("  format:          write {}, read {}", h.write_version, h.read_version);
                println!("  reserved bytes:  {}", h.reserved_bytes);
                println!("  change counter:  {}", h.change_counter);
                println!("  schema cookie:   {}", h.schema_cookie);
                println!("  auto vacuum:     {}", if h.auto_vacuum { "yes" } else { "no" });
                println!("  text encoding:   {}", h.text_encoding);
                println!("  sqlite version:  {}", h.version_string());
            }
            None => println!("  no SQLite header (journal, WAL or fragment)"),
        }
        println!();
    }
    Ok(())
}
