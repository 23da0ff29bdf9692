//! Helpful error types for CLI commands
//!
//! Every error includes what went wrong, optional context, and suggestions.

use std::fmt;
use std::path::{Path, PathBuf};

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions
            .extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// Path does not exist
    pub fn path_not_found(path: &Path) -> Self {
        Self::new(format!("Path not found: {}", path.display()))
            .with_context("The specified path does not exist on the filesystem")
            .with_suggestions([
                format!("TRY: Check that the path exists: ls -la {}", path.display()),
                "TRY: Verify you have read permissions for this path".to_string(),
            ])
    }

    /// Schema config could not be loaded
    pub fn schema_invalid(path: &Path, details: &str) -> Self {
        Self::new(format!("Cannot load schema config: {}", path.display()))
            .with_context(details.to_string())
            .with_suggestions([
                "TRY: The file must be a JSON array: [ {general info}, {\"table\": {\"column\": \"TYPE\"}}, ... ]".to_string(),
                format!("TRY: Validate the JSON: python -m json.tool {}", path.display()),
            ])
    }

    /// Schema config declares no usable tables
    pub fn no_tables(path: &Path) -> Self {
        Self::new(format!("No tables declared in {}", path.display()))
            .with_context("Every element after the first must map a table name to its columns")
            .with_suggestion("TRY: Add at least one table: {\"urls\": {\"id\": \"INTEGER PRIMARY KEY\", \"url\": \"TEXT\"}}")
    }

    /// Nothing to carve after walking the inputs
    pub fn no_inputs(paths: &[PathBuf]) -> Self {
        let listed = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::new("No carvable input files found")
            .with_context(format!("Searched: {}", listed))
            .with_suggestions([
                "TRY: Directories are searched for .sqlite .sqlite3 .db .db3 .sqlitedb files and their -journal/-wal companions".to_string(),
                "TRY: Pass the file itself to carve a file with any other name".to_string(),
            ])
    }

    /// Scenario number outside 0-5
    pub fn invalid_scenario(value: u8) -> Self {
        Self::new(format!("Unknown scenario: {}", value))
            .with_context("Scenarios are numbered 0 to 5")
            .with_suggestions([
                "TRY: --scenarios 0,2,3".to_string(),
                "TRY: Omit --scenarios to carve all six layouts".to_string(),
            ])
    }

    /// Output target could not be opened
    pub fn output_unavailable(target: &str, details: &str) -> Self {
        Self::new(format!("Cannot open output: {}", target))
            .with_context(details.to_string())
            .with_suggestions([
                "TRY: sqlite://<file> for a SQLite database, csv://<dir> for CSV files".to_string(),
                "TRY: Check that the output location is writable".to_string(),
            ])
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// Print an error as a JSON object on stdout, for `--json` callers.
pub fn print_json_error(err: &anyhow::Error) {
    let payload = match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({
            "error": helpful.message,
            "context": helpful.context,
            "suggestions": helpful.suggestions,
        }),
        None => serde_json::json!({
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(|c| c.to_string()).collect::<Vec<_>>(),
        }),
    };
    match serde_json::to_string_pretty(&payload) {
        Ok(text) => println!("{}", text),
        Err(_) => eprintln!("{}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpful_error_display() {
        let err = HelpfulError::new("Something went wrong")
            .with_context("While carving")
            .with_suggestion("Try again");

        let display = format!("{}", err);
        assert!(display.contains("ERROR: Something went wrong"));
        assert!(display.contains("CONTEXT: While carving"));
        assert!(display.contains("Try again"));
    }

    #[test]
    fn test_path_not_found() {
        let err = HelpfulError::path_not_found(Path::new("/nonexistent/evidence.db"));
        let display = format!("{}", err);
        assert!(display.contains("/nonexistent/evidence.db"));
        assert!(display.contains("TRY:"));
    }

    #[test]
    fn test_no_inputs_lists_paths() {
        let err = HelpfulError::no_inputs(&[PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(err.context.as_deref(), Some("Searched: a, b"));
    }

    #[test]
    fn test_downcast_from_anyhow() {
        let err: anyhow::Error = HelpfulError::invalid_scenario(9).into();
        let helpful = err.downcast_ref::<HelpfulError>().unwrap();
        assert_eq!(helpful.message, "Unknown scenario: 9");
    }
}
