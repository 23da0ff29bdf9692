use rusqlite::Connection;
use sqlcarve_engine::payload::sanitize;
use sqlcarve_engine::{CarveStats, CarvedRecord, FileReport, RecoveredRecord, Scenario, Value};
use sqlcarve_schema::{ColumnSpec, StorageClass, TableSpec};
use sqlcarve_sinks::{OutputTarget, RecordWriter, SOURCES_TABLE};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;

fn people() -> Arc<TableSpec> {
    Arc::new(TableSpec::new(
        "people",
        vec![
            ColumnSpec::new("id", StorageClass::RowidAlias),
            ColumnSpec::new("name", StorageClass::Text),
            ColumnSpec::new("age", StorageClass::Integer),
        ],
    ))
}

fn carved(table: &Arc<TableSpec>, scenario: Scenario, offset: u64, values: Vec<Value>) -> CarvedRecord {
    CarvedRecord {
        table: Arc::clone(table),
        record: RecoveredRecord {
            table: Arc::from(table.name.as_str()),
            scenario,
            source_offset: offset,
            source_file: Arc::from("mmssms.db"),
            values,
        },
    }
}

fn batch(table: &Arc<TableSpec>) -> Vec<CarvedRecord> {
    vec![
        carved(
            table,
            Scenario::Intact,
            4096,
            vec![
                Value::Integer(5),
                Value::Text("Bob".into()),
                Value::Integer(30),
            ],
        ),
        carved(
            table,
            Scenario::PrefixOverwritten,
            8200,
            vec![Value::RowidNotRecovered, Value::Text("Alice".into()), Value::Null],
        ),
    ]
}

fn report() -> FileReport {
    FileReport {
        path: PathBuf::from("mmssms.db"),
        size: 16384,
        blake3: "ab".repeat(32),
        header: None,
        stats: CarveStats {
            accepted: 2,
            ..CarveStats::default()
        },
    }
}

#[test]
fn test_sqlite_output_with_provenance() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("out").join("recovered.sqlite");
    let table = people();

    let mut writer =
        RecordWriter::open(OutputTarget::Sqlite(db_path.clone()), &[(*table).clone()]).unwrap();
    assert_eq!(writer.write_batch(&batch(&table)).unwrap(), 2);
    writer.record_source(&report()).unwrap();
    let summary = writer.finish().unwrap();
    assert_eq!(summary.written, 2);
    assert_eq!(summary.sources, 1);
    assert_eq!(summary.per_table.get("people"), Some(&2));

    let conn = Connection::open(&db_path).unwrap();
    let rows: Vec<(String, String, String, i64)> = conn
        .prepare(
            "SELECT CAST(id AS TEXT), name, _carve_scenario, _carve_offset FROM people ORDER BY _carve_offset",
        )
        .unwrap()
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        rows,
        vec![
            ("5".to_string(), "Bob".to_string(), "scenario 0".to_string(), 4096),
            (
                "rowid not recovered".to_string(),
                "Alice".to_string(),
                "scenario 2".to_string(),
                8200
            ),
        ]
    );

    let age: Option<i64> = conn
        .query_row("SELECT age FROM people WHERE name = 'Alice'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(age, None);

    let (hash, records): (String, i64) = conn
        .query_row(
            &format!("SELECT blake3, records FROM {}", SOURCES_TABLE),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(hash, "ab".repeat(32));
    assert_eq!(records, 2);
}

#[test]
fn test_sqlite_output_appends_across_runs() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("recovered.db");
    let table = people();

    for _ in 0..2 {
        let mut writer =
            RecordWriter::open(OutputTarget::Sqlite(db_path.clone()), &[(*table).clone()])
                .unwrap();
        writer.write_batch(&batch(&table)).unwrap();
        writer.finish().unwrap();
    }

    let conn = Connection::open(&db_path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 4);
}

#[test]
fn test_abort_discards_sqlite_rows() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("recovered.db");
    let table = people();

    let mut writer =
        RecordWriter::open(OutputTarget::Sqlite(db_path.clone()), &[(*table).clone()]).unwrap();
    writer.write_batch(&batch(&table)).unwrap();
    writer.abort().unwrap();

    let conn = Connection::open(&db_path).unwrap();
    let exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'people'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 0);
}

#[test]
fn test_guard_rolls_back() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("csv");
    let table = people();

    let mut writer = RecordWriter::open(OutputTarget::Csv(out.clone()), &[(*table).clone()]).unwrap();
    writer.write_batch(&batch(&table)).unwrap();
    let guard = || false;
    assert!(writer.finish_with_guard(Some(&guard)).is_err());

    assert!(!out.join("people.csv").exists());
    assert!(!out.join(".people.csv.tmp").exists());
}

#[test]
fn test_csv_output() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("csv");
    let table = people();

    let mut writer = RecordWriter::open(OutputTarget::Csv(out.clone()), &[(*table).clone()]).unwrap();
    writer.write_batch(&batch(&table)).unwrap();
    writer.record_source(&report()).unwrap();
    writer.finish().unwrap();

    let content = std::fs::read_to_string(out.join("people.csv")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines,
        vec![
            "id,name,age,_carve_scenario,_carve_offset,_carve_source",
            "5,Bob,30,scenario 0,4096,mmssms.db",
            "rowid not recovered,Alice,,scenario 2,8200,mmssms.db",
        ]
    );

    let sources = std::fs::read_to_string(out.join("_carve_sources.csv")).unwrap();
    assert!(sources.starts_with("source_file,blake3,size,records"));
    assert!(sources.contains("mmssms.db"));
    assert!(!out.join(".people.csv.tmp").exists());
}

#[test]
fn test_keyword_and_width_rejections() {
    let dir = tempdir().unwrap();
    let table = people();
    let mut records = batch(&table);
    records.push(carved(
        &table,
        Scenario::Intact,
        9000,
        vec![Value::Integer(1), Value::Text("Bobby".into())],
    ));

    let mut writer = RecordWriter::open(
        OutputTarget::Sqlite(dir.path().join("out.db")),
        &[(*table).clone()],
    )
    .unwrap()
    .with_keyword(Some("Bob".into()));
    assert_eq!(writer.write_batch(&records).unwrap(), 1);

    let summary = writer.finish().unwrap();
    assert_eq!(summary.written, 1);
    assert_eq!(summary.filtered, 1);
    assert_eq!(summary.rejected, 1);
}

fn single_column(name: &str, column: &str) -> Arc<TableSpec> {
    Arc::new(TableSpec::new(
        name,
        vec![ColumnSpec::new(column, StorageClass::Text)],
    ))
}

fn text_record(table: &Arc<TableSpec>, offset: u64, text: &str) -> CarvedRecord {
    carved(table, Scenario::Intact, offset, vec![Value::Text(text.into())])
}

fn table_exists(conn: &Connection, name: &str) -> bool {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .unwrap();
    count > 0
}

#[test]
fn test_conflicting_tables_are_skipped() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("out.db");
    let table = people();
    let clashing_id = single_column("odd", "_carve_id");
    let clashing_offset = single_column("odder", "_carve_offset");
    let reserved = single_column("sqlite_notes", "body");

    let mut writer = RecordWriter::open(
        OutputTarget::Sqlite(db_path.clone()),
        &[
            (*table).clone(),
            (*clashing_id).clone(),
            (*clashing_offset).clone(),
            (*reserved).clone(),
        ],
    )
    .unwrap();

    let mut records = batch(&table);
    records.push(text_record(&clashing_id, 100, "x"));
    records.push(text_record(&clashing_id, 200, "y"));
    records.push(text_record(&clashing_offset, 300, "z"));
    records.push(text_record(&reserved, 400, "w"));
    assert_eq!(writer.write_batch(&records).unwrap(), 2);

    let summary = writer.finish().unwrap();
    assert_eq!(summary.written, 2);
    assert_eq!(summary.rejected, 4);
    assert_eq!(summary.rejected_per_table.get("odd"), Some(&2));
    assert_eq!(summary.rejected_per_table.get("odder"), Some(&1));
    assert_eq!(summary.rejected_per_table.get("sqlite_notes"), Some(&1));

    let conn = Connection::open(&db_path).unwrap();
    assert!(table_exists(&conn, "people"));
    assert!(!table_exists(&conn, "odd"));
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn test_existing_table_of_other_shape_is_rejected() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("out.db");
    {
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch("CREATE TABLE people (x INTEGER);").unwrap();
    }
    let table = people();
    let calls = single_column("calls", "number");

    let mut writer = RecordWriter::open(
        OutputTarget::Sqlite(db_path.clone()),
        &[(*table).clone(), (*calls).clone()],
    )
    .unwrap();
    let mut records = batch(&table);
    records.push(text_record(&calls, 500, "+33 6 12 34 56 78"));
    assert_eq!(writer.write_batch(&records).unwrap(), 1);
    assert_eq!(writer.write_batch(&batch(&table)).unwrap(), 0);

    let summary = writer.finish().unwrap();
    assert_eq!(summary.written, 1);
    assert_eq!(summary.rejected_per_table.get("people"), Some(&4));
    assert_eq!(summary.per_table.get("calls"), Some(&1));

    let conn = Connection::open(&db_path).unwrap();
    let untouched: i64 = conn
        .query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))
        .unwrap();
    assert_eq!(untouched, 0);
}

#[test]
fn test_constraint_violation_skips_only_that_record() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("out.db");
    {
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE people (
                 _carve_id INTEGER PRIMARY KEY, id INTEGER, name TEXT UNIQUE, age INTEGER,
                 _carve_scenario TEXT NOT NULL, _carve_offset INTEGER NOT NULL,
                 _carve_source TEXT NOT NULL);
             INSERT INTO people (id, name, age, _carve_scenario, _carve_offset, _carve_source)
                 VALUES (5, 'Bob', 30, 'scenario 0', 1, 'earlier.db');",
        )
        .unwrap();
    }
    let table = people();
    let mut records = batch(&table);
    records.push(carved(
        &table,
        Scenario::Intact,
        9000,
        vec![
            Value::Integer(7),
            Value::Text("Carol".into()),
            Value::Integer(27),
        ],
    ));

    let mut writer =
        RecordWriter::open(OutputTarget::Sqlite(db_path.clone()), &[(*table).clone()]).unwrap();
    assert_eq!(writer.write_batch(&records).unwrap(), 2);
    let summary = writer.finish().unwrap();
    assert_eq!(summary.rejected, 1);

    let conn = Connection::open(&db_path).unwrap();
    let names: Vec<String> = conn
        .prepare("SELECT name FROM people ORDER BY name")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(names, vec!["Alice", "Bob", "Carol"]);
}

#[test]
fn test_keyword_with_quote_matches_cleaned_text() {
    let dir = tempdir().unwrap();
    let table = people();
    let records = vec![
        carved(
            &table,
            Scenario::Intact,
            4096,
            vec![
                Value::Integer(1),
                Value::Text(sanitize("Sean O'Brien")),
                Value::Integer(40),
            ],
        ),
        carved(
            &table,
            Scenario::PrefixOverwritten,
            8192,
            vec![Value::RowidNotRecovered, Value::Text("O Brien".into()), Value::Null],
        ),
    ];

    let mut writer = RecordWriter::open(
        OutputTarget::Sqlite(dir.path().join("out.db")),
        &[(*table).clone()],
    )
    .unwrap()
    .with_keyword(Some("O'Brien".into()));
    assert_eq!(writer.write_batch(&records).unwrap(), 1);
    assert_eq!(writer.finish().unwrap().filtered, 1);
}

#[test]
fn test_csv_file_name_clash_is_skipped() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("csv");
    let spaced = single_column("call log", "number");
    let underscored = single_column("call_log", "number");

    let mut writer = RecordWriter::open(
        OutputTarget::Csv(out.clone()),
        &[(*spaced).clone(), (*underscored).clone()],
    )
    .unwrap();
    let records = vec![
        text_record(&spaced, 10, "first"),
        text_record(&underscored, 20, "second"),
    ];
    assert_eq!(writer.write_batch(&records).unwrap(), 1);
    let summary = writer.finish().unwrap();
    assert_eq!(summary.rejected_per_table.get("call_log"), Some(&1));

    let content = std::fs::read_to_string(out.join("call_log.csv")).unwrap();
    assert!(content.contains("first"));
    assert!(!content.contains("second"));
}
