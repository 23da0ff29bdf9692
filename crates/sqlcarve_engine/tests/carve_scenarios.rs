//! End-to-end carving of synthetic live and deleted cells, one layout each.

mod support;

use sqlcarve_engine::{CarveOptions, CarvedRecord, Carver, Scenario, Value};
use sqlcarve_schema::{ColumnSpec, StorageClass, TableSpec};
use std::io::Write;
use support::{padded, people, CellBuilder};

fn carve(table: TableSpec, scenario: Scenario, buf: &[u8]) -> Vec<CarvedRecord> {
    let options = CarveOptions {
        threads: 2,
        scenarios: vec![scenario],
        keyword: None,
    };
    Carver::new(vec![table], &options).carve_to_vec(buf, "test.db").0
}

fn values_at(records: &[CarvedRecord], offset: usize) -> Option<Vec<Value>> {
    records
        .iter()
        .find(|r| r.record.source_offset == offset as u64)
        .map(|r| r.record.values.clone())
}

fn bob(rowid: u64) -> CellBuilder {
    CellBuilder::new(rowid).null().text("Bob").int(30)
}

#[test]
fn test_intact_concrete_example() {
    let cell = bob(5).build();
    assert_eq!(
        cell,
        vec![0x08, 0x05, 0x04, 0x00, 0x13, 0x01, b'B', b'o', b'b', 0x1E]
    );
    let records = carve(people(), Scenario::Intact, &cell);
    assert_eq!(records.len(), 1);
    let record = &records[0].record;
    assert_eq!(record.scenario_label(), "scenario 0");
    assert_eq!(&*record.table, "people");
    assert_eq!(&*record.source_file, "test.db");
    assert_eq!(
        record.values,
        vec![Value::Integer(5), Value::Text("Bob".into()), Value::Integer(30)]
    );
}

#[test]
fn test_prefix_overwritten() {
    // payload length (1) + rowid (2) + header length (1) under the freeblock
    let (buf, at) = padded(&bob(200).freed(0), 16, 16);
    let records = carve(people(), Scenario::PrefixOverwritten, &buf);
    assert_eq!(
        values_at(&records, at),
        Some(vec![
            Value::RowidNotRecovered,
            Value::Text("Bob".into()),
            Value::Integer(30)
        ])
    );
}

#[test]
fn test_length_and_rowid_overwritten() {
    // payload length (1) + rowid (3)
    let (buf, at) = padded(&bob(20_000).freed(0x0FA0), 16, 16);
    let records = carve(people(), Scenario::LengthAndRowidOverwritten, &buf);
    assert_eq!(
        values_at(&records, at),
        Some(vec![
            Value::RowidNotRecovered,
            Value::Text("Bob".into()),
            Value::Integer(30)
        ])
    );
}

#[test]
fn test_rowid_split() {
    // payload length (1) + rowid (4): one rowid byte survives
    let (buf, at) = padded(&bob(0x20_0000).freed(0), 16, 16);
    let records = carve(people(), Scenario::RowidSplit, &buf);
    let values = values_at(&records, at).expect("record at cell start");
    assert_eq!(values[0], Value::RowidNotRecovered);
    assert_eq!(values[0].to_string(), "rowid not recovered");
    assert_eq!(values[1], Value::Text("Bob".into()));
    assert_eq!(values[2], Value::Integer(30));
}

#[test]
fn test_first_type_overwritten() {
    let table = TableSpec::new(
        "counters",
        vec![
            ColumnSpec::new("n", StorageClass::Integer),
            ColumnSpec::new("name", StorageClass::Text),
            ColumnSpec::new("age", StorageClass::Integer),
        ],
    );
    let cell = CellBuilder::new(5).int(300).text("Bob").int(30);
    let (buf, at) = padded(&cell.freed(0), 16, 16);
    let records = carve(table, Scenario::FirstTypeOverwritten, &buf);
    assert_eq!(
        values_at(&records, at),
        Some(vec![
            Value::Integer(300),
            Value::Text("Bob".into()),
            Value::Integer(30)
        ])
    );
}

#[test]
fn test_array_length_split() {
    let mut columns = vec![ColumnSpec::new("name", StorageClass::Text)];
    let mut cell = CellBuilder::new(5).text("Bob");
    for i in 0..125 {
        columns.push(ColumnSpec::new(format!("c{i}"), StorageClass::Integer));
        cell = cell.raw(8, &[]);
    }
    columns.push(ColumnSpec::new("age", StorageClass::Integer));
    cell = cell.int(30);
    let table = TableSpec::new("wide", columns);

    let header = cell.header();
    assert_eq!(&header[..2], &[0x81, 0x01]);
    let live = cell.build();
    assert_eq!(live.len(), 136);

    let (buf, at) = padded(&cell.freed(0), 8, 8);
    let records = carve(table.clone(), Scenario::ArrayLengthSplit, &buf);
    let values = values_at(&records, at).expect("record at cell start");
    assert_eq!(values.len(), 127);
    assert_eq!(values[0], Value::Text("Bob".into()));
    assert!(values[1..126].iter().all(|v| *v == Value::Integer(0)));
    assert_eq!(values[126], Value::Integer(30));

    // The same cell while still live.
    let records = carve(table, Scenario::Intact, &live);
    assert_eq!(values_at(&records, 0).map(|v| v.len()), Some(127));
}

#[test]
fn test_all_null_record_never_emitted() {
    let table = TableSpec::new(
        "t",
        vec![
            ColumnSpec::new("a", StorageClass::Integer),
            ColumnSpec::new("b", StorageClass::Text),
        ],
    );
    let cell = CellBuilder::new(1).null().null();
    let (buf, _) = padded(&cell.build(), 4, 4);
    let (freed, _) = padded(&CellBuilder::new(300).null().null().freed(0), 4, 4);
    for scenario in Scenario::ALL {
        assert!(carve(table.clone(), scenario, &buf).is_empty(), "{scenario}");
        assert!(carve(table.clone(), scenario, &freed).is_empty(), "{scenario}");
    }
}

#[test]
fn test_column_count_must_match_table() {
    let two = CellBuilder::new(5).text("Bob").int(30).build();
    let (buf, _) = padded(&two, 4, 4);
    let records = carve(people(), Scenario::Intact, &buf);
    assert!(records
        .iter()
        .all(|r| r.record.values.len() == people().column_count()));
    assert!(records.is_empty());
}

#[test]
fn test_keyword_restricts_intact_matches() {
    let mut page = bob(5).build();
    page.extend(CellBuilder::new(6).null().text("Eve").int(41).build());

    let carve_with = |keyword: &str| {
        let options = CarveOptions {
            threads: 1,
            scenarios: vec![Scenario::Intact],
            keyword: Some(keyword.to_string()),
        };
        Carver::new(vec![people()], &options).carve_to_vec(&page, "mem").0
    };

    let eve = carve_with("Eve");
    assert_eq!(eve.len(), 1);
    assert_eq!(eve[0].record.values[0], Value::Integer(6));
    assert!(carve_with("Mallory").is_empty());
}

#[test]
fn test_carve_file_reports_digest() {
    let mut page = vec![0u8; 64];
    page.extend(bob(5).build());
    page.extend(vec![0u8; 32]);
    page.extend(bob(200).freed(0));
    page.extend(vec![0u8; 32]);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&page).unwrap();
    file.flush().unwrap();

    let carver = Carver::new(vec![people()], &CarveOptions::default());
    let (tx, rx) = std::sync::mpsc::sync_channel(4);
    let report = std::thread::scope(|scope| {
        let collector = scope.spawn(move || rx.into_iter().flatten().collect::<Vec<CarvedRecord>>());
        let report = carver.carve_file(file.path(), &tx).unwrap();
        drop(tx);
        let records = collector.join().unwrap();
        assert!(records
            .iter()
            .any(|r| r.record.scenario == Scenario::Intact && r.record.source_offset == 64));
        assert!(records
            .iter()
            .any(|r| r.record.scenario == Scenario::PrefixOverwritten));
        report
    });

    assert_eq!(report.size, page.len() as u64);
    assert_eq!(report.blake3, blake3::hash(&page).to_hex().to_string());
    assert!(report.header.is_none());
    assert!(report.stats.accepted >= 2);
    assert!(report.stats.per_scenario[0] >= 1);
    assert!(report.stats.per_scenario[2] >= 1);
}

#[test]
fn test_carve_missing_file() {
    let carver = Carver::new(vec![people()], &CarveOptions::default());
    let (tx, _rx) = std::sync::mpsc::sync_channel(1);
    let err = carver
        .carve_file(std::path::Path::new("/definitely/not/here.db"), &tx)
        .unwrap_err();
    assert!(!err.is_rejection());
}
