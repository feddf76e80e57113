use std::fs::File;
use timetravel_db::prelude::*;
use timetravel_db::storage::table::{read_jsonl, write_jsonl};

fn populated() -> TraceDB {
    let db = TraceDB::in_memory().unwrap();
    db.store(
        Record::builder(1, FieldKey::name("items"), EventKind::Var)
            .value_type("list")
            .value(Value::Ref(2))
            .expression("items = []")
            .line(1),
    );
    db.store(Record::builder(2, FieldKey::Index(0), EventKind::ListItem).value("a").line(2));
    db.store(Record::builder(2, FieldKey::Index(1), EventKind::ListItem).value(2.5).line(2));
    db.store(Record::builder(1, FieldKey::name("n"), EventKind::Var).value(7).line(3));
    db.store(Record::builder(1, FieldKey::name("n"), EventKind::Var).value(true).line(4));
    db
}

fn facts(rows: &[TableRow]) -> Vec<(EntityId, FieldKey, Value, LogicalTime)> {
    let mut out: Vec<_> = rows
        .iter()
        .map(|r| (r.entity_id, r.field.clone(), r.value.clone(), r.time))
        .collect();
    out.sort_by_key(|(_, _, _, t)| *t);
    out
}

#[test]
fn jsonl_export_reimports() {
    let db = populated();
    let rows = db.export_table();
    assert_eq!(rows.len(), 5);
    assert!(rows.windows(2).all(|w| w[0].time < w[1].time));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.jsonl");
    write_jsonl(&rows, File::create(&path).unwrap()).unwrap();
    let restored = read_jsonl(File::open(&path).unwrap()).unwrap();
    assert_eq!(facts(&restored), facts(&rows));

    let copy = TraceDB::in_memory().unwrap();
    copy.import_table(restored).unwrap();
    assert_eq!(copy.build_name("items", None, 4), db.build_name("items", None, 4));
    assert_eq!(copy.build_name("n", None, 3), Some(Value::Int(7)));
    // The clock continues after the imported rows.
    assert_eq!(
        copy.store(Record::builder(1, FieldKey::name("n"), EventKind::Var).value(0)),
        Some(5)
    );
}

#[test]
fn malformed_jsonl_is_reported() {
    let text = "{\"entityId\": 1}\n";
    match read_jsonl(text.as_bytes()) {
        Err(Error::Serialization(msg)) => assert!(msg.contains("line 1")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn failed_import_keeps_current_run() {
    let db = TraceDB::in_memory().unwrap();
    db.store(Record::builder(1, FieldKey::name("y"), EventKind::Var).value(9).line(1));

    let source = TraceDB::in_memory().unwrap();
    source.store(Record::builder(1, FieldKey::name("x"), EventKind::Var).value(1).line(1));
    source.store(Record::builder(1, FieldKey::name("x"), EventKind::Var).value(2).line(2));
    let rows = source.export_table();
    let duplicated = vec![rows[0].clone(), rows[1].clone(), rows[0].clone()];

    assert!(matches!(db.import_table(duplicated), Err(Error::Temporal(_))));
    assert_eq!(db.build_name("y", None, 0), Some(Value::Int(9)));
    assert_eq!(db.build_name("x", None, 1), None);
    assert_eq!(
        db.store(Record::builder(1, FieldKey::name("y"), EventKind::Var).value(10)),
        Some(1)
    );
}
