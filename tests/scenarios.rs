use timetravel_db::prelude::*;
use timetravel_db::query::align::meld;
use timetravel_db::query::EvalResultEntry;

fn var(entity: EntityId, name: &str, value: impl Into<Value>, line: u32) -> RecordDraft {
    Record::builder(entity, FieldKey::name(name), EventKind::Var)
        .value(value)
        .line(line)
}

#[test]
fn variable_versions_coalesce() {
    let db = TraceDB::in_memory().unwrap();
    for (v, line) in [(1, 1), (2, 2), (2, 3), (3, 4)] {
        db.store(var(1, "x", v, line));
    }

    let trace = db.trace();
    let history = trace.field_history(1, &FieldKey::name("x")).unwrap();
    let ranges: Vec<_> = history
        .ranges()
        .map(|(range, slot)| (range, slot.value.clone()))
        .collect();
    assert_eq!(
        ranges,
        vec![
            (TimeRange::new(0, 0), Value::Int(1)),
            (TimeRange::new(1, 2), Value::Int(2)),
            (TimeRange::new(3, 3), Value::Int(3)),
        ]
    );
    assert_eq!(db.build_name("x", None, 2), Some(Value::Int(2)));
    assert_eq!(db.build_name("x", None, 10), Some(Value::Int(3)));
}

#[test]
fn until_is_anchored_at_first_witness() {
    let db = TraceDB::in_memory().unwrap();
    db.store(var(1, "a", 1, 1));
    db.store(var(1, "b", 0, 2));
    db.store(var(1, "b", 2, 3));
    db.store(var(1, "b", 5, 3));
    db.store(var(1, "b", 7, 3));

    let select = "Until(Raw('a>0'), Raw('b==5'))";
    let key = "Until(a>0, b==5)";
    let result = db.evaluate(select, None, Some(0), Some(4)).unwrap();
    assert_eq!(result.keys(), vec![key.to_string()]);
    assert_eq!(
        result.flags(TimeRange::new(0, 4)),
        vec![true, true, true, true, false]
    );

    let doc = db.query(select, None, Some(0), Some(4));
    assert_eq!(doc["keys"], serde_json::json!([key]));
    assert_eq!(doc["(0, 3)"][key], serde_json::json!(true));
    assert_eq!(doc["(4, 4)"][key], serde_json::json!(false));
}

#[test]
fn meld_marks_skipped_rows() {
    let series = |symbols: &[&str]| {
        EvalResult::from_entries(
            symbols
                .iter()
                .enumerate()
                .map(|(t, s)| EvalResultEntry::new(t as LogicalTime).with("s", Some(Value::str(*s))))
                .collect(),
        )
    };
    let melded = meld(&series(&["A", "B", "C"]), &series(&["A", "C"]), "-");
    assert_eq!(melded.len(), 3);
    let middle = melded.get(1).unwrap();
    assert_eq!(middle.get("left.s"), Some(&Some(Value::str("B"))));
    assert_eq!(middle.get("right.s"), Some(&Some(Value::str("-"))));
}

#[test]
fn meld_aligns_every_instant() {
    let series = |symbols: &[&str]| {
        EvalResult::from_entries(
            symbols
                .iter()
                .enumerate()
                .map(|(t, s)| EvalResultEntry::new(t as LogicalTime).with("s", Some(Value::str(*s))))
                .collect(),
        )
    };
    let melded = meld(&series(&["A", "A", "B"]), &series(&["A", "B"]), "-");
    assert_eq!(melded.len(), 3);
    let placeholders = melded
        .entries()
        .iter()
        .filter(|e| e.get("right.s") == Some(&Some(Value::str("-"))))
        .count();
    assert_eq!(placeholders, 1);
    let last = melded.get(2).unwrap();
    assert_eq!(last.get("left.s"), Some(&Some(Value::str("B"))));
    assert_eq!(last.get("right.s"), Some(&Some(Value::str("B"))));
}

#[test]
fn meld_through_the_front_end() {
    let db = TraceDB::in_memory().unwrap();
    for (name, v) in [("s", "A"), ("s", "B"), ("s", "C"), ("u", "A"), ("u", "C")] {
        db.store(var(1, name, v, 1));
    }
    let result = db.evaluate("Meld(s, u)", None, None, None).unwrap();
    assert_eq!(
        result.keys(),
        vec!["left.s".to_string(), "right.u".to_string()]
    );
    assert!(!result.is_empty());

    let doc = db.query("Meld(s > 'A', u)", None, None, None);
    assert!(doc.get("error").is_none());
    let doc = db.query("Meld(Whenever(s), u)", None, None, None);
    assert!(doc["error"].as_str().unwrap().contains("Composition"));
}

#[test]
fn list_items_append_past_the_end() {
    let db = TraceDB::in_memory().unwrap();
    db.store(
        Record::builder(1, FieldKey::name("xs"), EventKind::Var)
            .value_type("list")
            .value(Value::Ref(2))
            .line(1),
    );
    let item = |i: i64, v: i64| Record::builder(2, FieldKey::Index(i), EventKind::ListItem).value(v);
    db.store(item(0, 10));
    db.store(item(1, 20));
    db.store(item(5, 30));
    db.store(item(0, 11));

    assert_eq!(
        db.build_name("xs", None, 3),
        Some(Value::List(vec![Value::Int(10), Value::Int(20), Value::Int(30)]))
    );
    assert_eq!(
        db.build(2, 4),
        Some(Value::List(vec![Value::Int(11), Value::Int(20), Value::Int(30)]))
    );
    assert_eq!(db.lifetime(2), Some(TimeRange::new(1, 4)));
}

#[test]
fn where_clause_restricts_every_item() {
    let db = TraceDB::in_memory().unwrap();
    for (i, v) in [3, 8, 1, 9].into_iter().enumerate() {
        db.store(var(1, "n", v, 10 + i as u32));
    }
    let result = db.evaluate("n, n * 2", Some("n > 5"), None, None).unwrap();
    assert_eq!(result.len(), 4);
    assert!(result.get(0).unwrap().results.is_empty());
    let row = result.get(3).unwrap();
    assert_eq!(row.get("n"), Some(&Some(Value::Int(9))));
    assert_eq!(row.get("n * 2"), Some(&Some(Value::Int(18))));
}

#[test]
fn destructuring_renames_keys() {
    let db = TraceDB::in_memory().unwrap();
    db.store(var(1, "a", 1, 1));
    db.store(var(1, "b", 2, 2));
    let result = db
        .evaluate("(first, second) = Union(a, b)", None, None, None)
        .unwrap();
    assert_eq!(result.keys(), vec!["first".to_string(), "second".to_string()]);
    assert_eq!(result.get(1).unwrap().get("second"), Some(&Some(Value::Int(2))));
}

#[test]
fn recursion_resolves_to_innermost_frame() {
    let db = TraceDB::in_memory().unwrap();
    let enter = |frame: EntityId| {
        Record::builder(frame, FieldKey::name("fact"), EventKind::ScopeEnter).extra("10:14")
    };
    let exit = |frame: EntityId| Record::builder(frame, FieldKey::name("fact"), EventKind::ScopeExit);

    db.store(enter(2)); // 0
    db.store(var(2, "n", 2, 10)); // 1
    db.store(enter(3)); // 2
    db.store(var(3, "n", 1, 10)); // 3
    db.store(exit(3)); // 4
    db.store(var(2, "r", 2, 12)); // 5
    db.store(exit(2)); // 6

    assert_eq!(db.build_name("n", Some(10), 3), Some(Value::Int(1)));
    assert_eq!(db.build_name("n", Some(10), 5), Some(Value::Int(2)));

    let result = db.evaluate("InFunction('fact')", None, None, None).unwrap();
    assert!(result.flags(TimeRange::new(0, 6)).iter().all(|x| *x));
}

#[test]
fn loop_iterations_collect_assigned_variables() {
    let db = TraceDB::in_memory().unwrap();
    let marker = |kind: EventKind| Record::builder(1, FieldKey::name("for"), kind).line(4);

    db.store(marker(EventKind::LoopStart)); // 0
    for i in 0..3 {
        db.store(marker(EventKind::LoopIter)); // 1, 4, 7
        db.store(var(1, "i", i, 4));
        db.store(var(1, "total", i * 10, 5));
    }
    db.store(marker(EventKind::LoopEnd)); // 10

    let second = db.evaluate("LoopIteration(4, 1)", None, None, None).unwrap();
    assert_eq!(second.len(), 3);
    let row = second.get(6).unwrap();
    assert_eq!(row.get("iteration"), Some(&Some(Value::Int(1))));
    assert_eq!(row.get("total"), Some(&Some(Value::Int(10))));

    let summary = db.evaluate("LoopSummary(4)", None, None, None).unwrap();
    assert_eq!(summary.len(), 9);
    assert_eq!(summary.get(9).unwrap().get("i"), Some(&Some(Value::Int(2))));

    assert!(db.evaluate("LoopIteration(4, 7)", None, None, None).unwrap().is_empty());
}

#[test]
fn globally_and_release_through_the_front_end() {
    let db = TraceDB::in_memory().unwrap();
    db.store(var(1, "b", 1, 1)); // 0
    db.store(var(1, "a", 1, 2)); // 1
    db.store(var(1, "b", 0, 3)); // 2
    db.store(var(1, "b", 3, 4)); // 3
    let window = TimeRange::new(0, 3);

    let globally = db.evaluate("Globally(b > 0)", None, None, None).unwrap();
    assert_eq!(globally.keys(), vec!["Globally(b > 0)".to_string()]);
    assert_eq!(globally.flags(window), vec![false, false, false, true]);

    let release = db.evaluate("Release(a >= 1, b > 0)", None, None, None).unwrap();
    assert_eq!(release.keys(), vec!["Release(a >= 1, b > 0)".to_string()]);
    assert_eq!(release.flags(window), vec![true, true, false, true]);
}

#[test]
fn oversized_raw_values_are_none() {
    let db = TraceDB::in_memory().unwrap();
    db.store(var(1, "n", 3, 1));
    let select = "Raw('len(range(-9000000000000000000, 9000000000000000000))'), \
                  Raw('[n] * 1000000000000000000'), Raw('n * 2')";
    let result = db.evaluate(select, None, None, None).unwrap();
    let row = result.get(0).unwrap();
    assert_eq!(
        row.get("len(range(-9000000000000000000, 9000000000000000000))"),
        Some(&None)
    );
    assert_eq!(row.get("[n] * 1000000000000000000"), Some(&None));
    assert_eq!(row.get("n * 2"), Some(&Some(Value::Int(6))));
}

#[test]
fn deep_nesting_is_an_error_document() {
    let db = TraceDB::in_memory().unwrap();
    db.store(var(1, "x", 1, 1));

    let parens = format!("Raw('{}1{}')", "(".repeat(10_000), ")".repeat(10_000));
    let doc = db.query(&parens, None, None, None);
    assert_eq!(doc["keys"], serde_json::json!([]));
    assert!(doc["error"].as_str().unwrap().contains("nested"));

    let operators = format!("{}x{}", "Not(".repeat(10_000), ")".repeat(10_000));
    let doc = db.query(&operators, None, None, None);
    assert!(doc["error"].as_str().unwrap().contains("nested"));

    let doc = db.query("x", Some(&format!("{}x", "not ".repeat(10_000))), None, None);
    assert!(doc["error"].as_str().unwrap().contains("nested"));
}
