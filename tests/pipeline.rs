mod common;

use std::sync::Arc;

use anyhow::anyhow;
use autocast::{
    commit::Disposition,
    hook::{BulkRecordHook, HookOptions, RecordHook},
    pipeline::{Autocast, RunOutcome, run_hook},
    provider::{MemorySink, MemorySource, StaticSchemaProvider},
    record::{Batch, Record, RecordId},
    schema::{FieldDecl, FieldType, SheetSchema},
    value::{Primitive, Severity},
};
use common::{contacts_batch, contacts_schema};

const EPOCH: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

fn autocast(sink: Arc<MemorySink>) -> Autocast {
    let provider = StaticSchemaProvider::new().with_sheet("us_sh_1", contacts_schema());
    Autocast::new(Arc::new(provider), sink)
}

fn settled(outcome: RunOutcome) -> autocast::pipeline::CastSummary {
    match outcome {
        RunOutcome::Settled(summary) => summary,
        other => panic!("expected a settled run, got {other:?}"),
    }
}

#[tokio::test]
async fn casts_declared_types_and_commits_once() {
    let sink = Arc::new(MemorySink::default());
    let mut batch = contacts_batch("us_sh_1");

    let summary = settled(autocast(sink.clone()).run(&mut batch).await.unwrap());

    assert_eq!(summary.fields, vec!["age", "alive", "joined", "category"]);
    assert!(matches!(summary.disposition, Disposition::Committed(_)));
    assert_eq!(sink.commit_count(), 1);

    let first = batch.record(RecordId(1)).unwrap();
    assert_eq!(first.get("firstName"), Some(&Primitive::from("John")));
    assert_eq!(first.get("age"), Some(&Primitive::from(1234.0)));
    assert_eq!(first.get("alive"), Some(&Primitive::from(true)));
    assert_eq!(first.get("joined"), Some(&Primitive::from(EPOCH)));
    assert_eq!(first.get("category"), Some(&Primitive::from("one")));
    assert!(!first.has_errors());

    let second = batch.record(RecordId(2)).unwrap();
    assert_eq!(second.get("age"), Some(&Primitive::from("abc")));
    assert_eq!(
        second.get("joined"),
        Some(&Primitive::from("Mon, 06 May 2024 00:00:00 GMT"))
    );
    let errors: Vec<(&str, &str)> = second
        .messages()
        .filter(|message| message.severity == Severity::Error)
        .map(|message| (message.field.as_str(), message.text.as_str()))
        .collect();
    assert_eq!(errors.len(), 2);
    assert!(errors.contains(&("age", "Invalid number")));
    assert!(errors.iter().any(|(field, _)| *field == "alive"));

    let third = batch.record(RecordId(3)).unwrap();
    assert_eq!(third.get("age"), None);
    assert_eq!(third.get("alive"), Some(&Primitive::from(false)));
    assert!(third.cell("joined").unwrap().has_errors());
    assert!(!third.cell("age").unwrap().has_errors());

    let committed = sink.commits();
    assert_eq!(committed[0].records, batch.records);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let sink = Arc::new(MemorySink::default());
    let pipeline = autocast(sink.clone());
    let mut batch = contacts_batch("us_sh_1");

    pipeline.run(&mut batch).await.unwrap();
    let values_after_first: Vec<_> = batch
        .records
        .iter()
        .map(|record| record.cells().iter().map(|c| c.value.clone()).collect::<Vec<_>>())
        .collect();

    let summary = settled(pipeline.run(&mut batch).await.unwrap());
    assert_eq!(summary.disposition, Disposition::NoOp);
    assert_eq!(sink.commit_count(), 1);
    let values_after_second: Vec<_> = batch
        .records
        .iter()
        .map(|record| record.cells().iter().map(|c| c.value.clone()).collect::<Vec<_>>())
        .collect();
    assert_eq!(values_after_first, values_after_second);
}

#[tokio::test]
async fn unavailable_schema_leaves_batch_untouched() {
    let sink = Arc::new(MemorySink::default());
    let mut batch = contacts_batch("us_sh_unknown");
    let before = batch.clone();

    let outcome = autocast(sink.clone()).run(&mut batch).await.unwrap();

    assert_eq!(outcome, RunOutcome::SchemaUnavailable);
    assert_eq!(batch, before);
    assert_eq!(sink.commit_count(), 0);
}

#[tokio::test]
async fn slug_filter_ignores_other_sheets() {
    let sink = Arc::new(MemorySink::default());
    let mut batch = contacts_batch("us_sh_1");
    let before = batch.clone();

    let outcome = autocast(sink.clone())
        .with_sheet_slug("invoices")
        .run(&mut batch)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Ignored {
            slug: "contacts".into()
        }
    );
    assert_eq!(batch, before);
    assert_eq!(sink.commit_count(), 0);

    let outcome = autocast(sink.clone())
        .with_sheet_slug("*")
        .run(&mut batch)
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Settled(_)));
}

#[tokio::test]
async fn allow_list_limits_casting_to_listed_keys() {
    let sink = Arc::new(MemorySink::default());
    let mut batch = contacts_batch("us_sh_1");

    let summary = settled(
        autocast(sink.clone())
            .with_fields(Some(vec!["firstName".into(), "age".into(), "nope".into()]))
            .run(&mut batch)
            .await
            .unwrap(),
    );

    assert_eq!(summary.fields, vec!["firstName", "age"]);
    let first = batch.record(RecordId(1)).unwrap();
    assert_eq!(first.get("age"), Some(&Primitive::from(1234.0)));
    assert_eq!(first.get("alive"), Some(&Primitive::from("YES")));
    assert_eq!(first.get("joined"), Some(&Primitive::from("0")));
}

#[tokio::test]
async fn chunking_does_not_change_results() {
    let mut whole = contacts_batch("us_sh_1");
    let mut chunked = contacts_batch("us_sh_1");

    autocast(Arc::new(MemorySink::default()))
        .run(&mut whole)
        .await
        .unwrap();
    let summary = settled(
        autocast(Arc::new(MemorySink::default()))
            .with_options(HookOptions::new(1, 3, true).unwrap())
            .run(&mut chunked)
            .await
            .unwrap(),
    );

    assert_eq!(summary.execution.chunks, 3);
    assert!(summary.execution.is_clean());
    assert_eq!(whole, chunked);
}

#[tokio::test]
async fn failing_chunk_keeps_other_chunks() {
    let sink = MemorySink::default();
    let mut batch = contacts_batch("us_sh_1");
    let handler = RecordHook::new(|record: &mut Record| {
        if record.id() == RecordId(2) {
            return Err(anyhow!("boom"));
        }
        record.set("seen", true);
        Ok(())
    });

    let run = run_hook(
        &mut batch,
        &handler,
        &HookOptions::new(1, 2, false).unwrap(),
        &sink,
    )
    .await
    .unwrap();

    assert_eq!(run.execution.failures.len(), 1);
    assert_eq!(run.execution.failures[0].index, 1);
    assert!(run.execution.failures[0].message.contains("boom"));
    assert_eq!(
        batch.record(RecordId(1)).unwrap().get("seen"),
        Some(&Primitive::from(true))
    );
    assert_eq!(batch.record(RecordId(2)).unwrap().get("seen"), None);
    assert_eq!(
        batch.record(RecordId(3)).unwrap().get("seen"),
        Some(&Primitive::from(true))
    );
    assert_eq!(sink.commit_count(), 1);
}

#[tokio::test]
async fn messages_alone_do_not_commit() {
    let sink = MemorySink::default();
    let mut batch = contacts_batch("us_sh_1");
    let handler = BulkRecordHook::new(|records: &mut [Record]| {
        for record in records {
            record.add_warning("firstName", "Check spelling");
        }
        Ok(())
    });

    let run = run_hook(&mut batch, &handler, &HookOptions::default(), &sink)
        .await
        .unwrap();

    assert_eq!(run.disposition, Disposition::NoOp);
    assert_eq!(sink.commit_count(), 0);
    assert_eq!(batch.message_count(), 3);
}

#[tokio::test]
async fn run_from_source_returns_the_cast_batch() {
    let sink = Arc::new(MemorySink::default());
    let source = MemorySource::new().with_batch(contacts_batch("us_sh_1"));

    let (batch, outcome) = autocast(sink.clone())
        .run_from_source(&source, "us_sh_1")
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Settled(_)));
    assert_eq!(
        batch.record(RecordId(1)).unwrap().get("age"),
        Some(&Primitive::from(1234.0))
    );
    assert!(
        autocast(sink)
            .run_from_source(&source, "missing")
            .await
            .is_err()
    );
}

#[tokio::test]
async fn repeated_keys_still_commit_changes() {
    let sink = Arc::new(MemorySink::default());
    let provider = StaticSchemaProvider::new().with_sheet(
        "ages",
        SheetSchema::new("ages", vec![FieldDecl::new("age", FieldType::Number)]),
    );
    let record = Record::from_values(
        RecordId(1),
        [
            ("age", Some(Primitive::from("42"))),
            ("age", Some(Primitive::from("7"))),
        ],
    );
    let mut batch = Batch::new("ages", vec![record]);

    let summary = settled(
        Autocast::new(Arc::new(provider), sink.clone())
            .run(&mut batch)
            .await
            .unwrap(),
    );

    assert!(matches!(summary.disposition, Disposition::Committed(_)));
    assert_eq!(sink.commit_count(), 1);
    let record = batch.record(RecordId(1)).unwrap();
    assert_eq!(record.cells().len(), 1);
    assert_eq!(record.get("age"), Some(&Primitive::from(7.0)));
}
