//! Per-cell casting of records.
//!
//! [`cast_field`] makes exactly one coercion attempt for a (record, field)
//! pair. Failures become error messages on the cell; they never escape to the
//! caller, so one bad cell cannot stop the rest of the record or batch.

use std::{ops::AddAssign, sync::Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::trace;

use crate::{
    cast::{cast, is_target_type},
    hook::ChunkHandler,
    record::Record,
    schema::FieldDecl,
    value::Primitive,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellOutcome {
    /// No value, no caster for the declared type, or already the target type.
    Skipped,
    /// Coerced successfully to a value equal to the original.
    Unchanged,
    Cast,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CastTally {
    pub skipped: usize,
    pub unchanged: usize,
    pub cast: usize,
    pub failed: usize,
}

impl CastTally {
    pub fn record(&mut self, outcome: CellOutcome) {
        match outcome {
            CellOutcome::Skipped => self.skipped += 1,
            CellOutcome::Unchanged => self.unchanged += 1,
            CellOutcome::Cast => self.cast += 1,
            CellOutcome::Failed => self.failed += 1,
        }
    }

    pub fn attempted(&self) -> usize {
        self.unchanged + self.cast + self.failed
    }

    pub fn total(&self) -> usize {
        self.skipped + self.attempted()
    }
}

impl AddAssign for CastTally {
    fn add_assign(&mut self, other: Self) {
        self.skipped += other.skipped;
        self.unchanged += other.unchanged;
        self.cast += other.cast;
        self.failed += other.failed;
    }
}

pub fn cast_field(record: &mut Record, field: &FieldDecl) -> CellOutcome {
    let Some(target) = field.field_type.cast_target() else {
        return CellOutcome::Skipped;
    };
    let result = match record.get(&field.key) {
        None | Some(Primitive::Null) => return CellOutcome::Skipped,
        Some(value) if is_target_type(target, value) => return CellOutcome::Skipped,
        Some(value) => match cast(target, value) {
            Ok(coerced) if coerced == *value => return CellOutcome::Unchanged,
            other => other,
        },
    };
    match result {
        Ok(coerced) => {
            record.set(&field.key, coerced);
            CellOutcome::Cast
        }
        Err(err) => {
            trace!(
                "Record {} field '{}' failed {} cast: {err}",
                record.id(),
                field.key,
                target
            );
            record.add_error(&field.key, err.to_string());
            CellOutcome::Failed
        }
    }
}

pub fn cast_record(record: &mut Record, fields: &[FieldDecl]) -> CastTally {
    let mut tally = CastTally::default();
    for field in fields {
        tally.record(cast_field(record, field));
    }
    tally
}

/// Chunk handler that casts a fixed set of eligible fields on every record.
pub struct CastFields {
    fields: Vec<FieldDecl>,
    tally: Mutex<CastTally>,
}

impl CastFields {
    pub fn new(fields: Vec<FieldDecl>) -> Self {
        Self {
            fields,
            tally: Mutex::new(CastTally::default()),
        }
    }

    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    pub fn tally(&self) -> Result<CastTally> {
        self.tally
            .lock()
            .map(|tally| *tally)
            .map_err(|_| anyhow!("Cast tally lock poisoned"))
    }
}

#[async_trait]
impl ChunkHandler for CastFields {
    async fn handle(&self, records: &mut [Record]) -> Result<()> {
        let mut chunk_tally = CastTally::default();
        for record in records.iter_mut() {
            chunk_tally += cast_record(record, &self.fields);
        }
        let mut tally = self
            .tally
            .lock()
            .map_err(|_| anyhow!("Cast tally lock poisoned"))?;
        *tally += chunk_tally;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{record::RecordId, schema::FieldType};

    fn record(values: &[(&str, Option<Primitive>)]) -> Record {
        Record::from_values(
            RecordId(1),
            values.iter().map(|(key, value)| (key.to_string(), value.clone())),
        )
    }

    #[test]
    fn casts_string_to_declared_number() {
        let mut rec = record(&[("age", Some(Primitive::from("1,234")))]);
        let outcome = cast_field(&mut rec, &FieldDecl::new("age", FieldType::Number));
        assert_eq!(outcome, CellOutcome::Cast);
        assert_eq!(rec.get("age"), Some(&Primitive::from(1234.0)));
        assert!(rec.messages().next().is_none());
    }

    #[test]
    fn already_typed_value_is_left_alone() {
        let mut rec = record(&[("age", Some(Primitive::from(42.0)))]);
        let field = FieldDecl::new("age", FieldType::Number);
        assert_eq!(cast_field(&mut rec, &field), CellOutcome::Skipped);
        assert_eq!(cast_field(&mut rec, &field), CellOutcome::Skipped);
        assert_eq!(rec.get("age"), Some(&Primitive::from(42.0)));
        assert_eq!(rec.messages().count(), 0);
    }

    #[test]
    fn absent_null_and_uncastable_fields_are_skipped() {
        let mut rec = record(&[
            ("age", None),
            ("alive", Some(Primitive::Null)),
            ("category", Some(Primitive::from("three"))),
        ]);
        assert_eq!(
            cast_field(&mut rec, &FieldDecl::new("age", FieldType::Number)),
            CellOutcome::Skipped
        );
        assert_eq!(
            cast_field(&mut rec, &FieldDecl::new("alive", FieldType::Boolean)),
            CellOutcome::Skipped
        );
        assert_eq!(
            cast_field(&mut rec, &FieldDecl::new("category", FieldType::Enum)),
            CellOutcome::Skipped
        );
        assert_eq!(
            cast_field(&mut rec, &FieldDecl::new("missing", FieldType::Date)),
            CellOutcome::Skipped
        );
    }

    #[test]
    fn failure_adds_error_and_keeps_value() {
        let mut rec = record(&[("age", Some(Primitive::from("abc")))]);
        let outcome = cast_field(&mut rec, &FieldDecl::new("age", FieldType::Number));
        assert_eq!(outcome, CellOutcome::Failed);
        assert_eq!(rec.get("age"), Some(&Primitive::from("abc")));
        let cell = rec.cell("age").unwrap();
        assert_eq!(cell.messages.len(), 1);
        assert_eq!(cell.messages[0].text, "Invalid number");
    }

    #[test]
    fn failure_does_not_block_other_fields() {
        let mut rec = record(&[
            ("age", Some(Primitive::from("abc"))),
            ("alive", Some(Primitive::from("yes"))),
        ]);
        let fields = vec![
            FieldDecl::new("age", FieldType::Number),
            FieldDecl::new("alive", FieldType::Boolean),
        ];
        let tally = cast_record(&mut rec, &fields);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.cast, 1);
        assert_eq!(rec.get("alive"), Some(&Primitive::from(true)));
    }

    #[test]
    fn empty_boolean_clears_to_null() {
        let mut rec = record(&[("alive", Some(Primitive::from("")))]);
        let outcome = cast_field(&mut rec, &FieldDecl::new("alive", FieldType::Boolean));
        assert_eq!(outcome, CellOutcome::Cast);
        assert_eq!(rec.get("alive"), Some(&Primitive::Null));
    }

    #[test]
    fn forced_string_field_renders_numbers() {
        let mut rec = record(&[("zip", Some(Primitive::from(2100.0)))]);
        let outcome = cast_field(&mut rec, &FieldDecl::new("zip", FieldType::String));
        assert_eq!(outcome, CellOutcome::Cast);
        assert_eq!(rec.get("zip"), Some(&Primitive::from("2100")));
    }
}
