use crate::error::{PipelineError, Result};
use crate::stage::Transformer;
use serde_json::Value;

/// A transformer that maps each object event to the value stored under a
/// fixed key.
///
/// A missing key yields `Value::Null` — an explicit "absent" outcome, never a
/// fault. Non-object events also yield `Value::Null` for the same reason: the
/// key is absent from them.
#[derive(Debug)]
pub struct PluckTransformer {
    key: String,
}

impl PluckTransformer {
    /// Create a transformer extracting `key` from each event
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Transformer<Value> for PluckTransformer {
    fn on_events(&mut self, events: Vec<Value>) -> Result<Vec<Value>> {
        Ok(events
            .into_iter()
            .map(|event| event.get(&self.key).cloned().unwrap_or(Value::Null))
            .collect())
    }

    fn name(&self) -> &str {
        "pluck"
    }
}

/// A transformer that filters lists of objects by field equality.
///
/// Each event is itself a JSON array of objects; elements whose `field`
/// equals the expected value are retained, and the outer batch structure is
/// preserved (one filtered array out per array in). An event that is not an
/// array is a stage fault.
#[derive(Debug)]
pub struct FieldEqualsFilter {
    field: String,
    expected: Value,
}

impl FieldEqualsFilter {
    /// Create a filter retaining elements whose `field` equals `expected`
    pub fn new(field: impl Into<String>, expected: Value) -> Self {
        Self {
            field: field.into(),
            expected,
        }
    }
}

impl Transformer<Value> for FieldEqualsFilter {
    fn on_events(&mut self, events: Vec<Value>) -> Result<Vec<Value>> {
        events
            .into_iter()
            .map(|event| match event {
                Value::Array(elements) => Ok(Value::Array(
                    elements
                        .into_iter()
                        .filter(|element| element.get(&self.field) == Some(&self.expected))
                        .collect(),
                )),
                other => Err(PipelineError::StageError(format!(
                    "field filter expects list events, got {other}"
                ))),
            })
            .collect()
    }

    fn name(&self) -> &str {
        "field_filter"
    }
}
