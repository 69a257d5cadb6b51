//! Record partitioning.

use lode_common::Record;

/// Maps a record to the partition fragment it belongs to.
///
/// Lode does not inspect record contents; the partitioner and codec agree
/// on the record shape out-of-band. Within one write, records producing
/// distinct fragments land in distinct data objects.
pub trait Partitioner: Send + Sync {
    fn name(&self) -> &str;

    /// Partition fragment for a record; empty means unpartitioned.
    ///
    /// Fragments become path components under the segment's data prefix, so
    /// implementations must emit slash-separated, separator-safe values.
    fn partition_path(&self, record: &Record) -> String;
}

/// No partitioning: every record maps to the empty fragment.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPartitioner;

impl Partitioner for NoopPartitioner {
    fn name(&self) -> &str {
        "noop"
    }

    fn partition_path(&self, _record: &Record) -> String {
        String::new()
    }
}

/// Hive-style partitioning on one top-level record field.
///
/// Produces `<field>=<value>` fragments. Records missing the field, or
/// whose value is not a scalar, fall into the `__default__` bucket.
#[derive(Debug, Clone)]
pub struct FieldPartitioner {
    field: String,
    name: String,
}

impl FieldPartitioner {
    pub fn new(field: impl Into<String>) -> Self {
        let field = field.into();
        let name = format!("hive-{field}");
        Self { field, name }
    }
}

impl Partitioner for FieldPartitioner {
    fn name(&self) -> &str {
        &self.name
    }

    fn partition_path(&self, record: &Record) -> String {
        let value = match record.get(&self.field) {
            Some(serde_json::Value::String(s)) => sanitize(s),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::Bool(b)) => b.to_string(),
            _ => "__default__".to_string(),
        };
        format!("{}={value}", self.field)
    }
}

// Fragment values become path components; anything that could change the
// path shape is replaced.
fn sanitize(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "__default__".to_string()
    } else {
        cleaned
    }
}
