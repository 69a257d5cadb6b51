//! Newline-delimited JSON codec.

use std::io::{BufRead as _, BufReader, Read, Write};

use lode_common::Record;

use crate::{Codec, CodecError, StreamEncoder};

/// One JSON document per line, `\n`-terminated.
///
/// JSONL is fully streamable: records are independent lines, so the
/// streaming encoder needs no buffering beyond the underlying writer's.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlCodec;

impl JsonlCodec {
    pub fn new() -> Self {
        Self
    }

    fn write_record(writer: &mut dyn Write, record: &Record) -> Result<(), CodecError> {
        serde_json::to_writer(&mut *writer, record).map_err(classify_encode_err)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

impl Codec for JsonlCodec {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn file_extension(&self) -> Option<&str> {
        Some(".jsonl")
    }

    fn encode(&self, writer: &mut dyn Write, records: &[Record]) -> Result<(), CodecError> {
        for record in records {
            Self::write_record(writer, record)?;
        }
        Ok(())
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<Vec<Record>, CodecError> {
        let mut records = Vec::new();
        for (line_no, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|err| CodecError::InvalidFormat {
                codec: "jsonl".to_string(),
                message: format!("line {}: {err}", line_no + 1),
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn stream_encoder<'a>(
        &self,
        writer: Box<dyn Write + Send + 'a>,
    ) -> Result<Box<dyn StreamEncoder + 'a>, CodecError> {
        Ok(Box::new(JsonlStreamEncoder { writer }))
    }
}

struct JsonlStreamEncoder<'a> {
    writer: Box<dyn Write + Send + 'a>,
}

impl StreamEncoder for JsonlStreamEncoder<'_> {
    fn encode_record(&mut self, record: &Record) -> Result<(), CodecError> {
        JsonlCodec::write_record(&mut self.writer, record)
    }

    fn finish(mut self: Box<Self>) -> Result<(), CodecError> {
        self.writer.flush()?;
        Ok(())
    }
}

fn classify_encode_err(err: serde_json::Error) -> CodecError {
    if err.is_io() {
        CodecError::Io(err.into())
    } else {
        CodecError::SchemaViolation {
            message: err.to_string(),
        }
    }
}
