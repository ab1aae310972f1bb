//! Extractors for kinds whose content is already text and only needs
//! validating/reformatting: json, xml, csv (§4.4).

use async_trait::async_trait;
use std::path::Path;

use super::{ExtractionResult, Extractor, ExtractorError, Result, Source};
use crate::gateway::Gateway;

async fn read_source(source: Source<'_>) -> Result<String> {
    match source {
        Source::Path(path) => read_utf8(path).await,
        Source::Url(_) => Err(ExtractorError::Malformed("direct-content kinds do not read from a URL".into())),
    }
}

async fn read_utf8(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub struct JsonExtractor;

#[async_trait]
impl Extractor for JsonExtractor {
    async fn extract(&self, source: Source<'_>, _gateway: Option<&Gateway>) -> Result<ExtractionResult> {
        let raw_text = read_source(source).await?;
        let value: serde_json::Value =
            serde_json::from_str(&raw_text).map_err(|e| ExtractorError::Malformed(e.to_string()))?;
        let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw_text.clone());
        let summary = json_summary(&value);

        Ok(ExtractionResult {
            raw_text,
            formatted_markdown: format!("```json\n{pretty}\n```\n\n{summary}"),
            structured_data: Some(value),
        })
    }
}

fn json_summary(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => format!("JSON object with {} root keys", map.len()),
        serde_json::Value::Array(items) => format!("JSON array with {} items", items.len()),
        other => format!("JSON {} value", json_kind_name(other)),
    }
}

fn json_kind_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

pub struct XmlExtractor;

#[async_trait]
impl Extractor for XmlExtractor {
    async fn extract(&self, source: Source<'_>, _gateway: Option<&Gateway>) -> Result<ExtractionResult> {
        let raw_text = read_source(source).await?;
        validate_xml(&raw_text)?;

        Ok(ExtractionResult {
            formatted_markdown: format!("```xml\n{raw_text}\n```"),
            raw_text,
            structured_data: None,
        })
    }
}

fn validate_xml(text: &str) -> Result<()> {
    let mut reader = quick_xml::Reader::from_str(text);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Eof) => return Ok(()),
            Err(e) => return Err(ExtractorError::Malformed(e.to_string())),
            Ok(_) => buf.clear(),
        }
    }
}

pub struct CsvExtractor;

#[async_trait]
impl Extractor for CsvExtractor {
    async fn extract(&self, source: Source<'_>, _gateway: Option<&Gateway>) -> Result<ExtractionResult> {
        let raw_text = read_source(source).await?;
        let (rows, columns) = count_rows_and_columns(&raw_text)?;

        Ok(ExtractionResult {
            formatted_markdown: format!(
                "```csv\n{raw_text}\n```\n\nCSV with {rows} rows and {columns} columns"
            ),
            raw_text,
            structured_data: None,
        })
    }
}

fn count_rows_and_columns(text: &str) -> Result<(usize, usize)> {
    let mut reader = csv::ReaderBuilder::new().has_headers(false).from_reader(text.as_bytes());
    let mut rows = 0usize;
    let mut columns = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| ExtractorError::Malformed(e.to_string()))?;
        columns = columns.max(record.len());
        rows += 1;
    }
    Ok((rows, columns))
}
