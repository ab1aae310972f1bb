//! Excel extractor (§4.4): supplemented from the original source — present in
//! the `Kind` enum but dropped from the distilled behavior table. Parses each
//! sheet into a Markdown table; `structured_data` carries sheet name → rows.

use async_trait::async_trait;
use calamine::{Data, Reader, open_workbook_auto};
use std::path::PathBuf;

use super::{ExtractionResult, Extractor, ExtractorError, Result, Source};
use crate::gateway::Gateway;

pub struct ExcelExtractor;

#[async_trait]
impl Extractor for ExcelExtractor {
    async fn extract(&self, source: Source<'_>, _gateway: Option<&Gateway>) -> Result<ExtractionResult> {
        let path = match source {
            Source::Path(p) => p.to_path_buf(),
            Source::Url(_) => {
                return Err(ExtractorError::Malformed("excel extractor requires a local path".into()));
            }
        };

        let sheets = read_sheets_blocking(path).await?;
        let formatted_markdown = render_sheets(&sheets);
        let raw_text = sheets
            .iter()
            .map(|(name, rows)| format!("# {name}\n{}", rows_as_tsv(rows)))
            .collect::<Vec<_>>()
            .join("\n\n");
        let by_sheet: std::collections::HashMap<String, Vec<Vec<String>>> =
            sheets.iter().cloned().collect();
        let structured_data = Some(serde_json::to_value(&by_sheet).unwrap_or_default());

        Ok(ExtractionResult {
            raw_text,
            formatted_markdown,
            structured_data,
        })
    }
}

type Sheet = (String, Vec<Vec<String>>);

async fn read_sheets_blocking(path: PathBuf) -> Result<Vec<Sheet>> {
    tokio::task::spawn_blocking(move || -> Result<Vec<Sheet>> {
        let mut workbook = open_workbook_auto(&path).map_err(|e| ExtractorError::Malformed(e.to_string()))?;
        let names = workbook.sheet_names().to_vec();
        let mut sheets = Vec::with_capacity(names.len());
        for name in names {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| ExtractorError::Malformed(e.to_string()))?;
            let rows: Vec<Vec<String>> = range
                .rows()
                .map(|row| row.iter().map(cell_to_string).collect())
                .collect();
            sheets.push((name, rows));
        }
        Ok(sheets)
    })
    .await
    .map_err(|e| ExtractorError::Malformed(format!("extraction task panicked: {e}")))?
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Error(e) => format!("#ERROR({e:?})"),
        Data::DateTime(d) => d.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

fn rows_as_tsv(rows: &[Vec<String>]) -> String {
    rows.iter().map(|row| row.join("\t")).collect::<Vec<_>>().join("\n")
}

fn render_sheets(sheets: &[Sheet]) -> String {
    let mut total_rows = 0usize;
    let mut sections = Vec::with_capacity(sheets.len());

    for (name, rows) in sheets {
        total_rows += rows.len();
        sections.push(format!("## {name}\n\n{}", render_table(rows)));
    }

    let summary = format!("{} sheet(s), {total_rows} row(s) total", sheets.len());
    format!("{}\n\n{summary}", sections.join("\n\n"))
}

fn render_table(rows: &[Vec<String>]) -> String {
    let Some(header) = rows.first() else {
        return "_(empty sheet)_".to_string();
    };
    let mut out = String::new();
    out.push_str(&format!("| {} |\n", header.join(" | ")));
    out.push_str(&format!("|{}|\n", "---|".repeat(header.len())));
    for row in &rows[1..] {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    out
}
