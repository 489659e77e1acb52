// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Table-report export: combine the per-page CSVs of a table-extraction
// batch into one table, aligning header sets that differ between pages.

use std::collections::HashMap;

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{TableOutcome, TableReport};
use tracing::warn;

/// Merge every successful per-page table into one combined CSV.
///
/// Headers are the first-seen-order union across pages; rows from a page
/// missing a column get an empty cell there. Pages whose CSV does not parse
/// are skipped with a warning, matching the batch's per-page isolation.
/// Returns `Ok(None)` when no page produced a table.
pub fn merge_table_csv(reports: &[TableReport]) -> Result<Option<String>> {
    let mut headers: Vec<String> = Vec::new();
    let mut rows: Vec<HashMap<String, String>> = Vec::new();

    for report in reports {
        let TableOutcome::Table(csv_text) = &report.outcome else {
            continue;
        };
        match parse_table(csv_text) {
            Ok((page_headers, page_rows)) => {
                for header in page_headers {
                    if !headers.contains(&header) {
                        headers.push(header);
                    }
                }
                rows.extend(page_rows);
            }
            Err(err) => {
                warn!(page = report.page_index + 1, %err, "unparseable page table, skipping");
            }
        }
    }

    if headers.is_empty() {
        return Ok(None);
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&headers)
        .map_err(|err| BlattwerkError::Export(format!("CSV write failed: {}", err)))?;
    for row in &rows {
        let record: Vec<&str> = headers
            .iter()
            .map(|h| row.get(h).map(String::as_str).unwrap_or(""))
            .collect();
        writer
            .write_record(&record)
            .map_err(|err| BlattwerkError::Export(format!("CSV write failed: {}", err)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| BlattwerkError::Export(format!("CSV flush failed: {}", err)))?;
    let merged = String::from_utf8(bytes)
        .map_err(|err| BlattwerkError::Export(format!("CSV not UTF-8: {}", err)))?;
    Ok(Some(merged))
}

/// The successful per-page tables as `(page_index, csv)` pairs, for
/// one-sheet-per-page export.
pub fn per_page_tables(reports: &[TableReport]) -> Vec<(usize, &str)> {
    reports
        .iter()
        .filter_map(|report| match &report.outcome {
            TableOutcome::Table(csv_text) => Some((report.page_index, csv_text.as_str())),
            _ => None,
        })
        .collect()
}

/// Parse one page's CSV into headers and keyed rows.
fn parse_table(
    csv_text: &str,
) -> std::result::Result<(Vec<String>, Vec<HashMap<String, String>>), csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: HashMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        rows.push(row);
    }
    Ok((headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blattwerk_core::PageId;

    fn report(page_index: usize, outcome: TableOutcome) -> TableReport {
        TableReport {
            page_index,
            page_id: PageId::new(),
            label: format!("p{}", page_index),
            outcome,
        }
    }

    #[test]
    fn merge_unions_headers_in_first_seen_order() {
        let reports = [
            report(0, TableOutcome::Table("item,price\npen,1.50".into())),
            report(1, TableOutcome::Table("item,qty\npad,3".into())),
        ];

        let merged = merge_table_csv(&reports).expect("merge").expect("some");
        let mut lines = merged.lines();
        assert_eq!(lines.next(), Some("item,price,qty"));
        assert_eq!(lines.next(), Some("pen,1.50,"));
        assert_eq!(lines.next(), Some("pad,,3"));
    }

    #[test]
    fn merge_skips_failed_and_tableless_pages() {
        let reports = [
            report(0, TableOutcome::NoTable),
            report(1, TableOutcome::Table("a,b\n1,2".into())),
            report(2, TableOutcome::Failed("unreachable".into())),
        ];

        let merged = merge_table_csv(&reports).expect("merge").expect("some");
        assert_eq!(merged.lines().count(), 2);
    }

    #[test]
    fn merge_of_no_tables_is_none() {
        let reports = [
            report(0, TableOutcome::NoTable),
            report(1, TableOutcome::Failed("x".into())),
        ];
        assert_eq!(merge_table_csv(&reports).expect("merge"), None);
    }

    #[test]
    fn ragged_rows_are_padded() {
        let reports = [report(
            0,
            TableOutcome::Table("a,b,c\n1,2\n3,4,5".into()),
        )];
        let merged = merge_table_csv(&reports).expect("merge").expect("some");
        let mut lines = merged.lines();
        assert_eq!(lines.next(), Some("a,b,c"));
        assert_eq!(lines.next(), Some("1,2,"));
        assert_eq!(lines.next(), Some("3,4,5"));
    }

    #[test]
    fn per_page_tables_lists_only_successes() {
        let reports = [
            report(0, TableOutcome::Table("a\n1".into())),
            report(1, TableOutcome::NoTable),
            report(2, TableOutcome::Table("b\n2".into())),
        ];
        let pages = per_page_tables(&reports);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], (0, "a\n1"));
        assert_eq!(pages[1], (2, "b\n2"));
    }
}
