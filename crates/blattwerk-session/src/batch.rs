// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch orchestrator — fans a per-page async operation out over the whole
// collection with bounded concurrency and merges the results back in page
// order.
//
// Per-page operations must catch their own expected failures and return the
// original record; the orchestrator only merges. A panic escaping an
// operation unwinds out of the batch before any snapshot is committed, so
// session state is untouched by an aborted batch.

use std::future::Future;

use blattwerk_core::{PageCollection, TableOutcome, TableReport};
use blattwerk_vision::VisionService;
use futures_util::StreamExt;
use futures_util::stream;
use tracing::{debug, instrument};

/// Apply `op` to every page concurrently (at most `fanout` in flight) and
/// collect the results into one new collection.
///
/// Output order always matches input order, whatever order the individual
/// operations complete in. The collection is only produced once every page
/// has settled — there are no partial merges.
#[instrument(skip(pages, op), fields(pages = pages.len(), fanout))]
pub async fn map_pages<F, Fut>(pages: &PageCollection, fanout: usize, op: F) -> PageCollection
where
    F: Fn(blattwerk_core::PageRecord) -> Fut,
    Fut: Future<Output = blattwerk_core::PageRecord>,
{
    let fanout = fanout.max(1);
    let results: Vec<_> = stream::iter(pages.iter().cloned().map(op))
        .buffered(fanout)
        .collect()
        .await;
    debug!(pages = results.len(), "batch settled");
    PageCollection::from_records(results)
}

/// Run table extraction over every page, producing a per-page report in
/// page order. The collection itself is never modified: table results are
/// ephemeral, export-only data.
#[instrument(skip(pages, vision), fields(pages = pages.len(), fanout))]
pub async fn scan_tables<V: VisionService>(
    pages: &PageCollection,
    vision: &V,
    fanout: usize,
) -> Vec<TableReport> {
    let fanout = fanout.max(1);
    stream::iter(pages.iter().enumerate().map(|(page_index, record)| {
        let image = record.display_image().clone();
        let page_id = record.id;
        let label = record.label.clone();
        async move {
            let outcome = match vision.extract_table(image).await {
                Ok(Some(csv)) => TableOutcome::Table(csv),
                Ok(None) => TableOutcome::NoTable,
                Err(err) => TableOutcome::Failed(err.to_string()),
            };
            TableReport {
                page_index,
                page_id,
                label,
                outcome,
            }
        }
    }))
    .buffered(fanout)
    .collect()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use blattwerk_core::{ImageEncoding, ImageRef, PageRecord};
    use blattwerk_vision::{ScriptedVision, TableScript};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn collection(n: usize) -> PageCollection {
        (0..n)
            .map(|i| {
                PageRecord::new(
                    format!("p{}", i),
                    ImageRef::new(vec![i as u8], 10, 10, ImageEncoding::Png),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn output_order_matches_input_order_despite_completion_order() {
        let pages = collection(5);
        // Later pages finish first: page i sleeps (5 - i) * 10ms.
        let result = map_pages(&pages, 5, |record| async move {
            let index: u64 = record.label.trim_start_matches('p').parse().expect("index");
            tokio::time::sleep(Duration::from_millis((5 - index) * 10)).await;
            PageRecord {
                extracted_text: Some(format!("done-{}", index)),
                ..record
            }
        })
        .await;

        let texts: Vec<_> = result
            .iter()
            .map(|r| r.extracted_text.clone().expect("text"))
            .collect();
        assert_eq!(texts, ["done-0", "done-1", "done-2", "done-3", "done-4"]);
    }

    #[tokio::test]
    async fn failing_page_is_returned_unchanged_and_others_proceed() {
        let pages = collection(3);
        let failing_id = pages.get(1).expect("page 1").id;

        let result = map_pages(&pages, 2, |record| async move {
            if record.id == failing_id {
                // Expected failure mode: the operation hands back the
                // original record untouched.
                return record;
            }
            PageRecord {
                extracted_text: Some("ok".into()),
                ..record
            }
        })
        .await;

        assert_eq!(result.len(), 3);
        assert_eq!(result.get(1).expect("page 1"), pages.get(1).expect("page 1"));
        assert_eq!(
            result.get(0).expect("page 0").extracted_text.as_deref(),
            Some("ok")
        );
        assert_eq!(
            result.get(2).expect("page 2").extracted_text.as_deref(),
            Some("ok")
        );
        // Input collection untouched.
        assert!(pages.iter().all(|r| r.extracted_text.is_none()));
    }

    #[tokio::test]
    async fn fanout_limit_bounds_in_flight_operations() {
        let pages = collection(8);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let result = map_pages(&pages, 3, |record| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                record
            }
        })
        .await;

        assert_eq!(result.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn empty_collection_produces_empty_result() {
        let result = map_pages(&PageCollection::new(), 4, |record| async move { record }).await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn table_scan_reports_per_page_status_without_touching_pages() {
        let pages = collection(3);
        let before = pages.clone();
        let vision = ScriptedVision::new();
        vision
            .push_table(TableScript::Table("a,b\n1,2".into()))
            .push_table(TableScript::Fail("timeout".into()))
            .push_table(TableScript::Table("a,b\n3,4".into()));

        // Fanout 1 keeps scripted outcomes aligned with page order.
        let reports = scan_tables(&pages, &vision, 1).await;

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].page_index, 0);
        assert!(matches!(reports[0].outcome, TableOutcome::Table(_)));
        assert!(matches!(reports[1].outcome, TableOutcome::Failed(_)));
        assert!(matches!(reports[2].outcome, TableOutcome::Table(_)));
        // The report is a side table only: the collection is untouched.
        assert_eq!(pages, before);
    }

    #[tokio::test]
    async fn table_scan_distinguishes_no_table_from_failure() {
        let pages = collection(2);
        let vision = ScriptedVision::new();
        vision
            .push_table(TableScript::NoTable)
            .push_table(TableScript::Fail("boom".into()));

        let reports = scan_tables(&pages, &vision, 1).await;
        assert_eq!(reports[0].outcome, TableOutcome::NoTable);
        assert!(matches!(reports[1].outcome, TableOutcome::Failed(_)));
    }
}
