use crate::query::filter::{cutoff_ms, matches_filter};
use crate::signature::SignatureGenerator;
use crate::time::now_ms;
use crate::types::{CrashFilter, CrashGroup, CrashRecord, FilteredView, SortOrder};
use std::collections::BTreeMap;

/// Filter and sort records for the flat list view.
/// The sort is stable, so equal timestamps keep their input order.
pub fn filter_records(records: &[CrashRecord], filter: &CrashFilter, now_ms: i64) -> Vec<CrashRecord> {
    let cutoff = cutoff_ms(filter, now_ms);
    let mut out: Vec<CrashRecord> = records
        .iter()
        .filter(|r| matches_filter(r, filter, cutoff))
        .cloned()
        .collect();

    match filter.sort_order {
        SortOrder::NewestFirst => out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        SortOrder::OldestFirst => out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp)),
    }
    out
}

/// Group already-filtered records by signature.
///
/// Groups come back most-recently-active first regardless of the flat
/// list's sort order; ties fall back to signature order.
pub fn group_records(records: &[CrashRecord], generator: &SignatureGenerator) -> Vec<CrashGroup> {
    let mut by_signature: BTreeMap<String, Vec<CrashRecord>> = BTreeMap::new();
    for record in records {
        let signature = generator.generate_signature(&record.content, record.category);
        by_signature.entry(signature).or_default().push(record.clone());
    }

    let mut groups: Vec<CrashGroup> = by_signature
        .into_iter()
        .filter_map(|(signature, mut crashes)| {
            crashes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            let newest = crashes.first()?;
            let exception_type = generator.extract_exception_type(&newest.content, Some(newest.category));
            let first_occurrence = crashes.iter().map(|c| c.timestamp).min()?;
            let last_occurrence = crashes.iter().map(|c| c.timestamp).max()?;
            Some(CrashGroup {
                signature,
                exception_type,
                count: crashes.len(),
                crashes,
                first_occurrence,
                last_occurrence,
            })
        })
        .collect();

    groups.sort_by(|a, b| b.last_occurrence.cmp(&a.last_occurrence));
    groups
}

/// Flat and grouped views over `records` under `filter`, evaluated at `now_ms`
pub fn filter_and_group_with(
    records: &[CrashRecord],
    filter: &CrashFilter,
    generator: &SignatureGenerator,
    now_ms: i64,
) -> FilteredView {
    let flat = filter_records(records, filter, now_ms);
    let groups = group_records(&flat, generator);
    log::debug!(
        "Filtered {} of {} records into {} groups",
        flat.len(),
        records.len(),
        groups.len()
    );
    FilteredView { flat, groups }
}

/// [`filter_and_group_with`] using the default generator and the current time
pub fn filter_and_group(records: &[CrashRecord], filter: &CrashFilter) -> FilteredView {
    filter_and_group_with(records, filter, &SignatureGenerator::default(), now_ms())
}
