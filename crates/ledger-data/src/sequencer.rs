//! Chronological ordering of classified files and grouping into periods.

use std::collections::BTreeMap;

use chrono::Datelike;

use ledger_core::models::{Claim, PeriodBatch};
use ledger_core::policy::{GroupingPolicy, PolicyWindows};
use ledger_core::time_utils::{
    from_month_index, month_index, quarter_label, quarter_sequence, quarter_start,
};
use tracing::debug;

use crate::classifier::Classification;

/// Files per period under [`GroupingPolicy::SequentialTriplet`].
pub const FILES_PER_TRIPLET: usize = 3;

/// A classified file with its claims, ready to be grouped.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedFile {
    pub filename: String,
    pub classification: Classification,
    pub claims: Vec<Claim>,
}

impl SequencedFile {
    fn month_key(&self) -> (i32, u32) {
        (self.classification.year, self.classification.month)
    }
}

/// Sort files by `(year, month)`. The sort is stable, so files of the same
/// month keep their input order.
pub fn sequence_files(mut files: Vec<SequencedFile>) -> Vec<SequencedFile> {
    files.sort_by_key(SequencedFile::month_key);
    files
}

/// Group sequenced files into period batches.
///
/// * [`GroupingPolicy::FilenameQuarter`]: one batch per fiscal quarter,
///   labelled `Q{q}-{calendar year}`, with the sequence counted from the
///   quarter holding the start of policy year 1. Quarters between the first
///   and last one that have no file get an empty batch, and so do quarters
///   between sequence `sequence_offset` (the last period already reported)
///   and the first file.
/// * [`GroupingPolicy::SequentialTriplet`]: consecutive chunks of three files
///   labelled `Q{n}`, `n = sequence_offset + index + 1`.
pub fn group_periods(
    files: Vec<SequencedFile>,
    policy: GroupingPolicy,
    windows: &PolicyWindows,
    sequence_offset: i32,
) -> Vec<PeriodBatch> {
    let files = sequence_files(files);
    let batches = match policy {
        GroupingPolicy::FilenameQuarter => group_by_quarter(files, windows, sequence_offset),
        GroupingPolicy::SequentialTriplet => group_by_triplet(files, sequence_offset),
    };
    debug!(
        "Grouped into {} periods ({})",
        batches.len(),
        policy.as_str()
    );
    batches
}

fn group_by_quarter(
    files: Vec<SequencedFile>,
    windows: &PolicyWindows,
    sequence_offset: i32,
) -> Vec<PeriodBatch> {
    let anchor = windows.year1.start;
    let mut by_quarter: BTreeMap<i32, PeriodBatch> = BTreeMap::new();

    for file in files {
        let (year, month) = file.month_key();
        let (qy, qm) = quarter_start(year, month);
        let batch = by_quarter.entry(month_index(qy, qm)).or_insert_with(|| {
            PeriodBatch::new(quarter_label(year, month), quarter_sequence(year, month, anchor))
        });
        batch.months.push((year, month));
        batch.files.push(file.filename);
        batch.claims.extend(file.claims);
    }

    let (Some(&first), Some(&last)) = (by_quarter.keys().next(), by_quarter.keys().next_back())
    else {
        return Vec::new();
    };

    // Quarter right after the last reported one, when there is one.
    let (ay, am) = quarter_start(anchor.year(), anchor.month());
    let resume = (sequence_offset > 0).then(|| month_index(ay, am) + 3 * sequence_offset);

    let mut index = resume.map_or(first, |r| r.min(first));
    while index <= last {
        by_quarter.entry(index).or_insert_with(|| {
            let (year, month) = from_month_index(index);
            PeriodBatch::new(quarter_label(year, month), quarter_sequence(year, month, anchor))
        });
        index += 3;
    }

    by_quarter.into_values().collect()
}

fn group_by_triplet(files: Vec<SequencedFile>, sequence_offset: i32) -> Vec<PeriodBatch> {
    let mut batches: Vec<PeriodBatch> = Vec::new();
    let mut iter = files.into_iter().peekable();
    let mut index: i32 = 0;

    while iter.peek().is_some() {
        let n = sequence_offset + index + 1;
        let mut batch = PeriodBatch::new(format!("Q{n}"), n);
        for file in iter.by_ref().take(FILES_PER_TRIPLET) {
            batch.months.push(file.month_key());
            batch.files.push(file.filename);
            batch.claims.extend(file.claims);
        }
        batches.push(batch);
        index += 1;
    }

    batches
}
