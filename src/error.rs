use std::{io, path::PathBuf};

use thiserror::Error;

use crate::Mrn;

/// Everything that can stop a counting run.
///
/// There is no skip-and-continue mode: the patient record table is small and
/// curated, so any of these should be investigated rather than masked. The one
/// "skip" case that is *not* an error is a note whose MRN we have no earliest
/// date for; that happens constantly and is handled in `notes::qualifying_mrn`.
#[derive(Debug, Error)]
pub enum CountError {
    /// No calendar date could be extracted from the string.
    #[error("could not find a date in {input:?}")]
    DateUnparseable { input: String },

    /// A known MRN has no earliest date even though null rows were dropped
    /// when the table was built. Signals a construction bug, not bad input.
    #[error("MRN {mrn} is not associated with a date despite nulls having been dropped")]
    MissingEarliestDate { mrn: Mrn },

    /// A note for a known MRN is missing its `EVENT_DATE` field.
    #[error("note for MRN {mrn} is missing an event date")]
    MissingEventDate { mrn: Mrn },

    /// CSV batches exist in some extracts (imaging?) but we've never needed
    /// to read one.
    #[error("CSV note batches are not supported yet: {}", path.display())]
    CsvBatchUnsupported { path: PathBuf },

    /// The walk finished without finding a single batch file.
    #[error("no note batch files under {}", root.display())]
    NoBatchFiles { root: PathBuf },

    /// Batch files were read but not one note qualified; an empty totals
    /// table is never written silently.
    #[error("no qualifying notes under {}", root.display())]
    NoQualifyingNotes { root: PathBuf },

    /// The patient record table repeats an (mrn, earliest_date) row.
    #[error("duplicate patient record row ({mrn}, {date})")]
    DuplicatePatientRow { mrn: Mrn, date: String },

    #[error("failed to read directory {}", path.display())]
    ReadDir { path: PathBuf, source: io::Error },

    #[error("failed to read note batch {}", path.display())]
    ReadBatch { path: PathBuf, source: io::Error },

    #[error("failed to parse note batch {}", path.display())]
    ParseBatch {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to walk notes directory")]
    Walk(#[from] walkdir::Error),
}
