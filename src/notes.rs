//! Note batch files and the per-note qualification rule.

use serde::{de, Deserialize, Deserializer};
use std::{fs, io, path::Path};

use crate::{counts::Counts, dates::DateOrder, CountError, EarliestDates, Mrn};

/// One clinical document's metadata entry within a batch file.
///
/// Real batches carry dozens more fields (report text, provider details,
/// encounter codes and so on); only what the counting logic reads is kept.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteRecord {
    #[serde(rename = "DFCI_MRN", deserialize_with = "mrn_any")]
    pub mrn: Mrn,
    #[serde(rename = "EVENT_DATE")]
    pub event_date: Option<String>,
}

// JSON batch shape: { "response": { "docs": [ <note>, ... ] } }
#[derive(Debug, Deserialize)]
struct Batch {
    response: Response,
}

#[derive(Debug, Deserialize)]
struct Response {
    docs: Vec<NoteRecord>,
}

/// MRNs arrive as numbers in some extracts and strings in others; accept
/// both, plus the occasional float with a zero fraction.
fn mrn_any<'de, D>(d: D) -> Result<Mrn, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Str(String),
    }
    match Raw::deserialize(d)? {
        Raw::Int(v) => Ok(v),
        Raw::Float(v) if v.fract() == 0.0 && v.is_finite() => Ok(v as i64),
        Raw::Float(v) => Err(de::Error::custom(format!("MRN {v} is not an integer"))),
        Raw::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("MRN {s:?} is not numeric"))),
    }
}

/// Decide whether `note` counts, returning its MRN if so.
///
/// An MRN we have no earliest date for is the normal case and returns
/// `Ok(None)` silently. A *known* MRN with a missing date on either side is a
/// data-quality bug and fails the run.
pub fn qualifying_mrn(
    earliest: &EarliestDates,
    order: &mut DateOrder,
    note: &NoteRecord,
) -> Result<Option<Mrn>, CountError> {
    if !earliest.contains(note.mrn) {
        return Ok(None);
    }
    let Some(pt_earliest) = earliest.date_for(note.mrn) else {
        return Err(CountError::MissingEarliestDate { mrn: note.mrn });
    };
    let Some(note_date) = note.event_date.as_deref() else {
        return Err(CountError::MissingEventDate { mrn: note.mrn });
    };
    if order.on_or_after(pt_earliest, note_date)? {
        Ok(Some(note.mrn))
    } else {
        Ok(None)
    }
}

/// Load one JSON batch and count its qualifying notes per MRN.
pub fn file_counts_json(
    earliest: &EarliestDates,
    order: &mut DateOrder,
    path: &Path,
) -> Result<Counts, CountError> {
    let file = fs::File::open(path).map_err(|source| CountError::ReadBatch {
        path: path.into(),
        source,
    })?;
    let batch: Batch =
        serde_json::from_reader(io::BufReader::new(file)).map_err(|source| {
            CountError::ParseBatch {
                path: path.into(),
                source,
            }
        })?;
    let mut counts = Counts::new();
    for note in &batch.response.docs {
        if let Some(mrn) = qualifying_mrn(earliest, order, note)? {
            counts.record(mrn);
        }
    }
    Ok(counts)
}

/// CSV batches exist in some extracts but we haven't needed to read one yet.
pub fn file_counts_csv(
    _earliest: &EarliestDates,
    _order: &mut DateOrder,
    path: &Path,
) -> Result<Counts, CountError> {
    Err(CountError::CsvBatchUnsupported { path: path.into() })
}
