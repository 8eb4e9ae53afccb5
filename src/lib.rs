//! Count clinical notes authored on or after each patient's earliest
//! qualifying date.
//!
//! One offline batch job: load the patient record table, walk a tree of JSON
//! note batches, count the notes that qualify per MRN, and write a sorted
//! `totals.csv`. Everything is sequential and in-memory; a failed run is
//! simply re-run from scratch.

pub mod counts;
pub mod dates;
mod error;
pub mod notes;
mod util;
pub mod walk;

pub use anyhow::{Context, Error};
use qu::ick_use::*;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

pub use crate::{error::CountError, walk::NoteWalker};
use crate::util::optional_string;

pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;

/// Medical record number, the patient identifier shared by every extract.
pub type Mrn = i64;

#[derive(Debug, Clone, Deserialize)]
struct PatientRecordRaw {
    #[serde(deserialize_with = "optional_string")]
    mrn: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    earliest_date: Option<String>,
}

/// Map from MRN to the raw earliest qualifying date string for that patient.
///
/// Dates stay unparsed here; `dates::DateOrder` interprets them lazily and
/// memoizes the result. Built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct EarliestDates {
    els: BTreeMap<Mrn, String>,
}

impl EarliestDates {
    /// Load the patient record CSV, dropping rows where the MRN or the date
    /// is missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw: Vec<PatientRecordRaw> = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?
            .into_deserialize()
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("while loading \"{}\"", path.display()))?;
        let mut rows = Vec::with_capacity(raw.len());
        for rec in raw {
            let (Some(mrn), Some(date)) = (rec.mrn, rec.earliest_date) else {
                continue;
            };
            let mrn = parse_mrn(&mrn)
                .with_context(|| format!("bad MRN in \"{}\"", path.display()))?;
            rows.push((mrn, date));
        }
        Ok(Self::from_rows(rows)?)
    }

    /// Build the map, checking that no (mrn, date) row repeats.
    ///
    /// A repeated MRN with a *different* date is kept last-wins, matching the
    /// upstream extract's behaviour.
    pub fn from_rows(rows: impl IntoIterator<Item = (Mrn, String)>) -> Result<Self, CountError> {
        let mut els = BTreeMap::new();
        let mut seen = BTreeSet::new();
        for (mrn, date) in rows {
            if !seen.insert((mrn, date.clone())) {
                return Err(CountError::DuplicatePatientRow { mrn, date });
            }
            els.insert(mrn, date);
        }
        Ok(EarliestDates { els })
    }

    pub fn contains(&self, mrn: Mrn) -> bool {
        self.els.contains_key(&mrn)
    }

    pub fn date_for(&self, mrn: Mrn) -> Option<&str> {
        self.els.get(&mrn).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.els.len()
    }

    pub fn is_empty(&self) -> bool {
        self.els.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Mrn, &str)> + '_ {
        self.els.iter().map(|(mrn, date)| (*mrn, date.as_str()))
    }
}

/// MRNs occasionally come through as floats ("12345.0"); coerce those too.
fn parse_mrn(s: &str) -> Result<Mrn> {
    if let Ok(v) = s.parse::<i64>() {
        return Ok(v);
    }
    let v: f64 = s
        .parse()
        .map_err(|_| format_err!("MRN {:?} is not numeric", s))?;
    ensure!(v.fract() == 0.0 && v.is_finite(), "MRN {:?} is not an integer", s);
    Ok(v as i64)
}

/// Write the final table as `totals.csv` in `output_dir`.
pub fn write_totals(output_dir: impl AsRef<Path>, totals: &[(Mrn, u64)]) -> Result {
    let path = output_dir.as_ref().join("totals.csv");
    if util::path_exists(&path)? {
        event!(
            Level::WARN,
            "overwriting existing file at \"{}\"",
            path.display()
        );
    }
    let mut out = csv::Writer::from_path(&path)
        .with_context(|| format!("unable to write \"{}\"", path.display()))?;
    out.write_record(["MRN", "TOTAL_AFTER_EARLIEST"])?;
    for (mrn, total) in totals {
        out.write_record([mrn.to_string(), total.to_string()])?;
    }
    out.flush()?;
    Ok(())
}

/// Load the patient record table, count qualifying notes under `notes_dir`,
/// and write the sorted totals table into `output_dir`.
///
/// `fields` is accepted for future per-field totals; the counting logic does
/// not use it yet.
pub fn run(pt_record_csv: &Path, notes_dir: &Path, output_dir: &Path, _fields: &[String]) -> Result {
    let earliest = EarliestDates::load(pt_record_csv)?;
    event!(
        Level::INFO,
        "loaded earliest dates for {} patients",
        earliest.len()
    );
    let totals = NoteWalker::new(&earliest, notes_dir).totals()?;
    event!(Level::INFO, "{} MRNs with qualifying notes", totals.len());
    write_totals(output_dir, &totals)
}
