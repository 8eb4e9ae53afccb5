//! Walking the notes tree and reducing per-file counts into the final table.

use qu::ick_use::*;
use std::{
    fs, io,
    path::{Path, PathBuf},
    vec,
};
use walkdir::WalkDir;

use crate::{counts::Counts, dates::DateOrder, notes, CountError, EarliestDates, Mrn};

/// Batch formats recognised by file extension (case-insensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Json,
    Csv,
}

impl BatchKind {
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("json") {
            Some(BatchKind::Json)
        } else if ext.eq_ignore_ascii_case("csv") {
            Some(BatchKind::Csv)
        } else {
            None
        }
    }
}

/// Walks every directory under a root and yields one `Counts` per batch file.
///
/// Files are counted lazily: a batch is opened only when the consumer asks
/// for the next item, so at most one file's parsed notes are in memory at a
/// time. Directories are visited one at a time and their files processed
/// together; once a directory's files are done, its subtotal is logged if
/// anything in it qualified. The date caches live here and are shared across
/// every file of the walk.
///
/// The traversal is deterministic: directories and the files within them are
/// visited in name order.
pub struct NoteWalker<'a> {
    earliest: &'a EarliestDates,
    order: DateOrder,
    root: PathBuf,
    dirs: walkdir::IntoIter,
    files: vec::IntoIter<(PathBuf, BatchKind)>,
    current_dir: Option<PathBuf>,
    dir_subtotal: u64,
}

impl<'a> NoteWalker<'a> {
    pub fn new(earliest: &'a EarliestDates, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let dirs = WalkDir::new(&root).sort_by_file_name().into_iter();
        NoteWalker {
            earliest,
            order: DateOrder::new(),
            root,
            dirs,
            files: Vec::new().into_iter(),
            current_dir: None,
            dir_subtotal: 0,
        }
    }

    /// Exhaust the walk and merge every per-file count into one table,
    /// sorted by total descending (ties in ascending MRN order).
    ///
    /// Refuses to produce an empty table: a tree with no batch files at all,
    /// or whose notes never qualify, is an error.
    pub fn totals(mut self) -> Result<Vec<(Mrn, u64)>, CountError> {
        let mut merged = Counts::new();
        let mut n_files = 0usize;
        for counts in &mut self {
            merged.merge(counts?);
            n_files += 1;
        }
        if n_files == 0 {
            return Err(CountError::NoBatchFiles { root: self.root });
        }
        if merged.is_empty() {
            return Err(CountError::NoQualifyingNotes { root: self.root });
        }
        Ok(merged.into_sorted())
    }

    fn finish_dir(&mut self) {
        if let Some(dir) = self.current_dir.take() {
            if self.dir_subtotal > 0 {
                event!(
                    Level::INFO,
                    "{} qualifying notes in {}",
                    self.dir_subtotal,
                    dir.display()
                );
            }
            self.dir_subtotal = 0;
        }
    }
}

impl Iterator for NoteWalker<'_> {
    type Item = Result<Counts, CountError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((path, kind)) = self.files.next() {
                let res = match kind {
                    BatchKind::Json => {
                        notes::file_counts_json(self.earliest, &mut self.order, &path)
                    }
                    BatchKind::Csv => notes::file_counts_csv(self.earliest, &mut self.order, &path),
                };
                if let Ok(counts) = &res {
                    self.dir_subtotal += counts.total();
                }
                return Some(res);
            }

            self.finish_dir();

            // advance to the next directory in the tree
            let entry = loop {
                match self.dirs.next() {
                    Some(Ok(entry)) if entry.file_type().is_dir() => break entry,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Some(Err(e.into())),
                    None => return None,
                }
            };
            match batch_files_in(entry.path()) {
                Ok(files) => {
                    self.current_dir = Some(entry.into_path());
                    self.files = files.into_iter();
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// List the batch files directly inside `dir`, in name order.
fn batch_files_in(dir: &Path) -> Result<Vec<(PathBuf, BatchKind)>, CountError> {
    let read_err = |source: io::Error| CountError::ReadDir {
        path: dir.into(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if !entry.file_type().map_err(read_err)?.is_file() {
            continue;
        }
        let path = entry.path();
        if let Some(kind) = BatchKind::of(&path) {
            files.push((path, kind));
        }
    }
    // read_dir order is platform dependent
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

#[cfg(test)]
mod test {
    use super::{BatchKind, NoteWalker};
    use crate::{CountError, EarliestDates};
    use std::{fs, path::Path};

    fn earliest(rows: &[(i64, &str)]) -> EarliestDates {
        EarliestDates::from_rows(rows.iter().map(|(mrn, date)| (*mrn, date.to_string())))
            .unwrap()
    }

    fn write_batch(path: &Path, docs: &[(i64, &str)]) {
        let docs: Vec<serde_json::Value> = docs
            .iter()
            .map(|(mrn, date)| serde_json::json!({ "DFCI_MRN": mrn, "EVENT_DATE": date }))
            .collect();
        let batch = serde_json::json!({ "response": { "docs": docs } });
        fs::write(path, serde_json::to_string(&batch).unwrap()).unwrap();
    }

    #[test]
    fn batch_kind_is_case_insensitive() {
        assert_eq!(BatchKind::of("a/b.json".as_ref()), Some(BatchKind::Json));
        assert_eq!(BatchKind::of("a/b.JSON".as_ref()), Some(BatchKind::Json));
        assert_eq!(BatchKind::of("a/b.Csv".as_ref()), Some(BatchKind::Csv));
        assert_eq!(BatchKind::of("a/b.txt".as_ref()), None);
        assert_eq!(BatchKind::of("a/json".as_ref()), None);
    }

    #[test]
    fn end_to_end_single_batch() {
        let table = earliest(&[(101, "2020-01-01"), (102, "2021-06-15")]);
        let dir = tempfile::tempdir().unwrap();
        write_batch(
            &dir.path().join("batch.json"),
            &[
                (101, "2020-01-02"),
                (101, "2019-12-01"),
                (999, "2022-01-01"),
            ],
        );
        let totals = NoteWalker::new(&table, dir.path()).totals().unwrap();
        assert_eq!(totals, vec![(101, 1)]);
    }

    #[test]
    fn merges_across_nested_directories() {
        let table = earliest(&[(101, "2020-01-01"), (102, "2020-01-01")]);
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/deep")).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        write_batch(
            &dir.path().join("a/one.json"),
            &[(101, "2020-05-05"), (102, "2020-05-05")],
        );
        write_batch(&dir.path().join("a/deep/two.json"), &[(102, "2021-01-01")]);
        write_batch(
            &dir.path().join("b/three.json"),
            &[(101, "2020-02-02"), (101, "2019-01-01")],
        );
        let totals = NoteWalker::new(&table, dir.path()).totals().unwrap();
        // 101 and 102 both end on 2; ties come out in ascending MRN order
        assert_eq!(totals, vec![(101, 2), (102, 2)]);
    }

    #[test]
    fn yields_one_counts_per_file() {
        let table = earliest(&[(101, "2020-01-01")]);
        let dir = tempfile::tempdir().unwrap();
        write_batch(&dir.path().join("one.json"), &[(101, "2020-05-05")]);
        write_batch(&dir.path().join("two.json"), &[(101, "2020-06-06")]);
        let per_file: Vec<_> = NoteWalker::new(&table, dir.path())
            .map(|c| c.unwrap().total())
            .collect();
        assert_eq!(per_file, vec![1, 1]);
    }

    #[test]
    fn uppercase_extension_is_walked() {
        let table = earliest(&[(101, "2020-01-01")]);
        let dir = tempfile::tempdir().unwrap();
        write_batch(&dir.path().join("batch.JSON"), &[(101, "2020-05-05")]);
        let totals = NoteWalker::new(&table, dir.path()).totals().unwrap();
        assert_eq!(totals, vec![(101, 1)]);
    }

    #[test]
    fn non_batch_files_are_ignored() {
        let table = earliest(&[(101, "2020-01-01")]);
        let dir = tempfile::tempdir().unwrap();
        write_batch(&dir.path().join("batch.json"), &[(101, "2020-05-05")]);
        fs::write(dir.path().join("README.txt"), "notes live here").unwrap();
        let totals = NoteWalker::new(&table, dir.path()).totals().unwrap();
        assert_eq!(totals, vec![(101, 1)]);
    }

    #[test]
    fn empty_tree_is_an_error() {
        let table = earliest(&[(101, "2020-01-01")]);
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("empty_sub")).unwrap();
        let err = NoteWalker::new(&table, dir.path()).totals().unwrap_err();
        assert!(matches!(err, CountError::NoBatchFiles { .. }));
    }

    #[test]
    fn zero_qualifying_notes_is_an_error() {
        let table = earliest(&[(101, "2020-01-01")]);
        let dir = tempfile::tempdir().unwrap();
        // only unknown MRNs
        write_batch(&dir.path().join("batch.json"), &[(999, "2022-01-01")]);
        let err = NoteWalker::new(&table, dir.path()).totals().unwrap_err();
        assert!(matches!(err, CountError::NoQualifyingNotes { .. }));
    }

    #[test]
    fn csv_batch_fails_loudly() {
        let table = earliest(&[(101, "2020-01-01")]);
        let dir = tempfile::tempdir().unwrap();
        write_batch(&dir.path().join("batch.json"), &[(101, "2020-05-05")]);
        fs::write(dir.path().join("imaging.csv"), "DFCI_MRN,EVENT_DATE\n").unwrap();
        let err = NoteWalker::new(&table, dir.path()).totals().unwrap_err();
        assert!(matches!(err, CountError::CsvBatchUnsupported { .. }));
    }
}
