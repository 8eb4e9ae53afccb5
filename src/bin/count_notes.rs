use clap::Parser;
use qu::ick_use::*;
use std::path::PathBuf;

#[derive(Parser)]
struct Opt {
    /// CSV containing patient MRNs and earliest dates
    #[clap(long)]
    pt_record_csv: PathBuf,
    /// Fields for which we want to get the totals
    ///
    /// Accepted but not yet used by the counting logic.
    #[clap(
        long,
        num_args(1..),
        default_values_t = ["SUBJECT", "PROVIDER_TYPE", "SPECIALTY_NAME"].map(String::from)
    )]
    fields: Vec<String>,
    /// Directory containing nested directories of notes contained in JSON files
    #[clap(long)]
    notes_dir: PathBuf,
    /// Directory for outputting table
    #[clap(long, default_value = ".")]
    output_dir: PathBuf,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    note_totals::run(&opt.pt_record_csv, &opt.notes_dir, &opt.output_dir, &opt.fields)
}
