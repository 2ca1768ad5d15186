// ============================================================
// Layer 4 - Parallel Corpus Loader
// ============================================================
// Reads a tab separated parallel corpus, one sentence pair per
// line:
//
//   <english sentence>\t<chinese sentence>
//
// English comes first, the layout of the OpenSubtitles en-zh
// TSV exports this project trains on.
//
// Corpus files are large and messy. A row is skipped (never
// fatal) when:
//   - it does not have exactly two tab separated fields
//   - either field is empty after trimming
//   - it is not valid UTF-8
//
// Skipped rows are logged at debug level and counted; the total
// is reported once at the end.
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use crate::domain::sentence_pair::SentencePair;
use crate::domain::traits::CorpusSource;

/// Loads sentence pairs from a `.tsv` file.
/// Implements the CorpusSource trait from Layer 3.
pub struct TsvCorpusLoader {
    path: PathBuf,
}

impl TsvCorpusLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CorpusSource for TsvCorpusLoader {
    fn load_pairs(&self) -> Result<Vec<SentencePair>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Cannot open corpus '{}'", self.path.display()))?;

        let (pairs, skipped) = parse_rows(BufReader::new(file))
            .with_context(|| format!("Cannot read corpus '{}'", self.path.display()))?;

        if skipped > 0 {
            tracing::warn!(
                "Skipped {} malformed rows in '{}'",
                skipped,
                self.path.display()
            );
        }
        tracing::info!("Loaded {} sentence pairs", pairs.len());
        Ok(pairs)
    }
}

/// Parse every line of `reader`, returning the usable pairs and the
/// number of skipped rows. Only I/O failures are errors.
fn parse_rows<R: BufRead>(reader: R) -> Result<(Vec<SentencePair>, usize)> {
    let mut pairs   = Vec::new();
    let mut skipped = 0usize;

    for (line_no, bytes) in reader.split(b'\n').enumerate() {
        let Ok(line) = String::from_utf8(bytes?) else {
            tracing::debug!("Skipping row {}: not valid UTF-8", line_no + 1);
            skipped += 1;
            continue;
        };
        match parse_row(&line) {
            Some(pair) => pairs.push(pair),
            None => {
                tracing::debug!("Skipping row {}: {:?}", line_no + 1, line);
                skipped += 1;
            }
        }
    }

    Ok((pairs, skipped))
}

/// English first, Chinese second.
fn parse_row(line: &str) -> Option<SentencePair> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    let mut fields = line.split('\t');

    let english = fields.next()?.trim();
    let chinese = fields.next()?.trim();
    if fields.next().is_some() || english.is_empty() || chinese.is_empty() {
        return None;
    }

    Some(SentencePair::new(chinese, english))
}
