// ============================================================
// Layer 6 - Pretrained Word Vectors
// ============================================================
// Reads flat text word-vector files (GloVe, Tencent AI Lab):
//
//   <token> <v1> <v2> ... <vd>
//
// word2vec style exports start with a "<count> <dim>" header;
// a first line of exactly two integers is treated as one and
// skipped.
//
// The vector dimension is fixed by the first valid row. Rows
// whose arity differs, whose values do not parse as floats, or
// that are not valid UTF-8 are skipped and counted. When a token
// appears twice the first row wins.
//
// A file with no usable rows loads as an empty table of dim 0;
// intersecting a vocabulary with it leaves only reserved tokens.
//
// The full Tencent table is several GB, so loading takes an
// optional token filter: only rows for those tokens are kept.
// Prepare passes the frequency-filtered corpus vocabulary.
//
// Reference: Pennington et al. (2014) GloVe
//            Rust Book §8 (Hash Maps)

use anyhow::{Context, Result};
use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::domain::traits::EmbeddingSource;

/// In-memory token -> vector table.
#[derive(Debug, Clone, Default)]
pub struct PretrainedVectors {
    dim:     usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl PretrainedVectors {
    /// Load `path`, keeping only rows whose token is in `keep` (all rows
    /// when `keep` is None).
    pub fn load(path: impl AsRef<Path>, keep: Option<&HashSet<String>>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Cannot open word vectors '{}'", path.display()))?;

        let (vectors, skipped) = parse_vectors(BufReader::new(file), keep)
            .with_context(|| format!("Cannot read word vectors '{}'", path.display()))?;

        if skipped > 0 {
            tracing::warn!("Skipped {} malformed vector rows in '{}'", skipped, path.display());
        }
        tracing::info!(
            "Loaded {} vectors of dim {} from '{}'",
            vectors.len(),
            vectors.dim,
            path.display()
        );

        if vectors.is_empty() {
            tracing::warn!(
                "No usable vectors in '{}', only reserved tokens will survive",
                path.display()
            );
        }
        Ok(vectors)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl EmbeddingSource for PretrainedVectors {
    fn dim(&self) -> usize {
        self.dim
    }

    fn contains(&self, token: &str) -> bool {
        self.vectors.contains_key(token)
    }

    fn vector(&self, token: &str) -> Option<&[f32]> {
        self.vectors.get(token).map(Vec::as_slice)
    }
}

/// Parse every line, returning the table and the number of skipped rows.
fn parse_vectors<R: BufRead>(
    reader: R,
    keep:   Option<&HashSet<String>>,
) -> Result<(PretrainedVectors, usize)> {
    let mut table   = PretrainedVectors::default();
    let mut skipped = 0usize;

    for (line_no, bytes) in reader.split(b'\n').enumerate() {
        let Ok(line) = String::from_utf8(bytes?) else {
            tracing::debug!("Skipping vector row {}: not valid UTF-8", line_no + 1);
            skipped += 1;
            continue;
        };
        let mut fields = line.split_whitespace();
        let Some(token) = fields.next() else {
            continue;
        };
        let values: Vec<&str> = fields.collect();

        if line_no == 0 && is_header(token, &values) {
            tracing::debug!("Skipping vector file header: {:?}", line);
            continue;
        }

        // Arity and parse failures are checked before the filter so the
        // dimension is fixed by the file, not by which tokens were kept.
        let parsed: Option<Vec<f32>> = values.iter().map(|v| v.parse().ok()).collect();
        let vector = match parsed {
            Some(v) if !v.is_empty() && (table.dim == 0 || v.len() == table.dim) => v,
            _ => {
                tracing::debug!("Skipping vector row {}", line_no + 1);
                skipped += 1;
                continue;
            }
        };
        if table.dim == 0 {
            table.dim = vector.len();
        }

        if keep.is_some_and(|k| !k.contains(token)) || table.vectors.contains_key(token) {
            continue;
        }
        table.vectors.insert(token.to_string(), vector);
    }

    Ok((table, skipped))
}

fn is_header(token: &str, values: &[&str]) -> bool {
    values.len() == 1 && token.parse::<usize>().is_ok() && values[0].parse::<usize>().is_ok()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempdir::TempDir;

    #[test]
    fn test_parses_glove_rows() {
        let input = "the 0.1 0.2 0.3\ncat 1 2 3\n";
        let (table, skipped) = parse_vectors(Cursor::new(input), None).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(table.dim(), 3);
        assert_eq!(table.vector("cat"), Some(&[1.0, 2.0, 3.0][..]));
        assert!(!table.contains("dog"));
    }

    #[test]
    fn test_skips_word2vec_header() {
        let input = "2 2\n你好 0.5 0.5\n世界 1.5 -1.5\n";
        let (table, skipped) = parse_vectors(Cursor::new(input), None).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.dim(), 2);
    }

    #[test]
    fn test_wrong_arity_and_bad_floats_are_skipped() {
        let input = "a 1 2\nb 1 2 3\nc x 2\nd 4 5\n";
        let (table, skipped) = parse_vectors(Cursor::new(input), None).unwrap();
        assert_eq!(skipped, 2);
        assert!(table.contains("a"));
        assert!(table.contains("d"));
        assert!(!table.contains("b"));
    }

    #[test]
    fn test_filter_keeps_only_requested_tokens() {
        let keep: HashSet<String> = ["cat".to_string()].into();
        let input = "the 0.1 0.2\ncat 1 2\n";
        let (table, _) = parse_vectors(Cursor::new(input), Some(&keep)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.dim(), 2);
        assert!(table.contains("cat"));
    }

    #[test]
    fn test_first_duplicate_wins() {
        let input = "cat 1 1\ncat 2 2\n";
        let (table, _) = parse_vectors(Cursor::new(input), None).unwrap();
        assert_eq!(table.vector("cat"), Some(&[1.0, 1.0][..]));
    }

    #[test]
    fn test_invalid_utf8_row_is_skipped() {
        let mut input = b"cat 1 2\n".to_vec();
        input.extend_from_slice(b"\xff\xfe 3 4\n");
        input.extend_from_slice("猫 5 6\n".as_bytes());

        let (table, skipped) = parse_vectors(Cursor::new(input), None).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.vector("猫"), Some(&[5.0, 6.0][..]));
    }

    #[test]
    fn test_empty_file_loads_as_empty_table() {
        let tmp  = TempDir::new("vectors").unwrap();
        let path = tmp.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();

        let table = PretrainedVectors::load(&path, None).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.dim(), 0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(PretrainedVectors::load("no/such/vectors.txt", None).is_err());
    }
}
