use anyhow::{bail, Context, Result};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Create and return the first free `<base>/<prefix>N` directory
/// (train0, train1, ...). `create_dir` fails on an existing entry, so two
/// runs started together never share a directory.
pub fn allocate_run_dir(base: impl AsRef<Path>, prefix: &str) -> Result<PathBuf> {
    let base = base.as_ref();
    fs::create_dir_all(base)
        .with_context(|| format!("Cannot create runs dir '{}'", base.display()))?;

    for run_id in 0u64.. {
        let candidate = base.join(format!("{prefix}{run_id}"));
        match fs::create_dir(&candidate) {
            Ok(()) => {
                tracing::info!("Run directory: '{}'", candidate.display());
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Cannot create run dir '{}'", candidate.display()))
            }
        }
    }
    bail!("No free run directory under '{}'", base.display())
}
