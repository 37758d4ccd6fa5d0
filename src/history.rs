//! Job history: every saved or submitted bundle gets its own dated,
//! numbered directory.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;

use crate::error::BundleError;

const MAX_NAME_LEN: usize = 128;

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Creates `<root>/<YYYY-MM>/<YYYY-MM-DD>-<NN>-<submitter>-<name>` and
/// returns its path. `NN` counts the bundles of `today`, starting at `01`.
pub fn create_bundle_dir(
    root: &Utf8Path,
    submitter: &str,
    job_name: &str,
    today: NaiveDate,
) -> Result<Utf8PathBuf, BundleError> {
    let month_dir = root.join(today.format("%Y-%m").to_string());
    let day = today.format("%Y-%m-%d").to_string();

    fs::create_dir_all(&month_dir).map_err(|err| BundleError::Io(month_dir.clone(), err))?;

    let index = next_index(&month_dir, &day)?;
    let dir = month_dir.join(format!(
        "{day}-{index:02}-{submitter}-{}",
        sanitize(job_name)
    ));

    fs::create_dir(&dir).map_err(|err| BundleError::Io(dir.clone(), err))?;
    tracing::debug!(%dir, "created job history directory");

    Ok(dir)
}

/// One past the highest index already used on `day`.
fn next_index(month_dir: &Utf8Path, day: &str) -> Result<u32, BundleError> {
    let entries = month_dir
        .read_dir_utf8()
        .map_err(|err| BundleError::Io(month_dir.to_path_buf(), err))?;

    let highest = entries
        .filter_map(Result::ok)
        .filter_map(|entry| parse_index(entry.file_name(), day))
        .max()
        .unwrap_or(0);

    Ok(highest + 1)
}

fn parse_index(name: &str, day: &str) -> Option<u32> {
    let rest = name.strip_prefix(day)?.strip_prefix('-')?;
    let digits = rest.split('-').next()?;
    digits.parse().ok()
}

/// Keeps ASCII alphanumerics, `-` and `_`, replacing anything else.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .take(MAX_NAME_LEN)
        .collect()
}
