// src/xlsx/mod.rs
//! Minimal `.xlsx` reader: shared strings plus the first worksheet, which is
//! all the index spreadsheets carry.

pub mod shared_strings;
pub mod worksheet;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};
use tracing::debug;
use zip::{result::ZipError, ZipArchive};

use crate::normalize::RawSheet;

pub use shared_strings::parse_shared_strings;
pub use worksheet::{parse_cell_ref, parse_worksheet};

const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const FIRST_SHEET: &str = "xl/worksheets/sheet1.xml";

static SHEET_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^xl/worksheets/sheet([0-9]+)\.xml$").expect("sheet part regex"));

/// Read the first worksheet of the workbook at `path`.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn read_first_sheet<P: AsRef<Path>>(path: P) -> Result<RawSheet> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open spreadsheet: {:?}", path.as_ref()))?;
    let sheet = read_from(BufReader::new(file))
        .with_context(|| format!("Failed to read spreadsheet: {:?}", path.as_ref()))?;
    debug!(rows = sheet.height(), cols = sheet.width(), "read worksheet");
    Ok(sheet)
}

pub fn read_first_sheet_from_bytes(data: &[u8]) -> Result<RawSheet> {
    read_from(std::io::Cursor::new(data))
}

fn read_from<R: Read + Seek>(reader: R) -> Result<RawSheet> {
    let mut archive = ZipArchive::new(reader).context("not a zip container")?;

    let shared = match read_part(&mut archive, SHARED_STRINGS) {
        Ok(xml) => parse_shared_strings(&xml)?,
        Err(ZipError::FileNotFound) => Vec::new(),
        Err(e) => return Err(e).context("reading shared strings part"),
    };

    let sheet_name = first_sheet_name(&archive)?;
    let xml = read_part(&mut archive, &sheet_name)
        .with_context(|| format!("reading worksheet part {}", sheet_name))?;
    parse_worksheet(&xml, &shared).with_context(|| format!("parsing {}", sheet_name))
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> std::result::Result<Vec<u8>, ZipError> {
    let mut entry = archive.by_name(name)?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

/// `sheet1.xml` when present, else the lowest-numbered worksheet part.
fn first_sheet_name<R: Read + Seek>(archive: &ZipArchive<R>) -> Result<String> {
    if archive.file_names().any(|n| n == FIRST_SHEET) {
        return Ok(FIRST_SHEET.to_string());
    }

    let lowest = archive
        .file_names()
        .filter_map(|n| {
            let num: u32 = SHEET_PART.captures(n)?[1].parse().ok()?;
            Some((num, n.to_string()))
        })
        .min();

    match lowest {
        Some((_, name)) => Ok(name),
        None => bail!("workbook has no worksheet parts"),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{workbook, workbook_with_sheet};
    use super::*;
    use crate::normalize::Cell;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_first_sheet_from_file() -> Result<()> {
        let bytes = workbook(&[
            &["", "mar/24", "abr/24", "Var. mês", "Var. ano"],
            &["ICF", "100.0", "101.5", "1,2%", "-0,5%"],
        ]);
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(&bytes)?;

        let sheet = read_first_sheet(tmp.path())?;

        assert_eq!(sheet.height(), 2);
        assert_eq!(sheet.rows[0][0], Cell::Empty);
        assert_eq!(sheet.rows[0][1], Cell::text("mar/24"));
        assert_eq!(sheet.rows[1][2], Cell::Number(101.5));
        assert_eq!(sheet.rows[1][4], Cell::text("-0,5%"));
        Ok(())
    }

    #[test]
    fn test_falls_back_to_lowest_numbered_sheet() -> Result<()> {
        let bytes = workbook_with_sheet("xl/worksheets/sheet3.xml", &[&["ICF", "1"]]);
        let sheet = read_first_sheet_from_bytes(&bytes)?;
        assert_eq!(sheet.rows, vec![vec![Cell::text("ICF"), Cell::Number(1.0)]]);
        Ok(())
    }

    #[test]
    fn test_not_a_workbook_is_error() {
        assert!(read_first_sheet_from_bytes(b"not a zip").is_err());
    }
}
