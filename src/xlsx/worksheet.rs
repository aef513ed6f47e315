use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use regex::Regex;
use std::collections::BTreeMap;

use crate::normalize::{Cell, RawSheet};

/// Excel's hard limits.
const MAX_ROWS: usize = 1_048_576;
const MAX_COLS: usize = 16_384;

static CELL_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$?([A-Za-z]{1,3})\$?([0-9]+)$").expect("cell ref regex"));

/// `"B12"` → `(11, 1)`, zero-based (row, column).
pub fn parse_cell_ref(r: &str) -> Option<(usize, usize)> {
    let caps = CELL_REF.captures(r.trim())?;
    let col = caps[1]
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b.to_ascii_uppercase() - b'A' + 1) as usize);
    let row: usize = caps[2].parse().ok()?;
    if row == 0 || row > MAX_ROWS || col > MAX_COLS {
        return None;
    }
    Some((row - 1, col - 1))
}

/// State for the `<c>` element being read.
#[derive(Default)]
struct PendingCell {
    row: usize,
    col: usize,
    kind: Option<String>,
    value: String,
}

/// Parse a `xl/worksheets/sheetN.xml` part into a dense grid.
pub fn parse_worksheet(xml: &[u8], shared: &[String]) -> Result<RawSheet> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut cells: BTreeMap<usize, Vec<(usize, Cell)>> = BTreeMap::new();
    let mut row_idx: usize = 0;
    let mut next_col: usize = 0;
    let mut seen_row = false;
    let mut pending: Option<PendingCell> = None;
    let mut in_value = false;

    loop {
        match reader.read_event_into(&mut buf).context("reading worksheet")? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_idx = row_position(&e, seen_row, row_idx)?;
                    seen_row = true;
                    next_col = 0;
                }
                b"c" => {
                    let (row, col, kind) = cell_position(&e, row_idx, next_col)?;
                    next_col = col + 1;
                    pending = Some(PendingCell {
                        row,
                        col,
                        kind,
                        value: String::new(),
                    });
                }
                // <v> for values, <t> inside <is> for inline strings
                b"v" | b"t" if pending.is_some() => in_value = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_idx = row_position(&e, seen_row, row_idx)?;
                    seen_row = true;
                    next_col = 0;
                }
                b"c" => {
                    let (_, col, _) = cell_position(&e, row_idx, next_col)?;
                    next_col = col + 1;
                }
                _ => {}
            },
            Event::Text(t) if in_value => {
                if let Some(p) = pending.as_mut() {
                    p.value.push_str(&t.unescape().context("unescaping cell text")?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(p) = pending.take() {
                        let cell = convert_cell(p.kind.as_deref(), &p.value, shared)?;
                        if cell != Cell::Empty {
                            cells.entry(p.row).or_default().push((p.col, cell));
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(into_grid(cells))
}

fn row_position(e: &BytesStart<'_>, seen_row: bool, prev: usize) -> Result<usize> {
    let fallback = if seen_row { prev + 1 } else { 0 };
    match attr(e, b"r")? {
        Some(r) => {
            let n: usize = r
                .trim()
                .parse()
                .with_context(|| format!("bad row number {:?}", r))?;
            if n == 0 || n > MAX_ROWS {
                bail!("row number {} out of range", n);
            }
            Ok(n - 1)
        }
        None => Ok(fallback),
    }
}

fn cell_position(
    e: &BytesStart<'_>,
    row_idx: usize,
    next_col: usize,
) -> Result<(usize, usize, Option<String>)> {
    let kind = attr(e, b"t")?;
    let (row, col) = match attr(e, b"r")? {
        Some(r) => parse_cell_ref(&r).ok_or_else(|| anyhow!("bad cell reference {:?}", r))?,
        None => (row_idx, next_col),
    };
    Ok((row, col, kind))
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.context("reading cell attribute")?;
        if a.key.local_name().as_ref() == name {
            return Ok(Some(a.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn convert_cell(kind: Option<&str>, raw: &str, shared: &[String]) -> Result<Cell> {
    let cell = match kind {
        Some("s") => {
            let idx: usize = raw
                .trim()
                .parse()
                .with_context(|| format!("bad shared string index {:?}", raw))?;
            let s = shared
                .get(idx)
                .ok_or_else(|| anyhow!("shared string {} out of range ({})", idx, shared.len()))?;
            Cell::from(s.as_str())
        }
        Some("inlineStr") | Some("str") => Cell::from(raw),
        Some("b") => match raw.trim() {
            "" => Cell::Empty,
            v => Cell::Bool(v == "1"),
        },
        Some("e") => Cell::Empty,
        Some("d") => NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S")
            .map(Cell::DateTime)
            .unwrap_or_else(|_| Cell::from(raw)),
        _ if raw.trim().is_empty() => Cell::Empty,
        _ => raw
            .trim()
            .parse::<f64>()
            .map(Cell::Number)
            .unwrap_or_else(|_| Cell::from(raw)),
    };
    Ok(cell)
}

fn into_grid(cells: BTreeMap<usize, Vec<(usize, Cell)>>) -> RawSheet {
    let Some(&last_row) = cells.keys().next_back() else {
        return RawSheet::default();
    };
    let width = cells
        .values()
        .flat_map(|r| r.iter().map(|(c, _)| c + 1))
        .max()
        .unwrap_or(0);

    let mut rows = vec![vec![Cell::Empty; width]; last_row + 1];
    for (r, row_cells) in cells {
        for (c, cell) in row_cells {
            rows[r][c] = cell;
        }
    }
    RawSheet::new(rows)
}
