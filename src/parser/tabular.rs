//! CSV and spreadsheet rendering.
//!
//! Both formats render one row per line with cells joined by ` | `, header
//! row first, so the text stays readable for the model and greppable for
//! retrieval.
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};

use super::ParseError;

const CELL_SEPARATOR: &str = " | ";

/// Render the whole CSV file, header included.
pub fn render_csv(path: &Path) -> Result<String, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| ParseError::Csv(e.to_string()))?;

    let mut out = String::new();
    for record in reader.records() {
        let record = record.map_err(|e| ParseError::Csv(e.to_string()))?;
        let cells: Vec<&str> = record.iter().map(str::trim).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        out.push_str(&cells.join(CELL_SEPARATOR));
        out.push('\n');
    }
    Ok(out)
}

/// Render every worksheet, each under a `Sheet: <name>` line.
pub fn render_spreadsheet(path: &Path) -> Result<String, ParseError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ParseError::Spreadsheet(e.to_string()))?;

    let mut out = String::new();
    for sheet_name in workbook.sheet_names().to_vec() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ParseError::Spreadsheet(format!("sheet {sheet_name}: {e}")))?;

        out.push_str(&format!("Sheet: {sheet_name}\n"));
        for row in range.rows() {
            let cells: Vec<String> = row.iter().map(cell_text).collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            out.push_str(&cells.join(CELL_SEPARATOR));
            out.push('\n');
        }
        out.push('\n');
    }
    Ok(out)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_render_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "name,age\nAlice,30\nBob, 41\n").unwrap();

        let text = render_csv(file.path()).unwrap();
        assert_eq!(text, "name | age\nAlice | 30\nBob | 41\n");
    }

    #[test]
    fn test_render_csv_skips_blank_rows_and_ragged_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "city,country\n,\nParis,France,EU\n").unwrap();

        let text = render_csv(file.path()).unwrap();
        assert_eq!(text, "city | country\nParis | France | EU\n");
    }

    #[test]
    fn test_render_spreadsheet_rejects_garbage() {
        let mut file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        file.write_all(b"definitely not a zip archive").unwrap();

        let err = render_spreadsheet(file.path()).unwrap_err();
        assert!(matches!(err, ParseError::Spreadsheet(_)));
    }

    #[test]
    fn test_render_spreadsheet_every_sheet() {
        let fixture = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/people.xlsx"));

        let text = render_spreadsheet(fixture).unwrap();
        assert_eq!(
            text,
            "Sheet: People\nname | age\nAlice | 30\nBob | 41.5\n\n\
             Sheet: Cities\ncity | country\nParis | France\n\n"
        );
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(30.0)), "30");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::String(" Alice ".to_string())), "Alice");
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::Bool(true)), "true");
    }
}
