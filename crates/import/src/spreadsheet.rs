use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use recon_core::HeaderSet;
use std::io::Cursor;

use crate::row::{self, CellValue, Column, Row};
use crate::ParseError;

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            // Raw serial number, not a formatted date.
            Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(e) => CellValue::Error(e.to_string()),
        }
    }
}

/// First worksheet of an XLS/XLSX workbook, held in memory.
#[derive(Debug, Clone)]
pub struct SpreadsheetSource {
    range: Range<Data>,
}

impl SpreadsheetSource {
    /// Decode a workbook and keep its first sheet. The container format is
    /// sniffed from the bytes, so a mislabeled `.xls` holding XLSX still opens.
    pub fn open(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(ParseError::NoWorksheet)??;
        Ok(Self { range })
    }

    pub fn headers(&self) -> Result<HeaderSet, ParseError> {
        Ok(self
            .header_columns()
            .map(|cols| row::header_set(&cols))
            .unwrap_or_default())
    }

    pub fn rows(&self, limit: usize) -> Result<Vec<Row>, ParseError> {
        let Some(columns) = self.header_columns() else {
            return Ok(Vec::new());
        };
        Ok(self
            .non_blank_rows()
            .skip(1)
            .take(limit)
            .map(|cells| {
                Row::from_cells(
                    columns
                        .iter()
                        .zip(cells)
                        .map(|(col, cell)| (col.key.clone(), CellValue::from(cell)))
                        .collect(),
                )
            })
            .collect())
    }

    fn header_columns(&self) -> Option<Vec<Column>> {
        self.non_blank_rows()
            .next()
            .map(|cells| row::columns(cells.iter().map(|c| CellValue::from(c).to_string())))
    }

    fn non_blank_rows(&self) -> impl Iterator<Item = &[Data]> + '_ {
        self.range
            .rows()
            .filter(|cells| !cells.iter().all(|c| CellValue::from(c).is_blank()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn workbook_bytes(build: impl FnOnce(&mut rust_xlsxwriter::Worksheet)) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        build(sheet);
        workbook.save_to_buffer().unwrap()
    }

    fn sample() -> Vec<u8> {
        workbook_bytes(|ws| {
            ws.write_string(0, 0, "TxnID").unwrap();
            ws.write_string(0, 1, "Amt").unwrap();
            ws.write_string(0, 2, "Ref").unwrap();
            ws.write_string(1, 0, "T1").unwrap();
            ws.write_number(1, 1, 40.0).unwrap();
            ws.write_string(1, 2, "R1").unwrap();
            ws.write_string(2, 0, "T2").unwrap();
            ws.write_number(2, 1, 12.5).unwrap();
        })
    }

    #[test]
    fn headers_from_first_row() {
        let src = SpreadsheetSource::open(&sample()).unwrap();
        assert_eq!(
            src.headers().unwrap().as_slice(),
            &["TxnID".to_string(), "Amt".to_string(), "Ref".to_string()]
        );
    }

    #[test]
    fn rows_keep_raw_values() {
        let src = SpreadsheetSource::open(&sample()).unwrap();
        let rows = src.rows(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("TxnID"), Some(&CellValue::from("T1")));
        assert_eq!(rows[0].get("Amt"), Some(&CellValue::Number(40.0)));
        assert_eq!(rows[1].get("Amt"), Some(&CellValue::Number(12.5)));
        // Missing cells are present but empty.
        assert_eq!(rows[1].get("Ref"), Some(&CellValue::Empty));
    }

    #[test]
    fn blank_header_column_is_dropped_from_headers_but_kept_in_rows() {
        let bytes = workbook_bytes(|ws| {
            ws.write_string(0, 0, "TxnID").unwrap();
            ws.write_string(0, 2, "Amt").unwrap();
            ws.write_string(1, 0, "T1").unwrap();
            ws.write_string(1, 1, "note").unwrap();
            ws.write_number(1, 2, 3.0).unwrap();
        });
        let src = SpreadsheetSource::open(&bytes).unwrap();
        assert_eq!(
            src.headers().unwrap().as_slice(),
            &["TxnID".to_string(), "Amt".to_string()]
        );
        let rows = src.rows(10).unwrap();
        assert_eq!(rows[0].get("__EMPTY"), Some(&CellValue::from("note")));
    }

    #[test]
    fn numeric_header_is_stringified() {
        let bytes = workbook_bytes(|ws| {
            ws.write_number(0, 0, 2024.0).unwrap();
            ws.write_string(0, 1, "Amt").unwrap();
        });
        let src = SpreadsheetSource::open(&bytes).unwrap();
        assert_eq!(
            src.headers().unwrap().as_slice(),
            &["2024".to_string(), "Amt".to_string()]
        );
    }

    #[test]
    fn only_first_sheet_is_read() {
        let mut workbook = Workbook::new();
        workbook.add_worksheet().write_string(0, 0, "First").unwrap();
        workbook.add_worksheet().write_string(0, 0, "Second").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let src = SpreadsheetSource::open(&bytes).unwrap();
        assert_eq!(src.headers().unwrap().as_slice(), &["First".to_string()]);
    }

    #[test]
    fn rows_are_bounded() {
        let bytes = workbook_bytes(|ws| {
            ws.write_string(0, 0, "TxnID").unwrap();
            for r in 1..=250u32 {
                ws.write_string(r, 0, format!("T{r}")).unwrap();
            }
        });
        let src = SpreadsheetSource::open(&bytes).unwrap();
        let rows = src.rows(10).unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[9].get("TxnID"), Some(&CellValue::from("T10")));
    }

    // ── legacy BIFF8 workbook ───────────────────────────────────────────

    /// Two sheets: "Transactions" (TxnID, Amt, Ref) and "Notes" (Comment).
    const LEGACY_WORKBOOK: &[u8] = include_bytes!("../tests/fixtures/transactions.xls");

    #[test]
    fn xls_headers_from_first_row() {
        let src = SpreadsheetSource::open(LEGACY_WORKBOOK).unwrap();
        assert_eq!(
            src.headers().unwrap().as_slice(),
            &["TxnID".to_string(), "Amt".to_string(), "Ref".to_string()]
        );
    }

    #[test]
    fn xls_rows_keep_raw_values() {
        let src = SpreadsheetSource::open(LEGACY_WORKBOOK).unwrap();
        let rows = src.rows(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("TxnID"), Some(&CellValue::from("T1")));
        assert_eq!(rows[0].get("Amt"), Some(&CellValue::Number(40.0)));
        assert_eq!(rows[0].get("Ref"), Some(&CellValue::from("R1")));
        assert_eq!(rows[1].get("TxnID"), Some(&CellValue::from("T2")));
        assert_eq!(rows[1].get("Amt"), Some(&CellValue::Number(12.5)));
        assert_eq!(rows[1].get("Ref"), Some(&CellValue::Empty));
    }

    #[test]
    fn xls_second_sheet_is_ignored() {
        let src = SpreadsheetSource::open(LEGACY_WORKBOOK).unwrap();
        assert!(!src.headers().unwrap().contains("Comment"));
        let rows = src.rows(10).unwrap();
        assert!(rows.iter().all(|row| row.get("Comment").is_none()));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = SpreadsheetSource::open(b"TxnID,Amt\nT1,5\n").unwrap_err();
        assert!(matches!(err, ParseError::Spreadsheet(_)));
    }
}
