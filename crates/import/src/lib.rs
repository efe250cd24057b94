pub mod csv;
pub mod row;
pub mod spreadsheet;

use recon_core::{FileFormat, HeaderSet, RawFile};
use thiserror::Error;

pub use crate::csv::CsvSource;
pub use row::{CellValue, Row, BLANK_HEADER_KEY};
pub use spreadsheet::SpreadsheetSource;

/// Rows materialized for a preview.
pub const PREVIEW_ROW_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("Workbook has no worksheets")]
    NoWorksheet,
    #[error("Parser task failed: {0}")]
    Task(String),
}

/// A decoded tabular file, chosen once per file by its format tag.
#[derive(Debug, Clone)]
pub enum TabularSource {
    Csv(CsvSource),
    Spreadsheet(SpreadsheetSource),
}

impl TabularSource {
    pub fn open(file: &RawFile) -> Result<Self, ParseError> {
        match file.format() {
            FileFormat::Csv => Ok(TabularSource::Csv(CsvSource::new(file.clone()))),
            FileFormat::Xlsx | FileFormat::Xls => Ok(TabularSource::Spreadsheet(
                SpreadsheetSource::open(file.bytes())?,
            )),
        }
    }

    pub fn headers(&self) -> Result<HeaderSet, ParseError> {
        match self {
            TabularSource::Csv(src) => src.headers(),
            TabularSource::Spreadsheet(src) => src.headers(),
        }
    }

    pub fn rows(&self, limit: usize) -> Result<Vec<Row>, ParseError> {
        match self {
            TabularSource::Csv(src) => src.rows(limit),
            TabularSource::Spreadsheet(src) => src.rows(limit),
        }
    }
}

pub fn extract_headers(file: &RawFile) -> Result<HeaderSet, ParseError> {
    TabularSource::open(file)?.headers()
}

/// Display-only: the submission always sends the original file.
pub fn extract_rows(file: &RawFile, max_rows: usize) -> Result<Vec<Row>, ParseError> {
    TabularSource::open(file)?.rows(max_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_on_format() {
        let csv = RawFile::new("data.csv", b"TxnID,Amt\nT1,1\n".to_vec()).unwrap();
        assert!(matches!(TabularSource::open(&csv).unwrap(), TabularSource::Csv(_)));

        let mut workbook = rust_xlsxwriter::Workbook::new();
        workbook.add_worksheet().write_string(0, 0, "TxnID").unwrap();
        let xlsx = RawFile::new("data.xlsx", workbook.save_to_buffer().unwrap()).unwrap();
        assert!(matches!(
            TabularSource::open(&xlsx).unwrap(),
            TabularSource::Spreadsheet(_)
        ));
    }

    #[test]
    fn extract_from_scenario_file() {
        let file = RawFile::new("data.csv", b"TxnID,Amt,Ref\nT1,10,R1\nT2,20,R2\nT3,30,R3\n".to_vec())
            .unwrap();
        let headers = extract_headers(&file).unwrap();
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["TxnID", "Amt", "Ref"]);
        assert_eq!(extract_rows(&file, PREVIEW_ROW_LIMIT).unwrap().len(), 3);
    }

    #[test]
    fn legacy_xls_file_extracts_first_sheet() {
        let bytes = include_bytes!("../tests/fixtures/transactions.xls").to_vec();
        let file = RawFile::new("transactions.xls", bytes).unwrap();
        assert_eq!(file.format(), FileFormat::Xls);
        let headers = extract_headers(&file).unwrap();
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["TxnID", "Amt", "Ref"]);
        let rows = extract_rows(&file, PREVIEW_ROW_LIMIT).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("Amt"), Some(&CellValue::Number(12.5)));
    }

    #[test]
    fn spreadsheet_extension_with_csv_content_fails() {
        let file = RawFile::new("data.xls", b"TxnID,Amt\nT1,10\n".to_vec()).unwrap();
        assert!(extract_headers(&file).is_err());
    }
}
