use recon_core::{HeaderSet, RawFile};

use crate::row::{self, CellValue, Column, Row};
use crate::ParseError;

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// CSV text source. The first non-blank record is the header record.
#[derive(Debug, Clone)]
pub struct CsvSource {
    file: RawFile,
    delimiter: u8,
}

impl CsvSource {
    pub fn new(file: RawFile) -> Self {
        let delimiter = detect_delimiter(file.bytes());
        Self { file, delimiter }
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn headers(&self) -> Result<HeaderSet, ParseError> {
        let mut records = self.records();
        match records.next() {
            Some(header) => Ok(row::header_set(&header_columns(&header?))),
            None => Ok(HeaderSet::default()),
        }
    }

    pub fn rows(&self, limit: usize) -> Result<Vec<Row>, ParseError> {
        let mut records = self.records();
        let columns = match records.next() {
            Some(header) => header_columns(&header?),
            None => return Ok(Vec::new()),
        };

        let mut rows = Vec::new();
        for result in records.take(limit) {
            let record = result?;
            // Short records simply lack the trailing keys; surplus cells are dropped.
            let cells = columns
                .iter()
                .zip(record.iter())
                .map(|(col, field)| (col.key.clone(), CellValue::from(field)))
                .collect();
            rows.push(Row::from_cells(cells));
        }
        Ok(rows)
    }

    /// Non-blank records in file order, header first.
    fn records(&self) -> impl Iterator<Item = Result<csv::StringRecord, ParseError>> + '_ {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(self.file.bytes())
            .into_records()
            .filter(|result| match result {
                Ok(record) => !record.iter().all(str::is_empty),
                Err(_) => true,
            })
            .map(|result| result.map_err(ParseError::from))
    }
}

fn header_columns(record: &csv::StringRecord) -> Vec<Column> {
    row::columns(record.iter().map(str::to_string))
}

/// Pick the delimiter that occurs most often, outside quotes, on the first
/// non-empty line. Falls back to a comma.
pub fn detect_delimiter(data: &[u8]) -> u8 {
    let line = data
        .split(|b| *b == b'\n')
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
        .find(|l| !l.is_empty())
        .unwrap_or_default();

    let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
    let mut in_quotes = false;
    for b in line {
        if *b == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(idx) = CANDIDATE_DELIMITERS.iter().position(|d| d == b) {
            counts[idx] += 1;
        }
    }

    let (best, count) = counts
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
        .map(|(idx, count)| (CANDIDATE_DELIMITERS[idx], *count))
        .unwrap_or((b',', 0));

    if count == 0 {
        b','
    } else {
        best
    }
}
