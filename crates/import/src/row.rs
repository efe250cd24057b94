use recon_core::HeaderSet;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashSet;
use std::fmt;

/// Row key given to a column whose header cell is empty.
pub const BLANK_HEADER_KEY: &str = "__EMPTY";

/// A single cell as stored in the source file.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// Spreadsheet error literal, e.g. `#DIV/0!`.
    Error(String),
    Empty,
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Error(e) => write!(f, "{e}"),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

/// One data record keyed by column, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Vec<(String, CellValue)>);

impl Row {
    pub(crate) fn from_cells(cells: Vec<(String, CellValue)>) -> Self {
        Row(cells)
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// A column of the header record, with the unique key its cells are stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Column {
    pub key: String,
    pub named: bool,
}

/// Assign every header cell a unique row key. Blank headers become
/// `__EMPTY`, `__EMPTY_1`, ...; repeated names become `Amt`, `Amt_1`, ...
pub(crate) fn columns<I>(header_cells: I) -> Vec<Column>
where
    I: IntoIterator<Item = String>,
{
    let mut seen: HashSet<String> = HashSet::new();
    header_cells
        .into_iter()
        .map(|raw| {
            let named = !raw.is_empty();
            let base = if named { raw } else { BLANK_HEADER_KEY.to_string() };
            let mut key = base.clone();
            let mut n = 0;
            while seen.contains(&key) {
                n += 1;
                key = format!("{base}_{n}");
            }
            seen.insert(key.clone());
            Column { key, named }
        })
        .collect()
}

pub(crate) fn header_set(columns: &[Column]) -> HeaderSet {
    HeaderSet::new(
        columns
            .iter()
            .filter(|c| c.named)
            .map(|c| c.key.clone())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn blank_headers_get_placeholder_keys() {
        let cols = columns(names(&["TxnID", "", "Amt", ""]));
        let keys: Vec<_> = cols.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["TxnID", "__EMPTY", "Amt", "__EMPTY_1"]);
        assert_eq!(header_set(&cols).as_slice(), &names(&["TxnID", "Amt"]));
    }

    #[test]
    fn repeated_headers_are_suffixed() {
        let cols = columns(names(&["Amt", "Amt", "Amt_1", "Amt"]));
        let keys: Vec<_> = cols.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["Amt", "Amt_1", "Amt_1_1", "Amt_2"]);
    }

    #[test]
    fn number_display_drops_integral_fraction() {
        assert_eq!(CellValue::Number(40.0).to_string(), "40");
        assert_eq!(CellValue::Number(12.5).to_string(), "12.5");
        assert_eq!(CellValue::Number(-3.0).to_string(), "-3");
        assert_eq!(CellValue::Empty.to_string(), "");
    }

    #[test]
    fn row_serializes_as_ordered_map() {
        let row = Row::from_cells(vec![
            ("TxnID".to_string(), CellValue::from("T1")),
            ("Amt".to_string(), CellValue::Number(9.5)),
            ("__EMPTY".to_string(), CellValue::Empty),
        ]);
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"TxnID":"T1","Amt":9.5,"__EMPTY":null}"#
        );
        assert_eq!(row.get("Amt"), Some(&CellValue::Number(9.5)));
        assert_eq!(row.get("missing"), None);
    }
}
