//! In-memory tables
//!
//! [`RawTable`] holds source rows as text, exactly as read. [`Frame`] is
//! the typed, date-keyed table every later stage works on: one Gregorian
//! date per row and named numeric columns with explicit missing values.

use chrono::NaiveDate;
use std::path::Path;

use crate::calendar::{format_local_era, parse_local_era};
use crate::errors::{PipelineError, Result};
use crate::io::{file_label, read_text, write_csv_atomic};
use crate::schema::DATE;

/// Coerce a cell to a number. Placeholders such as `-`, blanks and
/// non-finite tokens become missing.
pub fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn format_number(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => String::new(),
    }
}

/// Source rows as text under their original headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Read a CSV file, skipping `skip_lines` banner lines above the header.
    /// Headers are trimmed and short rows are padded to the header width.
    pub fn read_csv(path: &Path, skip_lines: usize) -> Result<Self> {
        let content = read_text(path)?;
        let body = content
            .split_inclusive('\n')
            .skip(skip_lines)
            .collect::<String>();

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(body.as_bytes());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(PipelineError::Malformed {
                file: file_label(path),
                detail: "missing header row".to_string(),
            });
        }

        let width = headers.len();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        write_csv_atomic(path, |w| {
            w.write_record(&self.headers)?;
            for row in &self.rows {
                w.write_record(row)?;
            }
            Ok(())
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell text at `(row, col)`; empty if the row is short.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// A new table with the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            headers: self.headers.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// A named numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Date-keyed numeric table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl Frame {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Append a column, replacing any existing column of the same name.
    ///
    /// # Panics
    ///
    /// If `values` does not have one entry per row.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        let name = name.into();
        assert_eq!(
            values.len(),
            self.dates.len(),
            "column '{}' length does not match frame",
            name
        );

        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.values = values,
            None => self.columns.push(Column { name, values }),
        }
    }

    pub fn drop_columns(&mut self, names: &[&str]) {
        self.columns.retain(|c| !names.contains(&c.name.as_str()));
    }

    /// Row index of `date`, if present.
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.dates.iter().position(|d| *d == date)
    }

    /// Value of `column` at `row`.
    pub fn value(&self, column: &str, row: usize) -> Option<f64> {
        self.column(column).and_then(|values| values.get(row).copied().flatten())
    }

    /// Reorder rows by ascending date. Ties keep their relative order.
    pub fn sort_by_date(&mut self) {
        let mut order: Vec<usize> = (0..self.dates.len()).collect();
        order.sort_by_key(|&i| self.dates[i]);
        if order.iter().enumerate().all(|(pos, &i)| pos == i) {
            return;
        }

        self.dates = order.iter().map(|&i| self.dates[i]).collect();
        for column in &mut self.columns {
            column.values = order.iter().map(|&i| column.values[i]).collect();
        }
    }

    /// Read a pipeline-written table: local-era date first, numeric columns
    /// after. Rows whose date cannot be parsed are dropped.
    pub fn read_csv(path: &Path) -> Result<Self> {
        let raw = RawTable::read_csv(path, 0)?;
        let date_idx = raw
            .headers
            .iter()
            .position(|h| h == DATE)
            .ok_or_else(|| PipelineError::MissingColumn {
                file: file_label(path),
                role: DATE.to_string(),
            })?;

        let kept: Vec<(usize, NaiveDate)> = (0..raw.len())
            .filter_map(|r| parse_local_era(raw.cell(r, date_idx)).map(|d| (r, d)))
            .collect();

        let mut frame = Frame::new(kept.iter().map(|(_, d)| *d).collect());
        for (c, header) in raw.headers.iter().enumerate() {
            if c == date_idx {
                continue;
            }
            let values = kept.iter().map(|(r, _)| parse_number(raw.cell(*r, c))).collect();
            frame.push_column(header.clone(), values);
        }
        Ok(frame)
    }

    /// Write with the local-era date as the first column.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        write_csv_atomic(path, |w| {
            let mut header = vec![DATE.to_string()];
            header.extend(self.columns.iter().map(|c| c.name.clone()));
            w.write_record(&header)?;

            for (row, date) in self.dates.iter().enumerate() {
                let mut record = Vec::with_capacity(self.columns.len() + 1);
                record.push(format_local_era(*date));
                record.extend(self.columns.iter().map(|c| format_number(c.values[row])));
                w.write_record(&record)?;
            }
            Ok(())
        })
    }
}
