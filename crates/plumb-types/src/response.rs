//! Tabular command responses.

use serde::{Deserialize, Serialize};

/// Output of a command: optional header plus rows of cells.
///
/// Commands that only mutate state return an empty response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CommandResponse {
    /// An empty response.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A table with the given header and rows.
    pub fn table<H: Into<String>>(header: impl IntoIterator<Item = H>, rows: Vec<Vec<String>>) -> Self {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.rows.is_empty()
    }

    /// Render as a left-aligned table with two spaces between columns.
    ///
    /// A response with a header but no rows renders just the header line.
    pub fn to_table_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let columns = self
            .rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.header.len()))
            .max()
            .unwrap_or(0);

        let mut widths = vec![0usize; columns];
        for row in std::iter::once(&self.header).chain(self.rows.iter()) {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let mut out = String::new();
        for row in std::iter::once(&self.header).chain(self.rows.iter()) {
            if row.is_empty() {
                continue;
            }
            let last = row.len() - 1;
            for (i, cell) in row.iter().enumerate() {
                out.push_str(cell);
                if i < last {
                    let pad = widths[i] - cell.chars().count() + 2;
                    out.extend(std::iter::repeat_n(' ', pad));
                }
            }
            out.push('\n');
        }
        out
    }
}
