//! CSV rendering of screener results.

use crate::fetcher::ResultRow;

/// Header line, in column order.
pub const HEADER: [&str; 5] = [
    "Rank",
    "Stock Symbol",
    "Percent Change",
    "Current Price",
    "Trade Volume",
];

/// Attachment file name for a screener download.
pub fn file_name(screener_id: &str) -> String {
    format!("{}_stocks.csv", screener_id)
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn push_row<S: AsRef<str>>(out: &mut String, row: &[S]) {
    let mut first = true;
    for cell in row {
        if !first {
            out.push(',');
        } else {
            first = false;
        }
        let cell = cell.as_ref();
        if needs_quotes(cell) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

/// Render rows as a CSV document: one header line, then one line per row.
pub fn render(rows: &[ResultRow]) -> String {
    let mut out = String::new();
    push_row(&mut out, &HEADER);

    for row in rows {
        push_row(
            &mut out,
            &[
                row.rank.to_string(),
                row.symbol.clone(),
                row.percent_change.to_string(),
                row.price.to_string(),
                row.volume.to_string(),
            ],
        );
    }

    out
}
