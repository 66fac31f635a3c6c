//! Bounded text rendering of query results.

use cq_db::QueryOutput;

/// Render `output` as a `|`-separated header followed by ` | `-joined rows.
///
/// Rows are appended in order while the whole text stays within `max_chars`
/// characters; the header is always present.
pub fn format_table(output: &QueryOutput, max_chars: usize) -> String {
    let mut result = output.column_names().join("|");
    let mut length = result.chars().count();

    for row in &output.rows {
        let line = row.join(" | ");
        let added = line.chars().count() + 1;
        if length + added > max_chars {
            break;
        }
        result.push('\n');
        result.push_str(&line);
        length += added;
    }
    result
}
