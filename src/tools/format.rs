//! Output formatting for tool results.
//!
//! Renders a normalized [`ExecutionOutcome`] as a MySQL CLI style ASCII table
//! or a Markdown table. Column widths are measured in terminal cells, so wide
//! characters line up.

use crate::models::{ColumnDescription, ExecutionOutcome, Row};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Output format for tabular results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// ASCII table format (like MySQL CLI)
    Table,
    /// Markdown table format
    Markdown,
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
    Center,
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(arr) => serde_json::to_string(arr).unwrap_or_default(),
        JsonValue::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}

fn pad(text: &str, width: usize, align: Align) -> String {
    let fill = width.saturating_sub(text.width());
    match align {
        Align::Left => format!("{}{}", text, " ".repeat(fill)),
        Align::Right => format!("{}{}", " ".repeat(fill), text),
        Align::Center => {
            let left = fill / 2;
            format!("{}{}{}", " ".repeat(left), text, " ".repeat(fill - left))
        }
    }
}

/// Render an outcome in the requested format. Returns `None` for JSON.
pub fn render(
    outcome: &ExecutionOutcome,
    format: OutputFormat,
    execution_time_ms: u64,
) -> Option<String> {
    if format == OutputFormat::Json {
        return None;
    }

    let rendered = match outcome {
        ExecutionOutcome::Rows {
            columns,
            rows,
            truncated,
            ..
        } => render_rows(columns, rows, *truncated, format, execution_time_ms),
        ExecutionOutcome::SchemaInfo { columns } => {
            let (headers, rows) = describe_rows(columns);
            render_rows(&headers, &rows, false, format, execution_time_ms)
        }
        ExecutionOutcome::NameList { names, current } => {
            let headers = vec!["Name".to_string()];
            let rows: Vec<Row> = names
                .iter()
                .map(|n| {
                    let label = if current.as_deref() == Some(n.as_str()) {
                        format!("{} (current)", n)
                    } else {
                        n.clone()
                    };
                    let mut row = Row::new();
                    row.insert("Name".to_string(), JsonValue::String(label));
                    row
                })
                .collect();
            render_rows(&headers, &rows, false, format, execution_time_ms)
        }
        ExecutionOutcome::AffectedCount { count } => {
            let row_text = if *count == 1 { "row" } else { "rows" };
            format!(
                "Query OK, {} {} affected ({:.2} sec)",
                count,
                row_text,
                execution_time_ms as f64 / 1000.0
            )
        }
        ExecutionOutcome::Success { message } => message.clone(),
    };

    Some(rendered)
}

fn render_rows(
    columns: &[String],
    rows: &[Row],
    truncated: bool,
    format: OutputFormat,
    execution_time_ms: u64,
) -> String {
    match format {
        OutputFormat::Markdown => format_as_markdown(columns, rows, truncated),
        _ => format_as_table(columns, rows, truncated, execution_time_ms),
    }
}

/// Turn column descriptions into the `DESCRIBE` layout.
fn describe_rows(columns: &[ColumnDescription]) -> (Vec<String>, Vec<Row>) {
    let headers: Vec<String> = ["Field", "Type", "Null", "Key", "Default", "Extra"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let opt = |v: &Option<String>| v.clone().map_or(JsonValue::Null, JsonValue::String);
    let rows = columns
        .iter()
        .map(|c| {
            let mut row = Row::new();
            row.insert("Field".into(), JsonValue::String(c.name.clone()));
            row.insert("Type".into(), JsonValue::String(c.data_type.clone()));
            row.insert(
                "Null".into(),
                JsonValue::String(if c.nullable { "YES" } else { "NO" }.into()),
            );
            row.insert("Key".into(), JsonValue::String(c.key.as_str().into()));
            row.insert("Default".into(), opt(&c.default));
            row.insert("Extra".into(), opt(&c.extra));
            row
        })
        .collect();

    (headers, rows)
}

/// Format rows as an ASCII table (MySQL CLI style).
pub fn format_as_table(
    columns: &[String],
    rows: &[Row],
    truncated: bool,
    execution_time_ms: u64,
) -> String {
    let elapsed = execution_time_ms as f64 / 1000.0;
    if columns.is_empty() || rows.is_empty() {
        return format!("Empty set ({:.2} sec)\n", elapsed);
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in rows {
        for (i, col) in columns.iter().enumerate() {
            if let Some(value) = row.get(col) {
                widths[i] = widths[i].max(format_value(value).width());
            }
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| format!("| {} ", pad(col, *w, Align::Center)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for row in rows {
        let row_str: String = columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| {
                let value = row.get(col).unwrap_or(&JsonValue::Null);
                let formatted = format_value(value);
                // Right-align numbers, left-align others
                let align = if value.is_number() {
                    Align::Right
                } else {
                    Align::Left
                };
                format!("| {} ", pad(&formatted, *w, align))
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&row_str);
    }

    output.push_str(&separator);

    let row_text = if rows.len() == 1 { "row" } else { "rows" };
    let truncated_text = if truncated { " (truncated)" } else { "" };
    output.push_str(&format!(
        "{} {} in set{} ({:.2} sec)\n",
        rows.len(),
        row_text,
        truncated_text,
        elapsed
    ));

    output
}

fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

/// Format rows as a Markdown table.
pub fn format_as_markdown(columns: &[String], rows: &[Row], truncated: bool) -> String {
    if columns.is_empty() || rows.is_empty() {
        return "*Empty set*".to_string();
    }

    let mut output = String::new();

    let header: String = columns
        .iter()
        .map(|c| format!("| {} ", escape_markdown(c)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);

    let sep: String = columns.iter().map(|_| "|---").collect::<String>() + "|\n";
    output.push_str(&sep);

    for row in rows {
        let row_str: String = columns
            .iter()
            .map(|col| {
                let value = row.get(col).unwrap_or(&JsonValue::Null);
                format!("| {} ", escape_markdown(&format_value(value)))
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&row_str);
    }

    let truncated_text = if truncated { " *(truncated)*" } else { "" };
    output.push_str(&format!("\n*{} rows*{}", rows.len(), truncated_text));

    output
}
