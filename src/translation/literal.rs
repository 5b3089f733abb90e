use crate::types::{Engine, RowValues};
use crate::validation::format_float;

/// Negative numbers are parenthesised so a preceding `-` never forms a
/// `--` comment.
fn signed(text: String) -> String {
    if text.starts_with('-') {
        format!("({text})")
    } else {
        text
    }
}

fn quote(engine: Engine, text: &str) -> String {
    let escaped = text.replace('\'', "''");
    match engine {
        Engine::Sqlite => format!("'{escaped}'"),
        Engine::Mssql => format!("N'{escaped}'"),
    }
}

/// Render a converted argument as an SQL literal for `engine`.
///
/// Numbers are emitted as-is (negatives in parentheses), text is quoted with doubled single quotes,
/// binary becomes a hex literal.
#[must_use]
pub fn render_literal(engine: Engine, value: &RowValues) -> String {
    match value {
        RowValues::Null => "NULL".to_string(),
        RowValues::Int(i) => signed(i.to_string()),
        RowValues::Float(f) => signed(format_float(*f)),
        RowValues::Bool(b) => i64::from(*b).to_string(),
        RowValues::Text(s) => quote(engine, s),
        RowValues::Timestamp(dt) => quote(engine, &dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        RowValues::JSON(v) => quote(engine, &v.to_string()),
        RowValues::Blob(bytes) => match engine {
            Engine::Sqlite => format!("X'{}'", hex::encode_upper(bytes)),
            Engine::Mssql => format!("0x{}", hex::encode_upper(bytes)),
        },
    }
}
