pub mod csv;
pub mod jsonl;

pub(crate) use parse::parse_value;

mod parse {
    use rowtrace_core::value::{parse_date, DataType, Value};

    use crate::error::{IoError, Result};

    /// Parse one textual cell against its declared type. An empty cell
    /// in a nullable column is `Null`; anything unparseable is an error
    /// at the import boundary, not a drop.
    pub(crate) fn parse_value(
        raw: &str,
        dtype: &DataType,
        nullable: bool,
        column: &str,
        row: usize,
    ) -> Result<Value> {
        if raw.is_empty() && nullable {
            return Ok(Value::Null);
        }
        let parsed = match dtype {
            DataType::Bool => raw.parse::<bool>().ok().map(Value::Bool),
            DataType::Int => raw.parse::<i64>().ok().map(Value::Int),
            DataType::Float => raw.parse::<f64>().ok().map(Value::Float),
            DataType::Text => Some(Value::Text(raw.to_string())),
            DataType::Date => parse_date(raw).map(Value::Date),
            DataType::Enum { variants } => variants
                .iter()
                .any(|v| v == raw)
                .then(|| Value::Enum(raw.to_string())),
        };
        parsed.ok_or_else(|| IoError::Parse {
            column: column.to_string(),
            row,
            value: raw.to_string(),
            dtype: dtype.to_string(),
        })
    }
}
