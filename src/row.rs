use crate::codec;
use crate::error::CodecError;
use crate::schema::Schema;
use crate::value::Row;

/// Columns starting with this marker are store-internal metadata and are
/// dropped when decoding result rows.
const INTERNAL_PREFIX: char = '_';

/// Encode a native row into its wire form. Strict: every field must be
/// declared in the schema, and the first codec failure aborts the whole
/// row, re-raised with the offending column attached.
pub fn encode_row(row: &Row, schema: &Schema) -> Result<Row, CodecError> {
    let mut out = Row::with_capacity(row.len());
    for (name, value) in row {
        let column = schema
            .get(name)
            .ok_or_else(|| CodecError::column_not_in_schema(name))?;
        let encoded = codec::encode(value, column).map_err(|e| e.with_column(name))?;
        out.insert(name.clone(), encoded);
    }
    Ok(out)
}

/// Decode a wire row back to native values. Lenient: never fails —
/// undeclared columns (or an empty schema) pass values through unchanged,
/// and internal `_`-prefixed columns are dropped from the output.
pub fn decode_row(row: Row, schema: &Schema) -> Row {
    let mut out = Row::with_capacity(row.len());
    for (name, value) in row {
        if name.starts_with(INTERNAL_PREFIX) {
            continue;
        }
        let decoded = match schema.get(&name) {
            Some(column) => codec::decode(value, column),
            None => value,
        };
        out.insert(name, decoded);
    }
    out
}
