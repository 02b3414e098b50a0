use std::collections::HashMap;

/// Column type tag. Closed set — every `match` over it is exhaustive, so a
/// newly supported tag forces every conversion site to be revisited.
///
/// `Other` carries the raw tag for types the codec does not interpret;
/// their values pass through both directions unchanged.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ColumnType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Date,
    DateTime,
    String,
    FixedString,
    IPv4,
    IPv6,
    Other(String),
}

impl ColumnType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "UInt8" => ColumnType::UInt8,
            "UInt16" => ColumnType::UInt16,
            "UInt32" => ColumnType::UInt32,
            "UInt64" => ColumnType::UInt64,
            "Int8" => ColumnType::Int8,
            "Int16" => ColumnType::Int16,
            "Int32" => ColumnType::Int32,
            "Int64" => ColumnType::Int64,
            "Float32" => ColumnType::Float32,
            "Float64" => ColumnType::Float64,
            "Date" => ColumnType::Date,
            "DateTime" => ColumnType::DateTime,
            "String" => ColumnType::String,
            "FixedString" => ColumnType::FixedString,
            "IPv4" => ColumnType::IPv4,
            "IPv6" => ColumnType::IPv6,
            other => ColumnType::Other(other.to_string()),
        }
    }
}

/// One column declaration: type tag plus the optional parenthesized
/// parameter from the raw declaration (`FixedString(16)` → `"16"`).
/// The parameter is preserved for fidelity; conversion ignores it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Column {
    pub kind: ColumnType,
    pub param: Option<String>,
}

impl Column {
    pub fn new(kind: ColumnType) -> Self {
        Self { kind, param: None }
    }
}

/// Mapping column name → declaration for one table / result set.
/// Name is unique, order is irrelevant.
pub type Schema = HashMap<String, Column>;

/// Parse a raw type declaration: text before the first `(` is the tag,
/// text between that `(` and the first `)` after it is the parameter.
///
/// Nested or repeated parenthesized groups are not interpreted — the first
/// group wins.
pub fn parse_type(raw: &str) -> Column {
    match raw.find('(') {
        Some(open) => {
            let tail = &raw[open + 1..];
            let param = match tail.find(')') {
                Some(close) => &tail[..close],
                None => tail,
            };
            Column {
                kind: ColumnType::from_tag(&raw[..open]),
                param: Some(param.to_string()),
            }
        }
        None => Column {
            kind: ColumnType::from_tag(raw),
            param: None,
        },
    }
}

/// Build a schema from `(name, raw type)` pairs, as delivered by a result
/// stream's metadata or a table probe.
pub fn schema_from_pairs<I, N, T>(pairs: I) -> Schema
where
    I: IntoIterator<Item = (N, T)>,
    N: Into<String>,
    T: AsRef<str>,
{
    pairs
        .into_iter()
        .map(|(name, raw)| (name.into(), parse_type(raw.as_ref())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_type, schema_from_pairs, ColumnType};

    #[test]
    fn plain_tag_has_no_param() {
        let col = parse_type("UInt32");
        assert_eq!(col.kind, ColumnType::UInt32);
        assert_eq!(col.param, None);
    }

    #[test]
    fn parenthesized_param_is_extracted() {
        let col = parse_type("FixedString(16)");
        assert_eq!(col.kind, ColumnType::FixedString);
        assert_eq!(col.param.as_deref(), Some("16"));
    }

    #[test]
    fn unknown_tag_is_preserved() {
        let col = parse_type("Decimal(18, 8)");
        assert_eq!(col.kind, ColumnType::Other("Decimal".to_string()));
        assert_eq!(col.param.as_deref(), Some("18, 8"));
    }

    #[test]
    fn unclosed_paren_takes_rest() {
        let col = parse_type("FixedString(16");
        assert_eq!(col.param.as_deref(), Some("16"));
    }

    #[test]
    fn schema_from_pairs_maps_names() {
        let schema = schema_from_pairs([("id", "UInt32"), ("name", "String")]);
        assert_eq!(schema.len(), 2);
        assert_eq!(schema["id"].kind, ColumnType::UInt32);
        assert_eq!(schema["name"].kind, ColumnType::String);
    }
}
