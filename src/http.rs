use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::codec::DATETIME_FORMAT;
use crate::config::{Config, QueryOptions};
use crate::driver::{ColumnMeta, Driver, RowEvent, RowSink};
use crate::error::DriverError;
use crate::value::{Row, Value};

/// Escape a string value for safe use inside a ClickHouse single-quoted
/// literal. Prevents SQL injection by escaping `\` and `'`.
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

// ═══════════════════════════════════════════════════════════════
//  HttpDriver
// ═══════════════════════════════════════════════════════════════

/// ClickHouse HTTP interface driver.
///
/// Selects ride on `default_format=TabSeparatedWithNamesAndTypes` so the
/// statement text stays untouched; the response's name and type header
/// lines become the stream's metadata event.
pub struct HttpDriver {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
    database: String,
}

impl HttpDriver {
    pub fn new(config: &Config) -> Result<Self, DriverError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| DriverError::new(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url(),
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
        })
    }

    fn request_params(&self, options: &QueryOptions) -> Vec<(String, String)> {
        let mut params = vec![
            ("user".to_string(), self.user.clone()),
            ("password".to_string(), self.password.clone()),
            ("database".to_string(), self.database.clone()),
        ];
        for (name, value) in options.iter() {
            params.push((name.to_string(), render_setting(value)));
        }
        params
    }
}

impl Driver for HttpDriver {
    fn select(
        &self,
        sql: &str,
        options: &QueryOptions,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<RowEvent>, DriverError>> + Send + '_>>
    {
        let http = self.http.clone();
        let url = self.base_url.clone();
        let mut params = self.request_params(options);
        params.push((
            "default_format".to_string(),
            "TabSeparatedWithNamesAndTypes".to_string(),
        ));
        let sql = sql.to_string();

        Box::pin(async move {
            let (tx, rx) = mpsc::channel(64);
            tokio::spawn(async move {
                let events = match run_select(&http, &url, &params, sql).await {
                    Ok(events) => events,
                    Err(e) => vec![RowEvent::Error(e)],
                };
                for event in events {
                    if tx.send(event).await.is_err() {
                        // receiver gone — nobody left to consume
                        break;
                    }
                }
            });
            Ok(rx)
        })
    }

    fn insert(
        &self,
        sql: &str,
        options: &QueryOptions,
    ) -> Pin<Box<dyn Future<Output = Result<RowSink, DriverError>> + Send + '_>> {
        let http = self.http.clone();
        let url = self.base_url.clone();
        let params = self.request_params(options);
        let sql = sql.to_string();

        Box::pin(async move {
            let columns = insert_columns(&sql);
            let (tx, mut rx) = mpsc::channel::<Row>(256);
            tokio::spawn(async move {
                let mut tuples: Vec<String> = Vec::new();
                while let Some(row) = rx.recv().await {
                    tuples.push(render_tuple(&row, &columns));
                }
                if tuples.is_empty() {
                    return;
                }
                let body = format!("{sql} VALUES {}", tuples.join(","));
                match http.post(&url).query(&params).body(body).send().await {
                    Ok(resp) if !resp.status().is_success() => {
                        let text = resp.text().await.unwrap_or_default();
                        tracing::error!(error = %parse_exception(&text), "insert flush failed");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "insert flush failed"),
                }
            });
            Ok(RowSink::new(tx))
        })
    }

    fn execute(
        &self,
        sql: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), DriverError>> + Send + '_>> {
        let http = self.http.clone();
        let url = self.base_url.clone();
        let params = self.request_params(&QueryOptions::new());
        let sql = sql.to_string();

        Box::pin(async move {
            let resp = http
                .post(&url)
                .query(&params)
                .body(sql)
                .send()
                .await
                .map_err(|e| DriverError::new(format!("http request: {e}")))?;
            if !resp.status().is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(parse_exception(&body));
            }
            Ok(())
        })
    }
}

async fn run_select(
    http: &reqwest::Client,
    url: &str,
    params: &[(String, String)],
    sql: String,
) -> Result<Vec<RowEvent>, DriverError> {
    tracing::debug!(sql = %sql, "select");
    let resp = http
        .post(url)
        .query(&params)
        .body(sql)
        .send()
        .await
        .map_err(|e| DriverError::new(format!("http request: {e}")))?;

    let status = resp.status();
    let info = resp
        .headers()
        .get("x-clickhouse-summary")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or(serde_json::Value::Null);
    let body = resp
        .text()
        .await
        .map_err(|e| DriverError::new(format!("read response: {e}")))?;

    if !status.is_success() {
        return Err(parse_exception(&body));
    }
    Ok(parse_select_body(&body, info))
}

// ═══════════════════════════════════════════════════════════════
//  TabSeparatedWithNamesAndTypes parsing
// ═══════════════════════════════════════════════════════════════

/// First line: column names. Second line: raw type declarations. The rest:
/// one TSV-escaped row per line.
fn parse_select_body(body: &str, info: serde_json::Value) -> Vec<RowEvent> {
    let mut lines = body.lines();

    let names: Vec<String> = match lines.next() {
        Some(l) if !l.is_empty() => l.split('\t').map(unescape_text).collect(),
        _ => return vec![RowEvent::End(info)],
    };
    let types: Vec<String> = match lines.next() {
        Some(l) => l.split('\t').map(unescape_text).collect(),
        None => return vec![RowEvent::End(info)],
    };

    let meta = names
        .iter()
        .zip(types.iter())
        .map(|(n, t)| ColumnMeta::new(n.clone(), t.clone()))
        .collect();

    let mut events = vec![RowEvent::Metadata(meta)];
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let row: Row = names
            .iter()
            .zip(line.split('\t'))
            .map(|(name, field)| (name.clone(), unescape_field(field)))
            .collect();
        events.push(RowEvent::Data(row));
    }
    events.push(RowEvent::End(info));
    events
}

/// One TSV field. `\N` is the TSV null marker.
fn unescape_field(raw: &str) -> Value {
    if raw == "\\N" {
        return Value::Null;
    }
    Value::String(unescape_text(raw))
}

fn unescape_text(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000c}'),
            Some('0') => out.push('\0'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Pull the structured parts out of a ClickHouse exception body, e.g.
/// `Code: 62. DB::Exception: Syntax error: ...`.
fn parse_exception(body: &str) -> DriverError {
    let mut err = DriverError::new(body.trim());
    if let Some(rest) = body.trim_start().strip_prefix("Code: ") {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(code) = digits.parse::<i64>() {
            err.code = Some(code);
        }
    }
    if body.contains("DB::Exception") {
        err.scope = Some("DB::Exception".to_string());
    }
    err
}

// ═══════════════════════════════════════════════════════════════
//  Insert rendering
// ═══════════════════════════════════════════════════════════════

/// Column list of an `INSERT INTO t (a, b, c)` prefix. Empty when the
/// statement names no columns.
fn insert_columns(sql: &str) -> Vec<String> {
    let Some(open) = sql.find('(') else {
        return Vec::new();
    };
    let tail = &sql[open + 1..];
    let inner = match tail.find(')') {
        Some(close) => &tail[..close],
        None => tail,
    };
    inner
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn render_tuple(row: &Row, columns: &[String]) -> String {
    let rendered: Vec<String> = if columns.is_empty() {
        let mut keys: Vec<&String> = row.keys().collect();
        keys.sort();
        keys.into_iter().map(|k| render_value(&row[k])).collect()
    } else {
        columns
            .iter()
            .map(|c| row.get(c).map(render_value).unwrap_or_else(|| "NULL".to_string()))
            .collect()
    };
    format!("({})", rendered.join(","))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::String(s) => format!("'{}'", escape_string(s)),
        Value::DateTime(t) => format!("'{}'", t.format(DATETIME_FORMAT)),
    }
}

fn render_setting(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsv_field_unescaping() {
        assert_eq!(unescape_field("\\N"), Value::Null);
        assert_eq!(unescape_field("plain"), Value::String("plain".into()));
        assert_eq!(unescape_field("a\\tb\\nc"), Value::String("a\tb\nc".into()));
        assert_eq!(unescape_field("back\\\\slash"), Value::String("back\\slash".into()));
    }

    #[test]
    fn select_body_becomes_events() {
        let body = "id\tname\nUInt32\tString\n1\talice\n2\tbob\n";
        let events = parse_select_body(body, serde_json::Value::Null);
        assert_eq!(events.len(), 4);
        match &events[0] {
            RowEvent::Metadata(meta) => {
                assert_eq!(meta[0].name, "id");
                assert_eq!(meta[1].type_name, "String");
            }
            other => panic!("unexpected: {other:?}"),
        }
        match &events[1] {
            RowEvent::Data(row) => assert_eq!(row["name"], Value::String("alice".into())),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(events[3], RowEvent::End(_)));
    }

    #[test]
    fn empty_select_body_still_ends() {
        let events = parse_select_body("", serde_json::Value::Null);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RowEvent::End(_)));
    }

    #[test]
    fn exception_text_is_structured() {
        let err = parse_exception("Code: 62. DB::Exception: Syntax error: failed at position 8");
        assert_eq!(err.code, Some(62));
        assert_eq!(err.scope.as_deref(), Some("DB::Exception"));
        assert!(err.message.contains("Syntax error"));
    }

    #[test]
    fn insert_column_list() {
        assert_eq!(
            insert_columns("INSERT INTO t (a, b, c)"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(insert_columns("INSERT INTO t").is_empty());
    }

    #[test]
    fn tuples_follow_column_order() {
        let row: Row = [
            ("b".to_string(), Value::String("x'y".into())),
            ("a".to_string(), Value::String("1".into())),
        ]
        .into_iter()
        .collect();
        let cols = vec!["a".to_string(), "b".to_string()];
        assert_eq!(render_tuple(&row, &cols), "('1','x\\'y')");
        // missing column renders as NULL
        let cols = vec!["a".to_string(), "missing".to_string()];
        assert_eq!(render_tuple(&row, &cols), "('1',NULL)");
    }
}
