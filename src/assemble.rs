use tokio::sync::mpsc;

use crate::driver::RowEvent;
use crate::error::DriverError;
use crate::row::decode_row;
use crate::schema::{parse_type, Schema};
use crate::value::Row;

/// Assembled result of one query.
///
/// `rows` may be empty; `columns` is empty only when the stream announced
/// no metadata at all. `info` is the driver's supplemental metadata, kept
/// opaque.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Schema,
    pub info: serde_json::Value,
    pub rows: Vec<Row>,
}

enum State {
    Collecting,
    Errored(DriverError),
    Done,
}

/// Finite-state accumulator over a row-event stream.
///
/// Collecting → Errored on the first error event (accumulated rows are
/// discarded), Collecting → Done on the end event. Decoding is deferred to
/// the end event so the schema is complete before the first row converts.
/// Events after leaving Collecting are dropped.
pub struct Assembler {
    schema: Schema,
    rows: Vec<Row>,
    info: serde_json::Value,
    state: State,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            schema: Schema::new(),
            rows: Vec::new(),
            info: serde_json::Value::Null,
            state: State::Collecting,
        }
    }

    pub fn push(&mut self, event: RowEvent) {
        if !matches!(self.state, State::Collecting) {
            return;
        }
        match event {
            RowEvent::Metadata(columns) => {
                for meta in columns {
                    self.schema.insert(meta.name, parse_type(&meta.type_name));
                }
            }
            RowEvent::Data(row) => self.rows.push(row),
            RowEvent::Error(err) => {
                self.rows.clear();
                self.state = State::Errored(err);
            }
            RowEvent::End(info) => {
                self.info = info;
                self.state = State::Done;
            }
        }
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self.state, State::Collecting)
    }

    /// Decode every accumulated row and produce the final result.
    /// Row order matches event arrival order.
    pub fn finish(self) -> Result<QueryResult, DriverError> {
        match self.state {
            State::Errored(err) => Err(err),
            State::Collecting => Err(DriverError::new("row stream closed before end event")),
            State::Done => {
                let schema = self.schema;
                let rows = self
                    .rows
                    .into_iter()
                    .map(|row| decode_row(row, &schema))
                    .collect();
                Ok(QueryResult { columns: schema, info: self.info, rows })
            }
        }
    }
}

/// Drain a row-event stream into a [`QueryResult`].
pub async fn assemble(mut rx: mpsc::Receiver<RowEvent>) -> Result<QueryResult, DriverError> {
    let mut assembler = Assembler::new();
    while let Some(event) = rx.recv().await {
        assembler.push(event);
        if !assembler.is_collecting() {
            break;
        }
    }
    assembler.finish()
}
