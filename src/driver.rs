use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::config::QueryOptions;
use crate::error::DriverError;
use crate::value::Row;

/// One column declaration as announced by the store, type still in its raw
/// textual form (`"FixedString(16)"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub type_name: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_name: type_name.into() }
    }
}

/// One notification of a query's row stream, in arrival order: zero or more
/// `Metadata`, zero or more `Data`, at most one `Error`, exactly one
/// terminal `End` carrying the driver's supplemental info.
#[derive(Debug, Clone)]
pub enum RowEvent {
    Metadata(Vec<ColumnMeta>),
    Data(Row),
    Error(DriverError),
    End(serde_json::Value),
}

/// Write side of a row-oriented ingestion stream.
///
/// `end` closes the stream; flushing happens on the driver's side after
/// that, so callers holding the sink never wait for bytes on the wire.
pub struct RowSink {
    tx: mpsc::Sender<Row>,
}

impl RowSink {
    pub fn new(tx: mpsc::Sender<Row>) -> Self {
        Self { tx }
    }

    pub async fn write(&self, row: Row) -> Result<(), DriverError> {
        self.tx
            .send(row)
            .await
            .map_err(|_| DriverError::new("insert stream closed by driver"))
    }

    pub fn end(self) {
        // Dropping the sender closes the stream; the driver flushes.
    }
}

/// Contract the orchestrator needs from the wire-level client.
///
/// The core never touches the network itself — any implementation that can
/// emit the row-event stream and accept a row sink satisfies it.
pub trait Driver: Send + Sync {
    /// Issue a query and hand back its row-event stream.
    fn select(
        &self,
        sql: &str,
        options: &QueryOptions,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<RowEvent>, DriverError>> + Send + '_>>;

    /// Open a row-oriented ingestion stream for the given insert statement.
    /// Resolves once the sink is accepted, not once rows are flushed.
    fn insert(
        &self,
        sql: &str,
        options: &QueryOptions,
    ) -> Pin<Box<dyn Future<Output = Result<RowSink, DriverError>> + Send + '_>>;

    /// Fire-and-forget DDL / maintenance statement.
    fn execute(
        &self,
        sql: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), DriverError>> + Send + '_>>;
}
