use std::sync::Arc;

use futures::future::try_join_all;

use crate::assemble::{assemble, QueryResult};
use crate::config::{Config, QueryOptions};
use crate::driver::Driver;
use crate::error::BridgeError;
use crate::http::HttpDriver;
use crate::row::encode_row;
use crate::schema::Schema;
use crate::value::Row;

/// Query orchestrator. Owns the driver handle and the default per-query
/// store settings; every operation runs on its own stream for its duration.
///
/// Cancellation and timeouts belong to the driver — there is no timeout
/// logic here.
pub struct Client {
    driver: Arc<dyn Driver>,
    options: QueryOptions,
}

impl Client {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver, options: QueryOptions::new() }
    }

    pub fn with_options(driver: Arc<dyn Driver>, options: QueryOptions) -> Self {
        Self { driver, options }
    }

    /// Connect over the ClickHouse HTTP interface.
    pub fn connect(config: &Config) -> Result<Self, BridgeError> {
        Ok(Self::new(Arc::new(HttpDriver::new(config)?)))
    }

    /// Issue one query and assemble its full result.
    pub async fn query(&self, sql: &str) -> Result<QueryResult, BridgeError> {
        self.run_query(sql, None).await
    }

    /// Like [`Client::query`], with per-call settings overlaid on the
    /// client defaults.
    pub async fn query_with(
        &self,
        sql: &str,
        overrides: &QueryOptions,
    ) -> Result<QueryResult, BridgeError> {
        self.run_query(sql, Some(overrides)).await
    }

    /// Issue a batch of queries, sequentially in order or concurrently.
    /// Results always come back in submission order, and the first failure
    /// fails the whole batch.
    pub async fn query_batch(
        &self,
        sqls: &[String],
        parallel: bool,
    ) -> Result<Vec<QueryResult>, BridgeError> {
        if parallel {
            try_join_all(sqls.iter().map(|sql| self.run_query(sql, None))).await
        } else {
            let mut results = Vec::with_capacity(sqls.len());
            for sql in sqls {
                results.push(self.run_query(sql, None).await?);
            }
            Ok(results)
        }
    }

    /// Rows-only shape of [`Client::query`].
    pub async fn query_rows(&self, sql: &str) -> Result<Vec<Row>, BridgeError> {
        Ok(self.query(sql).await?.rows)
    }

    /// Rows-only shape of [`Client::query_batch`].
    pub async fn query_rows_batch(
        &self,
        sqls: &[String],
        parallel: bool,
    ) -> Result<Vec<Vec<Row>>, BridgeError> {
        let results = self.query_batch(sqls, parallel).await?;
        Ok(results.into_iter().map(|r| r.rows).collect())
    }

    /// First row of the result, or `None` when it is empty.
    pub async fn query_one(&self, sql: &str) -> Result<Option<Row>, BridgeError> {
        Ok(self.query(sql).await?.rows.into_iter().next())
    }

    /// Encode and write rows into a table. Without an explicit schema, the
    /// table is probed first — fresh on every call, nothing is cached.
    /// Returns once the driver accepts the sink; flushing is the driver's.
    pub async fn insert(
        &self,
        table: &str,
        rows: &[Row],
        schema: Option<&Schema>,
        overrides: &QueryOptions,
    ) -> Result<(), BridgeError> {
        if rows.is_empty() {
            return Ok(());
        }
        let fetched;
        let schema = match schema {
            Some(s) => s,
            None => {
                fetched = self.fetch_table_schema(table).await?;
                &fetched
            }
        };

        let mut encoded = Vec::with_capacity(rows.len());
        for row in rows {
            encoded.push(encode_row(row, schema)?);
        }

        let mut columns: Vec<&String> = encoded[0].keys().collect();
        columns.sort();
        let column_list = columns.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ");
        let sql = format!("INSERT INTO {table} ({column_list})");
        tracing::debug!(table = %table, rows = rows.len(), "insert");

        let options = self.options.merged(overrides);
        let sink = self.driver.insert(&sql, &options).await?;
        for row in encoded {
            sink.write(row).await?;
        }
        sink.end();
        Ok(())
    }

    /// `OPTIMIZE TABLE`, optionally deduplicating.
    pub async fn optimize(&self, table: &str, deduplicate: bool) -> Result<(), BridgeError> {
        let sql = if deduplicate {
            format!("OPTIMIZE TABLE {table} DEDUPLICATE")
        } else {
            format!("OPTIMIZE TABLE {table}")
        };
        tracing::debug!(table = %table, "optimize");
        self.driver.execute(&sql).await?;
        Ok(())
    }

    async fn fetch_table_schema(&self, table: &str) -> Result<Schema, BridgeError> {
        let sql = format!("SELECT * FROM {table} LIMIT 1");
        let result = self.run_query(&sql, None).await?;
        Ok(result.columns)
    }

    async fn run_query(
        &self,
        sql: &str,
        overrides: Option<&QueryOptions>,
    ) -> Result<QueryResult, BridgeError> {
        let options = match overrides {
            Some(o) => self.options.merged(o),
            None => self.options.clone(),
        };
        tracing::debug!(sql = %sql, "query");
        let rx = self.driver.select(sql, &options).await?;
        Ok(assemble(rx).await?)
    }
}
