pub mod assemble;
pub mod client;
pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod http;
pub mod row;
pub mod schema;
pub mod value;

pub use assemble::QueryResult;
pub use client::Client;
pub use config::{Config, QueryOptions};
pub use driver::{ColumnMeta, Driver, RowEvent, RowSink};
pub use error::{BridgeError, CodecError, DriverError, ErrorCode};
pub use schema::{Column, ColumnType, Schema};
pub use value::{Row, Value};
