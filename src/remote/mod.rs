//! Local HTTP services: the download ledger and the existence check.

mod error;
mod existence;
mod http_client;
mod ledger;

pub use error::{LedgerError, RemoteError};
pub use existence::{ExistenceCheck, ExistenceFilter, SERVICE_DOWN_MESSAGE};
pub use http_client::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, ServiceClient};
pub use ledger::{Ledger, LedgerClient, LedgerEntry};
