//! SNMP polling layer.
//!
//! Provides the get-next primitive the table walkers are built on:
//! - OID codec for table indexes
//! - UDP session backed by `async-snmp` (v2c / v3)
//! - In-memory table agent for replays and tests

pub mod oid;
mod session;
mod table;

pub use oid::DecodeError;
pub use session::{SessionOptions, SnmpAuth, SnmpSession};
pub use table::TableSession;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value bound to an OID in a get-next response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingValue {
    Integer(i64),
    Octets(Vec<u8>),
    /// Agent reached the end of its MIB view
    EndOfMibView,
    /// noSuchObject / noSuchInstance
    NoSuchObject,
    /// Any other value, kept in its printed form
    Other(String),
}

impl BindingValue {
    /// True for the exception markers that terminate a walk
    pub fn is_exception(&self) -> bool {
        matches!(self, BindingValue::EndOfMibView | BindingValue::NoSuchObject)
    }
}

impl std::fmt::Display for BindingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingValue::Integer(value) => write!(f, "{}", value),
            BindingValue::Octets(bytes) => {
                write!(f, "0x")?;
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            BindingValue::EndOfMibView => write!(f, "endOfMibView"),
            BindingValue::NoSuchObject => write!(f, "noSuchObject"),
            BindingValue::Other(text) => write!(f, "{}", text),
        }
    }
}

/// One (OID, value) pair from a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBinding {
    pub oid: String,
    pub value: BindingValue,
}

impl VarBinding {
    pub fn new(oid: impl Into<String>, value: BindingValue) -> Self {
        Self {
            oid: oid.into(),
            value,
        }
    }
}

/// Failures reported by a polling session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Target unreachable, timed out, or the request could not be sent
    #[error("Transport error for {target}: {message}")]
    Transport { target: String, message: String },

    /// The agent answered with a non-zero error status
    #[error("SNMP error status from {target}: {status}")]
    Protocol { target: String, status: String },
}

/// A session able to issue one get-next request at a time.
///
/// Implementations perform no retries; a failed request is reported as is.
#[allow(async_fn_in_trait)]
pub trait PollingSession {
    async fn get_next(&self, target: &str, oid: &str) -> Result<Vec<VarBinding>, SessionError>;
}
