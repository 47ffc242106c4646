// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod entry;
pub mod format;
pub mod level;
pub mod logger;
pub mod sanitize;
pub mod serialize;
pub mod transport;
pub mod value;

pub use entry::LogEntry;
pub use format::LogFormat;
pub use level::{Environment, Level, ParseLevelError};
pub use logger::{LogError, Logger, LoggerConfig, create_logger};
pub use sanitize::{REDACTED, Redactor, mask_credit_card, mask_email, sanitize};
pub use serialize::{safe_json_stringify, serialize, serialize_error};
pub use transport::{
    ConsoleTransport, MemoryTransport, QueuedTransport, TracingTransport, Transport,
    TransportError,
};
pub use value::{ErrorRecord, Getter, Loggable, Shared};
