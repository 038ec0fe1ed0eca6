//! Analytics hits: formatting, dispatch and delivery.
//!
//! ```text
//! caller ──► AnalyticsDispatcher ──► TaskQueue (web lane)
//!                                        │
//!                                        ▼
//!                         AnalyticsRunner: EventFormatter ──► AnalyticsTransport
//! ```

mod payload;
mod tasks;
mod transport;

pub use payload::*;
pub use tasks::{AnalyticsDispatcher, AnalyticsRunner, AnalyticsTask};
pub use transport::{
    AnalyticsTransport, DisabledTransport, HttpTransport, RecordingTransport, TransportError,
    anonymize_ip, client_id, prepare_form,
};
