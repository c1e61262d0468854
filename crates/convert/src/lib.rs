//! graphport-convert: ship walked object graphs to a remote endpoint.
//!
//! [`ConversionSession`] ties the pieces together: it walks a value into the
//! shared long-term registry, asks [`ObjectConverter`] for the dependency
//! closure of the resulting root, and submits the records the endpoint has
//! not seen yet through a [`RemoteConverter`].

pub mod config;
pub mod converter;
pub mod remote;
pub mod session;

pub use config::{ConfigError, ConverterConfig, RecordForm, TransportConfig};
pub use converter::{ConversionFailure, ConversionOutcome, ConvertError, ObjectConverter};
pub use remote::{
    ChannelRemote, ConversionRequest, PendingConversion, RemoteConverter, RemoteResponse,
    TransportError,
};
pub use session::ConversionSession;
