//! Shared, reference-counted log streams.
//!
//! Many handlers may write to the same sink. The [`ResourceManager`] keeps one
//! [`StreamResource`] per sink, opens its backend on the first acquire of a
//! cycle and closes it when the last holder releases it. Every write runs under
//! the resource's cross-context lock, so records from different handlers never
//! interleave.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod backends;
mod config;
mod error;
mod error_stream;
mod manager;
mod resource;

pub use backends::Backends;
pub use config::{BACKEND_ENV, Config, ConfigBuilder, RAISE_EXCEPTIONS_ENV};
pub use error::{Error, Result};
pub use error_stream::ErrorStream;
pub use manager::{BackendSelection, ResourceManager, ResourceManagerBuilder, ResourceRef};
pub use resource::StreamResource;

pub use logbuch_backend::{BackendKind, STDERR_TOKEN, SinkId};
