//! Security boundaries for untrusted callers.

mod upload;

pub use upload::RemoteUploadGuard;
