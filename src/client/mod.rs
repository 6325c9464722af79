//! Client-side counterpart of the auth API: a request executor that keeps
//! a long-lived client consistent with server-side session state, and the
//! process-wide auth context it drives.

pub mod api;
pub mod context;

pub use api::{ApiClient, FetchState};
pub use context::{AuthContext, AuthSnapshot, Navigator};
