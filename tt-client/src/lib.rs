//! tt-client library - Top Tracks backend client
//!
//! Every authenticated call goes through [`gateway::Gateway`], which attaches
//! the stored credentials and recovers from an expired access token with one
//! refresh-and-retry. [`api::BackendApi`] layers the typed backend operations
//! on top and reports a definitively expired session through
//! [`session::SessionEvents`].

pub mod api;
pub mod error;
pub mod gateway;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::BackendApi;
pub use error::{ClientError, ClientResult};
pub use gateway::{
    ApiRequest, CredentialSource, Gateway, NoCredentials, RefreshObserver, AUTH_METHOD_HEADER,
    REFRESH_PATH,
};
pub use session::{Session, SessionEvents, SessionState};
pub use transport::{
    ApiResponse, HttpTransport, PreparedRequest, ReqwestTransport, ResponseClass, TransportError,
};
