//! Request/response surface shared by the pipeline and handlers.
pub mod error;
pub mod reply;
pub mod request;

pub use error::ApiError;
pub use reply::Reply;
pub use request::Request;
