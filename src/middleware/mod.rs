pub mod auth;
pub mod correlation;

pub use auth::{auth_middleware, CurrentAccount};
pub use correlation::{correlation_id_middleware, CorrelationId, CORRELATION_HEADER};
