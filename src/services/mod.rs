//! Services layer.
//!
//! The identity-resolution and token-lifecycle engine: handshake state
//! guard, JWT signing, token rotation, provider-identity resolution, and
//! the audit sink. Handlers orchestrate these per request.

mod audit;
mod jwt;
mod resolver;
mod state;
mod tokens;

pub use audit::{AuditSink, AUTH_LOG_LIMIT};
pub use jwt::{AccessTokenClaims, JwtService, RefreshTokenClaims};
pub use resolver::IdentityResolver;
pub use state::{generate_state, validate_state, HANDSHAKE_TTL_MINUTES};
pub use tokens::{IssuedPair, TokenService};
