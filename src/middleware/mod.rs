// Middleware stack: auth, CORS, latency and correlation-id tracing.
pub mod auth;
pub mod cors;
pub mod jwt_verifier;
pub mod latency;
pub mod tracing;

pub use auth::*;
pub use cors::*;
pub use jwt_verifier::JwtTokenVerifier;
pub use latency::*;
pub use tracing::*;
