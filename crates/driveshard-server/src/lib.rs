//! DriveShard Server - HTTP API adapter
//!
//! The thin surface between HTTP and the engine: route dispatch, the JSON
//! error envelope, CORS, per-client rate limiting, and health probes. The
//! engine never sees a request object; handlers parse inputs and call
//! service methods.

pub mod dto;
pub mod envelope;
pub mod rate_limit;
pub mod router;
pub mod server;
pub mod state;

pub use state::AppState;
