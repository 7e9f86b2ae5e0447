//! HTTP surface: the admission gate and the server it fronts.

mod gate;
mod middleware;
mod server;

pub use gate::{AdmissionGate, ClassLimits, Decision};
pub use middleware::{admission_middleware, GateState, DENIED_BODY, ERROR_BODY, UNKNOWN_REMOTE};
pub use server::{router, HttpServer};
