pub mod relay;
pub mod service;

pub use service::{AppState, build_router, create_app};
