pub mod auth;
pub mod correlation;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod startup;
pub mod state;

pub use startup::{run, run_with, serve, ServeError, Server};
pub use state::AppState;
