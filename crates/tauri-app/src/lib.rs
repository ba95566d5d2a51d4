pub mod commands;
pub mod credentials;
pub mod error;
pub mod events;
pub mod state;

pub use state::AppState;
