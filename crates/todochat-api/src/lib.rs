pub mod cache;
pub mod conversations;
pub mod error;
pub mod extract;
pub mod messages;
pub mod routes;
pub mod rows;
pub mod state;
pub mod todos;
pub mod users;
pub mod validation;
pub mod ws;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
