pub mod extract;
pub mod models;
pub mod schema;
pub mod state;
pub mod utils;
