pub mod cache;
pub mod codec;
pub mod document;
pub mod errors;
pub mod scheduler;
pub mod state;
