pub mod config;
pub mod database;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;
pub mod web;

#[cfg(test)]
pub mod test_utils;

pub use utils::state;
