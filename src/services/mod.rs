pub mod error;
pub mod issuance;
pub mod ledger;
pub mod pages;
pub mod slots;
pub mod status;

pub use error::StatusError;
