mod credential_status;
mod ledger;
mod status_list;
mod transactions;

pub use credential_status::{get_credential, get_credential_status, update_status};
pub use ledger::search_ledger;
pub use status_list::{get_page_stats, get_slot_owner, get_status_list};
pub use transactions::get_transactions;
