pub mod commands;
pub mod models;
pub mod repository;

pub use commands::{create_account, delete_account, get_accounts};
pub use models::{Account, CreateAccountDto};
