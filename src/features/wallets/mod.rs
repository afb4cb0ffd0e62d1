pub mod commands;
pub mod models;
pub mod repository;

pub use commands::{create_wallet, delete_wallet, get_wallets, update_wallet};
pub use models::{CreateWalletDto, UpdateWalletDto, Wallet};
