pub mod error;
pub mod fetcher;
pub mod nse;
pub mod provider;
pub mod simulate;
