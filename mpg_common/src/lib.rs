mod market_amount;

pub mod helpers;
pub mod op;
mod secret;

pub use market_amount::{MarketAmount, MarketAmountError};
pub use secret::Secret;
