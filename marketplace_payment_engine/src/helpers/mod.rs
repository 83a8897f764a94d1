mod form_data;
mod mobile_codes;

pub use form_data::{split_currency_amount, FormFields};
pub use mobile_codes::{carrier_for_network, MobileNetwork};
