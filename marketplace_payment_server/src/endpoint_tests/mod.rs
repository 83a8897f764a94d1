mod bango;
mod boku;
mod braintree;
mod health;
mod helpers;
mod mocks;
mod paypal;
