//! # Marketplace payment server
//! This crate hosts the HTTP edge of the payment notification system. It is responsible for:
//! Listening for incoming payment notifications from PayPal, Bango, Boku and Braintree.
//! Handing each raw notification to the matching engine processor, which verifies it and reconciles the ledger.
//! Answering providers with status codes that either stop or prolong their redelivery cycles.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/ipn/paypal`: PayPal Instant Payment Notifications (POST).
//! * `/notification/bango`: The browser redirect that completes a Bango checkout (GET).
//! * `/event/bango`: Bango's server-to-server event feed, behind Basic Auth (POST).
//! * `/event/boku`: Boku billing result notifications (POST).
//! * `/webhook/braintree`: Braintree webhooks (POST) and the endpoint-verification challenge (GET).

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;

pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
