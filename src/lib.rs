//! # Perfume Support Bot
//!
//! A Telegram customer-support bot for a perfume brand. It finds a customer's
//! marketplace order, shows product information and alternatives, collects
//! reviews, and routes support requests to operators through an admin bot.

pub mod bot;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod engine;
pub mod ingress;
pub mod localization;
pub mod models;
pub mod notifier;
pub mod repository;
pub mod session;
