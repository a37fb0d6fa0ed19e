//! `WaRelay` Server
//!
//! Supervises WhatsApp sessions, normalizes their events into records and
//! relays them to webhooks, and exposes an HTTP facade for outbound commands.

pub mod api;
pub mod config;
pub mod db;
pub mod store;
pub mod tasks;
pub mod webhooks;
pub mod whatsapp;
