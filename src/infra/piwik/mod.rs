//! Piwik (Matomo) reporting API over HTTP.

pub mod client;

pub use client::PiwikClient;
