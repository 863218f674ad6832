//! Settings groups
//!
//! Each group is a plain struct with defaults and a [`SettingsGroup`] impl
//! mapping its fields to keys in one namespace. Wrap a group in a
//! `SettingsController` to load it and persist changes.
//!
//! [`SettingsGroup`]: crate::core::settings::SettingsGroup
//!
//! # Groups
//!
//! - [`display::DisplaySettings`] - `display` namespace
//! - [`wifi::WifiSettings`] - `wifi` namespace

pub mod display;
pub mod wifi;

pub use display::{DisplaySettings, TouchPoint};
pub use wifi::WifiSettings;
