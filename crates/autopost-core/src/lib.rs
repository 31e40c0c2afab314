//! `autopost-core` — shared types for the autopost workspace.
//!
//! Holds what every other crate needs: the [`Platform`] enum, the
//! platform-tagged [`PostPayload`], the injectable [`Clock`] capability
//! and the figment-backed [`AutopostConfig`].

pub mod clock;
pub mod config;
pub mod payload;
pub mod platform;

pub use clock::{Clock, SystemClock};
pub use config::AutopostConfig;
pub use payload::{MediaKind, PayloadError, PostPayload, TiktokPrivacy};
pub use platform::Platform;
