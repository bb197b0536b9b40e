pub mod analytics;
pub mod auth;
pub mod charts;
pub mod clock;
pub mod i18n;
pub mod post_management;
pub mod stores;
