pub mod clock;
pub mod config;
pub mod cover;
pub mod credential;
pub mod error;
pub mod event;
pub mod meta;
pub mod progress;
pub mod record;
pub mod session;
pub mod template;
pub mod uploader;
pub mod zones;
