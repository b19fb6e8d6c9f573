pub mod app;
pub mod config;
pub mod debounce;
pub mod discord;
pub mod dispatch;
pub mod event;
pub mod imgur;
pub mod notification;
pub mod plex;
pub mod poster;
pub mod ratelimit;
pub mod relay;
