pub mod index;
pub mod service;
pub mod watcher;
