pub mod assistant_api;
pub mod config;
pub mod console;
pub mod documents;
pub mod error;
pub mod index;
pub mod models;
pub mod persona;
pub mod polling;
pub mod registry;
pub mod reply;
pub mod session;
pub mod web;

pub use crate::error::{AduChatError, Result};
