//! HTTP request handlers.

pub mod admin;
pub mod common;
pub mod health;
pub mod sync;

pub use admin::*;
pub use common::*;
pub use health::*;
pub use sync::*;
