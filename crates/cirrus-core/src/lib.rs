pub mod auth;
pub mod blobstore;
pub mod error;
pub mod ledger;
pub mod mailer;
pub mod session;
pub mod throttle;

pub use error::{CoreError, Result};
