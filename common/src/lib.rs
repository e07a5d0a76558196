pub mod bps;
pub mod error;
pub mod logging;
pub mod time;

pub use bps::Bps;
pub use error::{CoreError, CoreResult};
