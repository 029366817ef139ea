pub mod errors;
pub mod settings;
pub mod types;

pub use errors::{DeviceError, SendError};
pub use settings::ClientSettings;
pub use types::*;
