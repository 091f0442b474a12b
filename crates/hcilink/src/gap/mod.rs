//! Addressing and advertising-data types shared by the HCI layers

pub mod constants;
pub mod types;

pub use constants::*;
pub use types::*;
