// gpio-stepper: web-controlled step/direction motor host for single-board computers

pub mod board;
pub mod config;
pub mod error;
pub mod hardware;
pub mod motor;
pub mod registry;
pub mod store;
pub mod web;

pub use error::{ConfigError, MotorError};
pub use motor::{Direction, MotorConfig, MotorRuntimeState, PinAssignment, PinNumber};
pub use registry::MotorRegistry;
pub use store::{ConfigStore, ConfigurationDocument};
