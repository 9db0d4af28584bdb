//! Domain models for the dental clinical history system.

mod appointment;
mod form;
mod history;
mod patient;
mod record;
mod sections;

pub use appointment::*;
pub use form::*;
pub use history::*;
pub use patient::*;
pub use record::*;
pub use sections::*;
