//! Key bindings and their persistence

mod file;
mod store;

pub use file::BindingsFile;
pub use store::{Binding, BindingStore};
