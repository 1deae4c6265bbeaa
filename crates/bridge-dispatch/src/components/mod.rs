//! Concrete [`crate::Component`] implementations, one module per
//! functional area.

pub mod console;
pub mod datastore;
pub mod file;
pub mod mailbox;
pub mod pin;
pub mod process;
pub mod system;

pub use console::Console;
pub use datastore::Datastore;
pub use file::File;
pub use mailbox::Mailbox;
pub use pin::Pin;
pub use process::Process;
pub use system::System;
