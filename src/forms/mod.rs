pub mod deploy;
pub mod history;

pub use deploy::*;
pub use history::*;
