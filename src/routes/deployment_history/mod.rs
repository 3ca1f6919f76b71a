mod add;
mod list;
mod update;

pub use add::*;
pub use list::*;
pub use update::*;
