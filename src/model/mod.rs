pub mod audit;
pub mod backup;
pub mod command;
pub mod progress;
pub mod restore;
pub mod retention;
pub mod schedule;
pub mod server;

pub use audit::*;
pub use backup::*;
pub use command::*;
pub use progress::*;
pub use restore::*;
pub use retention::*;
pub use schedule::*;
pub use server::*;
