pub mod atoms;

mod error;
pub use error::*;

mod shell;
pub use shell::*;

mod registry;
pub use registry::*;

mod assembler;
pub use assembler::*;

mod queue;
pub use queue::*;

mod selection;
pub use selection::*;

mod tray;
pub use tray::*;
