//! Compiled sessions binding models to devices and executables

pub mod compiler;
pub mod config;
pub mod session;

pub use compiler::{ModelCompiler, StubCompiler};
pub use config::SessionConfig;
pub use session::{CompiledSession, SessionState};
