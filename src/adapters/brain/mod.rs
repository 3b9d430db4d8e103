//! Brain adapters.

pub mod claude_code;
pub mod mock;

pub use claude_code::{ClaudeCodeBrain, ClaudeCodeConfig};
pub use mock::{MockBrain, MockResponse};
