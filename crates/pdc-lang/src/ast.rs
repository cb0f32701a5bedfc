pub mod error;
pub mod node;
pub mod parser;
pub mod render;

pub use node::{Block, IdentName, NodeId, Tree};
