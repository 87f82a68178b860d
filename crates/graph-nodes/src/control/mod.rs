//! Control nodes
//!
//! Nodes that decide which execution edges fire, how often, and on which
//! execution state.

mod branch;
mod concurrent;
mod freeze;
mod loops;
pub(crate) mod pool;
mod process_exit;
mod select_exec;
mod sequence;
mod sleep;
mod wait_for;

pub use branch::BranchNode;
pub use concurrent::{ConcurrentExecNode, ConcurrentForEachNode, ConcurrentForNode};
pub use freeze::FreezeNode;
pub use loops::{ForEachNode, ForLoopNode, PORT_EXEC_BODY, PORT_EXEC_BREAK, PORT_EXEC_COMPLETED};
pub use process_exit::ProcessExitNode;
pub use select_exec::SelectExecNode;
pub use sequence::SequenceNode;
pub use sleep::SleepNode;
pub use wait_for::WaitForNode;
