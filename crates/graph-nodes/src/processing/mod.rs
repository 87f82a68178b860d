//! Processing nodes
//!
//! Nodes that compute new values from their inputs.

mod array_add;
mod array_get;
mod compare;
mod length;
mod math;
mod select_data;
mod string_fmt;
mod string_ops;

pub use array_add::ArrayAddNode;
pub use array_get::ArrayGetNode;
pub use compare::{compare, CompareNode, NegateNode};
pub use length::{value_length, LengthNode};
pub use math::{fold, MathNode, MathOp};
pub use select_data::SelectDataNode;
pub use string_fmt::{format_placeholders, StringFmtNode};
pub use string_ops::{
    match_plain, split_string, StringJoinNode, StringMatchNode, StringReplaceNode,
    StringSplitNode,
};
