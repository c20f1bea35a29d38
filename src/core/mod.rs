pub mod buckets;
pub mod filter;
pub mod level;
pub mod predicate;
pub mod types;
pub mod zoom;

pub use buckets::{BucketLayout, BucketedSeries, LevelCount};
pub use filter::{Condition, FilterNode, FilterTree, Logic, Operator};
pub use level::Level;
pub use predicate::{Predicate, compile, compile_tree, quote_identifier};
pub use types::*;
pub use zoom::ZoomStack;
