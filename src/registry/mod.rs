pub mod item;
pub mod item_registry;
pub mod snapshot;
pub mod tree;
