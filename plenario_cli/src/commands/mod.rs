pub mod cache;
pub mod collect;
pub mod legislators;
