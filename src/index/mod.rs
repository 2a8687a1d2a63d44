pub mod builder;
pub mod fm;
pub mod sa;
pub mod search;
