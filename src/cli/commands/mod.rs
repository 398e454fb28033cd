pub mod migrate;
pub mod tenant;
