pub mod fetch;
pub mod seed;
pub mod status;
