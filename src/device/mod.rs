pub mod btle;
pub mod constants;
pub mod decoder;
pub mod dispatcher;
pub mod link;
pub mod machine;
pub mod simulated;
pub mod sink;
pub mod types;
