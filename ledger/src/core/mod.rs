pub mod alert;
pub mod commission;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod locks;
pub mod registry;
pub mod storage;
pub mod withdrawal;
pub mod writer;
