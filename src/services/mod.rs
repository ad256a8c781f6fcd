pub mod callback;
pub mod inference;
pub mod job_store;
pub mod lifecycle;
pub mod pipeline;
pub mod storage;
