pub mod asset;
pub mod batch;
pub mod job;
pub mod review;
