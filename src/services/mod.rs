pub mod listing;
pub mod storage;
pub mod upload;
