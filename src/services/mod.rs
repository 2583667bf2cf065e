pub mod gallery_service;
pub mod rate_limiter;
pub mod storage_service;
pub mod traits;
