pub mod page_service;
pub mod payment_service;
pub mod storage_service;
