//! Client side of the publishing pipeline: uploads, page creation, the
//! preview gate and the payment flow.

pub mod api;
pub mod gate;
pub mod payment;
pub mod publish;
pub mod session;
pub mod uploader;
