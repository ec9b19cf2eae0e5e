pub mod document;
pub mod invoice;
pub mod request;
pub mod user;
