pub mod attribution;
pub mod purl;
pub mod resource;
