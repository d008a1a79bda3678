pub mod client_factory;
pub mod compreface_client;
pub mod double_take_client;
mod upload;
