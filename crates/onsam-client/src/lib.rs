pub mod client;
pub mod xml;

pub use client::ControllerClient;
pub use xml::XConnection;
