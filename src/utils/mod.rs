pub mod tags;
pub mod upload;
