pub mod character;
pub mod message;
pub mod story;
