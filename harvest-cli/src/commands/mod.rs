pub mod options;
pub mod pin;
pub mod select;
pub mod transfer;
