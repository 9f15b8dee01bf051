pub mod driver;
pub mod order;
