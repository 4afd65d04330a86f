pub mod adapter;
pub mod display;
pub mod terminal;
