pub mod profit;
pub mod setup;
pub mod ui;
