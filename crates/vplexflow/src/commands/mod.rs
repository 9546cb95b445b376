pub mod facts;
pub mod provision;
pub mod teardown;
