pub mod config;
pub mod control;
pub mod info;
pub mod logs;
pub mod provision;
pub mod run;
