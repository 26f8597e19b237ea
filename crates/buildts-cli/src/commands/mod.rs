pub mod build;
pub mod run;
pub mod watch;
