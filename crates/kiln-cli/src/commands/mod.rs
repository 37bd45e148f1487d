pub mod check;
pub mod compile;
pub mod run;
pub mod show;
