pub mod archive;
pub mod next;
pub mod run;
pub mod status;
pub mod update;
pub mod validate;
