//! Version of this build, generated by `build.rs` from `git describe`.

pub mod scm;

include!(concat!(env!("OUT_DIR"), "/version.rs"));
