pub mod builder;
pub mod name;

pub use builder::{build_child_job, ChildJobInputs, ChildJobSpec, MasterPodRef};
pub use name::gen_job_name;
