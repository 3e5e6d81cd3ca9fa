pub mod assessment;
pub mod task_result;
