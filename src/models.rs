pub mod automation;
pub mod flow_job;
pub mod lead;
pub mod quick_reply;
pub mod reminder;
