pub mod approval;
pub mod audited;
pub mod subject;
