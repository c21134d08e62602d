pub mod exam_api_service;
pub mod exam_runner;
pub mod feedback;
pub mod integrity_service;
pub mod module_timer;
pub mod reconcile;
pub mod report_service;
pub mod session_service;
pub mod staging_service;
pub mod submission_service;
