pub mod answer_source;
pub mod exam_report;
pub mod exam_result;
pub mod exam_session;
pub mod feedback;
pub mod module_attempt;
pub mod module_kind;
pub mod staged_answer;
