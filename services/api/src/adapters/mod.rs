pub mod analysis;
pub mod db;
pub mod interview;
pub mod memory;
pub mod report_pdf;
pub mod report_store;
pub mod sst;
pub mod upstream;

pub use analysis::HttpAnalysisAdapter;
pub use db::DbAdapter;
pub use interview::HttpInterviewAdapter;
pub use memory::InMemoryDb;
pub use report_pdf::{PdfReportRenderer, ReportAssets};
pub use report_store::FsReportStore;
pub use sst::WhisperSstAdapter;
pub use upstream::{build_http_client, ModelRouter};
