pub mod domain;
pub mod ports;

pub use domain::{
    is_closeout_command, Chat, ClinicalReport, Message, ModelTier, NewUser, Sender, Treatment, User,
    UserCredentials,
};
pub use ports::{
    ClinicalAnalysisService, DatabaseService, InterviewService, PortError, PortResult, ReportRenderer,
    ReportStore, SpeechToTextService, UpstreamError, UpstreamResult,
};
