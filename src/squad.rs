pub use self::config::SquadConfig;
pub use self::history::{DataExport, ExportBucket, ExportItem, HistoryError};
pub use self::models::{Deadline, Participation, PinnedNotice, Report};
pub use self::service::{
    ApprovalOutcome, ConfigSummary, ImportSummary, ReportMessage, SquadError, SquadService,
};

pub mod config;
pub mod history;
pub mod models;
pub mod service;
pub mod stats;
