pub mod report;

pub use report::{
    MatchReport, MatchReportError, MatchReportQuery, ReportLeg, ReportLegPlayer, ReportPlayer,
    ReportTurn,
};
