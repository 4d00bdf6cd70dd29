//! testgen
//!
//! Coverage measurement and model-written tests. A session renders the
//! problem's fixed checks as a pytest file, measures line and branch coverage
//! of a solution under it, then adds generated test files and measures again.

pub mod coverage;
pub mod fixture;
pub mod generate;
pub mod session;

pub use coverage::{parse_coverage_xml, CoverageReport, PytestCov};
pub use generate::TestGenMode;
pub use session::{run_session, CoverageRecord, SessionContext, SessionPlan};
