//! `fogsheet_xlsx` v1:
//! XLSX grid host for `fogsheet_report` packages.
//!
//! - `conf`   : worksheet limits and chart sizing constants
//! - `spec`   : buffered sheet state and adapter errors
//! - `writer` : session that buffers writes and renders the workbook
pub mod conf;
pub mod spec;
pub mod writer;

pub use conf::{N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX};
pub use spec::{HostError, SpecXlsxSheetBuffer, SpecXlsxSheetReport};
pub use writer::{XlsxSession, derive_cell_text};
