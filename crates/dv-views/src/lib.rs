//! DataViews: formula, category and histogram statistics kept in sync with
//! a map layer or data source

mod category;
mod dataview;
mod formula;
mod histogram;
mod kind;
mod options;

pub use category::{Category, CategoryResult};
pub use dataview::{Backend, DataView};
pub use formula::{Formula, FormulaResult};
pub use histogram::{Bin, Histogram, HistogramResult, DEFAULT_BINS};
pub use kind::{DataViewKind, DataViewResult, Kind};
pub use options::{DataViewOptions, KindOptions, Mode};

pub use dv_data::{DataViewError, Result};
