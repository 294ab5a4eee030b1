pub mod aggregate;
pub mod calendar;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod reader;
pub mod symbols;
pub mod target;
pub mod window;

pub use aggregate::AggregationKind;
pub use calendar::CalendarAligner;
pub use config::Config;
pub use data::{AlignedSeries, load_rows};
pub use error::ValidationError;
pub use model::{LinearModel, LinearParams, Model};
pub use pipeline::{PrepareSummary, PreparedSymbol, prepare_dataset};
pub use reader::{BatchAlignment, DataReader, SkippedSymbol};
pub use symbols::{list_symbols, resolve_symbols};
pub use target::{PriceMovementTarget, TargetSpec};
pub use window::{FeatureSpec, SlidingWindowFeatures};
