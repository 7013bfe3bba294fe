//! Price data: API access, record shaping and Parquet artifacts

pub mod energyzero;
pub mod parquet;
pub mod provider;
pub mod records;
pub mod table;

pub use energyzero::EnergyZeroClient;
pub use parquet::{read_meta, read_parquet, write_meta, write_parquet, ArtifactMeta};
pub use provider::{PriceProvider, PriceQuery};
pub use records::{extract_records, record_count, RecordTable};
pub use table::build_price_frame;
