pub mod types;
pub mod utils;
pub mod normalizer;
pub mod llm_adapter;
pub mod extractor;
pub mod store;
pub mod fetcher;
pub mod traits;
pub mod sources;
pub mod pipeline;
pub mod aggregator;
pub mod aggregators;

pub use types::*;
pub use normalizer::ContentNormalizer;
pub use llm_adapter::{LlmAdapter, MockLlmAdapter, OpenAiCompatibleAdapter};
pub use extractor::{AnnouncementExtractor, Extraction, ExtractionTier};
pub use store::{ArtifactStore, LoadedArtifact};
pub use fetcher::Fetcher;
pub use sources::{BinanceAdapter, BybitAdapter, OkxAdapter, UpbitAdapter};
pub use traits::SiteAdapter;
pub use pipeline::{ExchangeOutcome, Orchestrator, RunReport};
pub use aggregator::{AggregateTables, AggregationRow, Aggregator};
pub use aggregators::{PivotRow, PivotTable};
