//! Tab pipeline: per-tab download phase, concurrent tab batches and the
//! prefetch window over discovered links.

mod batch;
mod prefetch;
mod tab;

pub use batch::{DEFAULT_TAB_CONCURRENCY, TabBatch, download_tabs};
pub use prefetch::{MissingFilter, PrefetchConfig, PrefetchPipeline, PrefetchReport};
pub use tab::{TabDownloader, TabOptions, TabOutcome, TabReport, TitleWaitConfig};
