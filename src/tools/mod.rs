pub mod fetch;
pub mod login;
pub mod pipeline;
pub mod probe;
pub mod synthesize;

pub use fetch::{FetchOutcome, FetchSummary, RecordFetcher};
pub use login::{AttemptLedger, AttemptOutcome, Authenticator};
pub use pipeline::{Pipeline, RunOutcome, RunReport};
pub use probe::{PairVerdict, UnusedMatcher, ValidityProber};
pub use synthesize::{DocumentSynthesizer, PageRenderer, SynthesisReport, SynthesisStage};
