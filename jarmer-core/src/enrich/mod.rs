pub mod http;
pub mod overlap;
pub mod scanner;
pub mod submit;

pub use http::{ApiError, HttpClient};
pub use overlap::{JarmOnlineOverlap, OverlapFilter};
pub use scanner::{FingerprintScanner, JarmOnlineScanner, ScanReply};
pub use submit::{CollectorSubmitter, DisabledSubmitter, Submitter};
