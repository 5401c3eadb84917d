//! chroma-services — the image transforms and the per-connection transfer
//! session that drives them.

pub mod audit;
pub mod classifier;
pub mod equalizer;
pub mod naming;
pub mod pixel;
pub mod server;
pub mod transfer;

pub use audit::AuditLog;
pub use classifier::{classify, Classification, ClassificationError, Label};
pub use equalizer::{equalize, EqualizationError, Histogram};
pub use naming::{equalized_file_name, safe_file_name, NameError};
pub use pixel::{Channels, OutputFormat, PixelBuffer, PixelError};
pub use server::serve;
pub use transfer::{ReceivedImage, SessionContext, SessionReport, SessionState, TransferSession};
