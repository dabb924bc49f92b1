pub mod gemtext;
pub mod page;
pub mod response;
pub mod target;
pub mod visit;

pub use gemtext::GemtextLine;
pub use page::{CachedPage, FileDownload, RenderedDocument};
pub use response::{ProtocolResponse, ResponseHeader, StatusCategory};
pub use target::{RequestTarget, GEMINI_SCHEME};
pub use visit::Visit;
