pub mod clock;
pub mod connection;
pub mod diff_stats;
pub mod event;
pub mod language;
pub mod patch;
pub mod reveal;
pub mod session;
pub mod store;
pub mod text_diff;
pub mod view;

pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::{CloseDecision, ConnectionStatus, ReconnectPolicy, ReconnectTracker};
pub use diff_stats::{count_diff_lines, DiffCounts};
pub use event::{
    encode_event, DecodeError, DecodeErrorKind, EncodeError, EventDecoder, FileChangeEvent,
    MessageKind, DEFAULT_MAX_PAYLOAD_BYTES,
};
pub use language::{language_for_extension, resolve_language, RenderTargetError, DEFAULT_LANGUAGE};
pub use patch::parse_hunk_header;
pub use reveal::{
    RevealConfig, RevealScheduler, RevealState, RevealTarget, RevealTick, RevealUnit, StartOutcome,
};
pub use session::{ActiveView, ErrorSource, EventSummary, Session, SessionConfig, SessionError};
pub use store::{FileRecord, FileStore, FileTree, TreeRow, TreeRowKind};
pub use text_diff::{diff_blocks, unified_diff, DiffSpan, SpanKind};
pub use view::{Retarget, ViewState};
