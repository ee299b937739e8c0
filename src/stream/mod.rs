//! Run-loop event stream: the typed events an engine run produces, and the
//! sentinel demultiplexer that turns raw token fragments into display-ready
//! answer segments.

mod demux;
mod event;

pub use demux::{AnswerDemux, DemuxStep, CLOSE_MARKERS, OPEN_SENTINEL};
pub use event::{RunEntry, StreamEvent};
