//! Sentinel-based token stream demultiplexer.
//!
//! Models emit one undifferentiated token stream that interleaves reasoning,
//! structured JSON, and the user-visible answer. The visible part is wrapped
//! in sentinels by the prompts; [`AnswerDemux`] watches the stream for those
//! sentinels and accumulates only the wrapped text, tolerating sentinels
//! split across arbitrary fragment boundaries.

/// Marks the start of the user-visible answer.
pub const OPEN_SENTINEL: &str = "<_START_>";

/// Markers that terminate the visible answer. `<_` catches the closing
/// sentinel before it fully arrives; a code fence means the model fell back
/// to fenced JSON after the answer.
pub const CLOSE_MARKERS: [&str; 2] = ["<_", "```"];

/// Outcome of feeding one fragment to the demux.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DemuxStep {
    /// Nothing to show: outside the answer, or a display update is
    /// suppressed while a possible sentinel prefix is held back.
    Silent,
    /// The visible answer grew; the payload is the whole accumulated
    /// segment so far (clients replace, not append).
    Display(String),
    /// The answer closed; the payload is the final segment.
    Final(String),
}

/// Streaming answer extractor. One instance serves one client turn and is
/// reused across model calls within that turn (including across an
/// interrupt/resume boundary).
#[derive(Debug, Default)]
pub struct AnswerDemux {
    /// Accumulates raw text while outside the answer, to spot an open
    /// sentinel that spans fragments.
    buffer: String,
    /// Inside the sentinel-wrapped answer.
    in_answer: bool,
    /// Visible answer accumulated so far.
    segment: String,
    /// One-slot look-back holding a trailing `<` that may begin a close
    /// sentinel.
    held: Option<String>,
}

impl AnswerDemux {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn in_answer(&self) -> bool {
        self.in_answer
    }

    /// Visible segment accumulated so far.
    #[must_use]
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Feeds one raw fragment through the demux.
    pub fn push(&mut self, fragment: &str) -> DemuxStep {
        let normalized = normalize_breaks(fragment);

        if !self.in_answer {
            self.buffer.push_str(&normalized);
            if self.buffer.contains(OPEN_SENTINEL) {
                // Anything trailing the sentinel in this fragment is model
                // framing, not answer text; drop it with the buffer.
                self.buffer.clear();
                self.segment.clear();
                self.held = None;
                self.in_answer = true;
            }
            return DemuxStep::Silent;
        }

        let prior_hold = self.held.take();
        let combined = match &prior_hold {
            Some(held) => format!("{held}{normalized}"),
            None => normalized,
        };

        if let Some(idx) = find_close_marker(&combined) {
            self.segment.push_str(&combined[..idx]);
            self.in_answer = false;
            self.buffer.clear();
            return DemuxStep::Final(self.segment.clone());
        }

        if combined.trim_end().ends_with('<') {
            let idx = combined.rfind('<').unwrap_or(0);
            self.segment.push_str(&combined[..idx]);
            self.held = Some(combined[idx..].to_string());
            return if prior_hold == self.held && !self.segment.is_empty() {
                DemuxStep::Display(self.segment.clone())
            } else {
                DemuxStep::Silent
            };
        }

        self.segment.push_str(&combined);
        // Display updates only go out while the look-back is settled; a
        // step that releases a held char stays silent and its text surfaces
        // with the next update (or the final segment).
        if prior_hold.is_some() || self.segment.is_empty() {
            DemuxStep::Silent
        } else {
            DemuxStep::Display(self.segment.clone())
        }
    }

    /// Handles a natural stop (`finish_reason = stop`): if the answer was
    /// still open, it is finalized as-is; either way all transient demux
    /// state is cleared so the next model call starts clean.
    pub fn finish(&mut self) -> DemuxStep {
        let close_open_answer = self.in_answer && !self.segment.is_empty();
        self.in_answer = false;
        self.buffer.clear();
        self.held = None;
        if close_open_answer {
            DemuxStep::Final(self.segment.clone())
        } else {
            DemuxStep::Silent
        }
    }
}

/// Earliest close-marker position in `text`, if any.
fn find_close_marker(text: &str) -> Option<usize> {
    CLOSE_MARKERS
        .iter()
        .filter_map(|marker| text.find(marker))
        .min()
}

/// Converts newlines to HTML line breaks for display clients. Double breaks
/// first so they do not collapse into single ones.
fn normalize_breaks(text: &str) -> String {
    text.replace("\n\n", "<br/><br/>").replace('\n', "<br/>")
}
