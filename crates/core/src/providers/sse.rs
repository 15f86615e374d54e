/// Incremental decoder for `text/event-stream` bodies.
///
/// Chunks may split anywhere, including inside a line or a UTF-8
/// sequence. Only `data:` fields are kept; comment lines (keep-alives)
/// and other fields are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk. Returns the data of every event it completed,
    /// in arrival order. Multi-line data is joined with `\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches(|c| c == '\n' || c == '\r');

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        events
    }

    /// Whether a partial line or event is still buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || !self.data.is_empty()
    }
}
