/// Incremental re-segmenter for server-sent event frames.
///
/// Chunk boundaries on the wire carry no meaning: a read may end inside the
/// `data:` marker, inside the JSON payload, inside the blank-line delimiter,
/// or inside a multi-byte UTF-8 sequence. Bytes are therefore accumulated
/// verbatim and only decoded once a full frame delimiter has been observed.
/// This stage cannot fail; undecodable payloads are the decoder's problem.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    /// Appends a chunk and returns the payloads of every frame completed by
    /// it, in wire order. Frames without a `data:` line (comments,
    /// keep-alives) are dropped silently.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf) {
            let frame_bytes = self.buf[..idx].to_vec();
            self.buf.drain(..idx + delim_len);
            if let Some(payload) = extract_data_payload(&frame_bytes) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Recovers a trailing frame that was never delimiter-terminated.
    ///
    /// Call once after the transport signals end-of-stream.
    pub fn flush(&mut self) -> Option<String> {
        let remainder = std::mem::take(&mut self.buf);
        extract_data_payload(&remainder)
    }
}

fn find_frame_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len()
            && buf[i] == b'\r'
            && buf[i + 1] == b'\n'
            && buf[i + 2] == b'\r'
            && buf[i + 3] == b'\n'
        {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn extract_data_payload(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        return None;
    }
    Some(data_lines.join("\n"))
}
