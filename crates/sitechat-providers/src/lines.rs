//! Line-delimited body streaming shared by both streaming wire formats:
//! Gemini sends SSE (`data: {...}` lines), Ollama sends NDJSON.

use std::collections::VecDeque;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

use sitechat_core::error::{Result, SiteChatError};

struct LineState {
    inner: BoxStream<'static, Result<Vec<u8>>>,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
}

/// Split a streaming response body into complete non-empty lines. A trailing
/// unterminated line is flushed when the body ends.
pub(crate) fn line_stream(resp: reqwest::Response) -> impl Stream<Item = Result<String>> + Send {
    let chunks = resp
        .bytes_stream()
        .map(|r| {
            r.map(|b| b.to_vec())
                .map_err(|e| SiteChatError::Http(e.to_string()))
        })
        .boxed();
    split_lines(chunks)
}

/// Line splitting over raw byte chunks. The buffer stays bytes until a full
/// line is cut: network chunk boundaries can land mid-code-point, so decoding
/// anything shorter than a complete line would mangle multibyte UTF-8.
fn split_lines(
    inner: BoxStream<'static, Result<Vec<u8>>>,
) -> impl Stream<Item = Result<String>> + Send {
    let state = LineState {
        inner,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.pending.pop_front() {
                return Some((Ok(line), st));
            }
            if st.done {
                let tail = decode_line(&std::mem::take(&mut st.buffer));
                if !tail.trim().is_empty() {
                    return Some((Ok(tail), st));
                }
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    st.buffer.extend_from_slice(&chunk);
                    while let Some(pos) = st.buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = st.buffer.drain(..=pos).collect();
                        let line = decode_line(&line);
                        if !line.trim().is_empty() {
                            st.pending.push_back(line);
                        }
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.done = true;
                }
            }
        }
    })
}

/// Decode one complete line, stripping the trailing newline/CR bytes.
fn decode_line(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .rposition(|b| *b != b'\n' && *b != b'\r')
        .map_or(0, |p| p + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
